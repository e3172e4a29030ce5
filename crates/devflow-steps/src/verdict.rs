/// Two-valued outcome of an automated review.
///
/// Review replies are free text; the only thing read from them is whether
/// they contain the approval marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Revise,
}

impl Verdict {
    /// Case-sensitive substring scan for `marker`.
    pub fn from_reply(reply: &str, marker: &str) -> Self {
        if !marker.is_empty() && reply.contains(marker) {
            Verdict::Approve
        } else {
            Verdict::Revise
        }
    }

    pub fn is_approved(self) -> bool {
        matches!(self, Verdict::Approve)
    }

    /// Pick the status value to record for this verdict.
    pub fn status<'a>(self, approved: &'a str, rejected: &'a str) -> &'a str {
        match self {
            Verdict::Approve => approved,
            Verdict::Revise => rejected,
        }
    }
}
