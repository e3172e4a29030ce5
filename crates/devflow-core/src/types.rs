use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::DevflowError;

/// Terminal pseudo-step.
pub const END: &str = "__end__";
/// Entry pseudo-step, used only in graph exports.
pub const START: &str = "__start__";

/// Unique identifier for a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Label a conditional transition resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKey {
    Proceed,
    Revise,
    Fix,
}

impl BranchKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::Revise => "revise",
            Self::Fix => "fix",
        }
    }
}

impl std::fmt::Display for BranchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human decision on a pending review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewDecision {
    Approved,
    #[serde(rename = "Needs Revision", alias = "NeedsRevision")]
    NeedsRevision,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => crate::state::status::APPROVED,
            Self::NeedsRevision => crate::state::status::NEEDS_REVISION,
        }
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewDecision {
    type Err = DevflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Approved" => Ok(Self::Approved),
            "Needs Revision" | "NeedsRevision" => Ok(Self::NeedsRevision),
            other => Err(DevflowError::Validation(format!(
                "invalid decision '{other}': expected 'Approved' or 'Needs Revision'"
            ))),
        }
    }
}

/// Per-invocation context handed to a step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: RunId,
    pub step: String,
    /// 1-based count of entries into this step, including the current one.
    pub visit: usize,
    pub cancel: CancellationToken,
}

impl StepContext {
    pub fn new(run_id: RunId, step: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            run_id,
            step: step.into(),
            visit: 1,
            cancel,
        }
    }

    pub fn check_cancelled(&self) -> crate::error::Result<()> {
        if self.cancel.is_cancelled() {
            Err(DevflowError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Lifecycle events published on the event bus.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    RunStarted { run_id: RunId, entry: String },
    StepStarted { run_id: RunId, step: String, visit: usize },
    StepCompleted { run_id: RunId, step: String, next: String },
    StepFailed { run_id: RunId, step: String, error: String },
    /// A review is waiting for a human decision.
    ReviewRequested { artifact_key: String, step: String },
    ReviewResolved { artifact_key: String, decision: ReviewDecision },
    RevisionSubmitted { artifact_key: String },
    RunCompleted { run_id: RunId, steps: usize },
    RunCancelled { run_id: RunId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parsing() {
        assert_eq!(
            "Approved".parse::<ReviewDecision>().unwrap(),
            ReviewDecision::Approved
        );
        assert_eq!(
            "Needs Revision".parse::<ReviewDecision>().unwrap(),
            ReviewDecision::NeedsRevision
        );
        assert_eq!(
            "NeedsRevision".parse::<ReviewDecision>().unwrap(),
            ReviewDecision::NeedsRevision
        );
        assert!(matches!(
            "Maybe".parse::<ReviewDecision>(),
            Err(DevflowError::Validation(_))
        ));
        assert!("approved".parse::<ReviewDecision>().is_err());
    }

    #[test]
    fn decision_serde_uses_status_text() {
        let json = serde_json::to_string(&ReviewDecision::NeedsRevision).unwrap();
        assert_eq!(json, "\"Needs Revision\"");
        let back: ReviewDecision = serde_json::from_str("\"NeedsRevision\"").unwrap();
        assert_eq!(back, ReviewDecision::NeedsRevision);
    }

    #[test]
    fn branch_key_serde() {
        assert_eq!(serde_json::to_string(&BranchKey::Fix).unwrap(), "\"fix\"");
        assert_eq!(BranchKey::Proceed.to_string(), "proceed");
    }

    #[test]
    fn cancelled_context() {
        let token = CancellationToken::new();
        let ctx = StepContext::new(RunId::new(), "s", token.clone());
        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(DevflowError::Cancelled)));
    }
}
