use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use devflow_core::error::{DevflowError, Result};
use devflow_core::state::WorkflowState;
use devflow_core::types::BranchKey;

/// Route on a status field: `proceed` only when the field is present and
/// equals one of `proceed_on`, the conservative `otherwise` branch in every
/// other case (including absence).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRoute {
    pub field: String,
    pub proceed_on: Vec<String>,
    pub otherwise: BranchKey,
}

impl StatusRoute {
    pub fn new(field: impl Into<String>, proceed_on: impl Into<String>, otherwise: BranchKey) -> Self {
        Self {
            field: field.into(),
            proceed_on: vec![proceed_on.into()],
            otherwise,
        }
    }

    /// Also proceed on `value`.
    pub fn or(mut self, value: impl Into<String>) -> Self {
        self.proceed_on.push(value.into());
        self
    }

    pub fn evaluate(&self, state: &WorkflowState) -> BranchKey {
        match state.field_str(&self.field) {
            Some(v) if self.proceed_on.iter().any(|p| p == v) => BranchKey::Proceed,
            _ => self.otherwise,
        }
    }
}

type PredicateFn = dyn Fn(&WorkflowState) -> BranchKey + Send + Sync;

/// Pure function of the state selecting a branch.
#[derive(Clone)]
pub enum Predicate {
    Status(StatusRoute),
    /// Arbitrary closure; the label is shown in graph exports.
    Custom { label: String, f: Arc<PredicateFn> },
}

impl Predicate {
    pub fn custom(
        label: impl Into<String>,
        f: impl Fn(&WorkflowState) -> BranchKey + Send + Sync + 'static,
    ) -> Self {
        Self::Custom {
            label: label.into(),
            f: Arc::new(f),
        }
    }

    pub fn evaluate(&self, state: &WorkflowState) -> BranchKey {
        match self {
            Self::Status(route) => route.evaluate(state),
            Self::Custom { f, .. } => f(state),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Status(route) => {
                format!("{} == {}", route.field, route.proceed_on.join(" | "))
            }
            Self::Custom { label, .. } => label.clone(),
        }
    }

    /// Every branch the predicate can produce, when that is statically known.
    pub fn possible_branches(&self) -> Option<Vec<BranchKey>> {
        match self {
            Self::Status(route) => Some(vec![BranchKey::Proceed, route.otherwise]),
            Self::Custom { .. } => None,
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(route) => f.debug_tuple("Status").field(route).finish(),
            Self::Custom { label, .. } => f.debug_struct("Custom").field("label", label).finish(),
        }
    }
}

impl From<StatusRoute> for Predicate {
    fn from(route: StatusRoute) -> Self {
        Self::Status(route)
    }
}

/// The single outgoing transition of a step.
#[derive(Debug, Clone)]
pub enum Transition {
    Direct(String),
    Conditional {
        predicate: Predicate,
        branches: BTreeMap<BranchKey, String>,
    },
}

impl Transition {
    /// Resolve the next step id for a step that just completed with `state`.
    pub fn resolve(&self, from: &str, state: &WorkflowState) -> Result<String> {
        match self {
            Self::Direct(to) => Ok(to.clone()),
            Self::Conditional { predicate, branches } => {
                let key = predicate.evaluate(state);
                branches
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| DevflowError::UnknownBranch {
                        step: from.to_string(),
                        branch: key.to_string(),
                    })
            }
        }
    }

    /// All possible target step ids.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Self::Direct(to) => vec![to.as_str()],
            Self::Conditional { branches, .. } => branches.values().map(String::as_str).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_core::state::status;

    fn design_route() -> Transition {
        Transition::Conditional {
            predicate: StatusRoute::new("design_review_status", status::APPROVED, BranchKey::Revise)
                .into(),
            branches: BTreeMap::from([
                (BranchKey::Proceed, "generate_code".to_string()),
                (BranchKey::Revise, "create_design_documents".to_string()),
            ]),
        }
    }

    #[test]
    fn test_absent_status_takes_conservative_branch() {
        let route = StatusRoute::new("qa_status", status::PASSED, BranchKey::Fix);
        assert_eq!(route.evaluate(&WorkflowState::default()), BranchKey::Fix);

        let next = design_route()
            .resolve("review_design", &WorkflowState::default())
            .unwrap();
        assert_eq!(next, "create_design_documents");
    }

    #[test]
    fn test_status_match_is_exact() {
        let route = StatusRoute::new("review_status", status::APPROVED, BranchKey::Revise);
        let mut state = WorkflowState::default();

        state.set_field_str("review_status", "Approved");
        assert_eq!(route.evaluate(&state), BranchKey::Proceed);

        state.set_field_str("review_status", "approved");
        assert_eq!(route.evaluate(&state), BranchKey::Revise);

        state.set_field_str("review_status", status::PENDING_USER_APPROVAL);
        assert_eq!(route.evaluate(&state), BranchKey::Revise);
    }

    #[test]
    fn test_status_route_alternatives() {
        let route = StatusRoute::new("security_review_status", status::APPROVED, BranchKey::Fix)
            .or(status::FIXED);
        let mut state = WorkflowState::default();
        state.set_field_str("security_review_status", status::FIXED);
        assert_eq!(route.evaluate(&state), BranchKey::Proceed);
    }

    #[test]
    fn test_unmapped_branch_is_an_error() {
        let transition = Transition::Conditional {
            predicate: Predicate::custom("always fix", |_| BranchKey::Fix),
            branches: BTreeMap::from([(BranchKey::Proceed, "next".to_string())]),
        };
        let err = transition
            .resolve("review_code", &WorkflowState::default())
            .unwrap_err();
        assert!(matches!(
            err,
            DevflowError::UnknownBranch { step, branch } if step == "review_code" && branch == "fix"
        ));
    }

    #[test]
    fn test_labels_and_branches() {
        let predicate: Predicate =
            StatusRoute::new("code_review_status", status::APPROVED, BranchKey::Fix).into();
        assert_eq!(predicate.label(), "code_review_status == Approved");
        assert_eq!(
            predicate.possible_branches(),
            Some(vec![BranchKey::Proceed, BranchKey::Fix])
        );
        assert!(Predicate::custom("x", |_| BranchKey::Proceed)
            .possible_branches()
            .is_none());
        assert_eq!(design_route().targets().len(), 2);
    }
}
