use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use devflow_agent::gate::{Approver, GatedReview};
use devflow_agent::graph::{GraphBuilder, StatusRoute, StepRegistry, WorkflowGraph};
use devflow_core::error::{DevflowError, Result};
use devflow_core::state::status;
use devflow_core::traits::TextGenerator;
use devflow_core::types::{BranchKey, END};

use crate::artifacts::ArtifactWriter;
use crate::builtin::{self, ids, review, StepEnv};

/// The built-in graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pipeline {
    /// Full SDLC graph with review and fix loops.
    #[default]
    Sdlc,
    /// Straight run without reviews.
    Linear,
}

impl Pipeline {
    pub fn as_str(self) -> &'static str {
        match self {
            Pipeline::Sdlc => "sdlc",
            Pipeline::Linear => "linear",
        }
    }

    pub fn build(self, registry: &StepRegistry) -> Result<WorkflowGraph> {
        match self {
            Pipeline::Sdlc => sdlc_graph(registry),
            Pipeline::Linear => linear_graph(registry),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pipeline {
    type Err = DevflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sdlc" | "full" => Ok(Pipeline::Sdlc),
            "linear" => Ok(Pipeline::Linear),
            other => Err(DevflowError::Validation(format!(
                "unknown pipeline '{}': expected sdlc or linear",
                other
            ))),
        }
    }
}

/// Registry holding every catalog step.
pub fn builtin_registry(generator: Arc<dyn TextGenerator>, writer: ArtifactWriter) -> StepRegistry {
    let env = StepEnv::new(generator, writer);
    let mut registry = StepRegistry::new();
    for step in builtin::all(&env) {
        registry.register_arc(step);
    }
    registry
}

fn with_steps(registry: &StepRegistry, steps: &[&str]) -> Result<GraphBuilder> {
    let mut builder = GraphBuilder::new();
    for id in steps {
        builder = builder.step_arc(registry.require(id)?);
    }
    Ok(builder)
}

const SDLC_STEPS: [&str; 19] = [
    ids::GATHER_REQUIREMENTS,
    ids::GENERATE_USER_STORIES,
    ids::REVIEW_USER_STORIES,
    ids::REVISE_USER_STORIES,
    ids::CREATE_DESIGN_DOCUMENTS,
    ids::REVIEW_DESIGN,
    ids::GENERATE_CODE,
    ids::REVIEW_CODE,
    ids::FIX_CODE_AFTER_REVIEW,
    ids::SECURITY_REVIEW,
    ids::FIX_CODE_AFTER_SECURITY,
    ids::WRITE_TEST_CASES,
    ids::REVIEW_TEST_CASES,
    ids::FIX_TEST_CASES,
    ids::QA_TESTING,
    ids::FIX_CODE_AFTER_QA,
    ids::DEPLOY_APPLICATION,
    ids::MONITOR_APPLICATION,
    ids::MAINTAIN_APPLICATION,
];

const LINEAR_STEPS: [&str; 7] = [
    ids::GATHER_REQUIREMENTS,
    ids::GENERATE_USER_STORIES,
    ids::CREATE_DESIGN_DOCUMENTS,
    ids::GENERATE_CODE,
    ids::WRITE_TEST_CASES,
    ids::QA_TESTING,
    ids::DEPLOY_APPLICATION,
];

/// The full delivery graph. Every review routes forward only on an
/// explicit pass; anything else, including a missing status, loops back.
pub fn sdlc_graph(registry: &StepRegistry) -> Result<WorkflowGraph> {
    with_steps(registry, &SDLC_STEPS)?
        .entry(ids::GATHER_REQUIREMENTS)
        .edge(ids::GATHER_REQUIREMENTS, ids::GENERATE_USER_STORIES)
        .edge(ids::GENERATE_USER_STORIES, ids::REVIEW_USER_STORIES)
        .edge(ids::REVISE_USER_STORIES, ids::REVIEW_USER_STORIES)
        .status_route(
            ids::REVIEW_USER_STORIES,
            StatusRoute::new("review_status", status::APPROVED, BranchKey::Revise),
            ids::CREATE_DESIGN_DOCUMENTS,
            ids::REVISE_USER_STORIES,
        )
        .edge(ids::CREATE_DESIGN_DOCUMENTS, ids::REVIEW_DESIGN)
        .status_route(
            ids::REVIEW_DESIGN,
            StatusRoute::new("design_review_status", status::APPROVED, BranchKey::Revise),
            ids::GENERATE_CODE,
            ids::CREATE_DESIGN_DOCUMENTS,
        )
        .edge(ids::GENERATE_CODE, ids::REVIEW_CODE)
        .status_route(
            ids::REVIEW_CODE,
            StatusRoute::new("code_review_status", status::APPROVED, BranchKey::Fix),
            ids::SECURITY_REVIEW,
            ids::FIX_CODE_AFTER_REVIEW,
        )
        .edge(ids::FIX_CODE_AFTER_REVIEW, ids::SECURITY_REVIEW)
        .status_route(
            ids::SECURITY_REVIEW,
            StatusRoute::new("security_review_status", status::APPROVED, BranchKey::Fix),
            ids::WRITE_TEST_CASES,
            ids::FIX_CODE_AFTER_SECURITY,
        )
        .edge(ids::FIX_CODE_AFTER_SECURITY, ids::WRITE_TEST_CASES)
        .edge(ids::WRITE_TEST_CASES, ids::REVIEW_TEST_CASES)
        .status_route(
            ids::REVIEW_TEST_CASES,
            StatusRoute::new("test_review_status", status::APPROVED, BranchKey::Fix),
            ids::QA_TESTING,
            ids::FIX_TEST_CASES,
        )
        .edge(ids::FIX_TEST_CASES, ids::QA_TESTING)
        .status_route(
            ids::QA_TESTING,
            StatusRoute::new("qa_status", status::PASSED, BranchKey::Fix),
            ids::DEPLOY_APPLICATION,
            ids::FIX_CODE_AFTER_QA,
        )
        .edge(ids::FIX_CODE_AFTER_QA, ids::QA_TESTING)
        .edge(ids::DEPLOY_APPLICATION, ids::MONITOR_APPLICATION)
        .edge(ids::MONITOR_APPLICATION, ids::MAINTAIN_APPLICATION)
        .edge(ids::MAINTAIN_APPLICATION, END)
        .build()
}

/// Seven steps straight through, no conditional edges.
pub fn linear_graph(registry: &StepRegistry) -> Result<WorkflowGraph> {
    let mut builder = with_steps(registry, &LINEAR_STEPS)?.entry(LINEAR_STEPS[0]);
    for pair in LINEAR_STEPS.windows(2) {
        builder = builder.edge(pair[0], pair[1]);
    }
    builder.edge(LINEAR_STEPS[LINEAR_STEPS.len() - 1], END).build()
}

/// Which state fields a human gate on a review step looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateTarget {
    pub step: &'static str,
    pub artifact_field: &'static str,
    pub status_field: &'static str,
    pub feedback_field: &'static str,
}

/// Gate target for a review step whose pass value is `Approved`.
pub fn gate_target(step: &str) -> Option<GateTarget> {
    review::spec_for(step)
        .filter(|spec| spec.approved == status::APPROVED)
        .map(|spec| GateTarget {
            step: spec.id,
            artifact_field: spec.artifact_field,
            status_field: spec.status_field,
            feedback_field: spec.feedback_field,
        })
}

/// Wrap each named review step in a [`GatedReview`] asking `approver`.
pub fn apply_gates(
    registry: &mut StepRegistry,
    steps: &[String],
    approver: Arc<dyn Approver>,
    max_rounds: usize,
) -> Result<()> {
    for step in steps {
        let target = gate_target(step).ok_or_else(|| {
            DevflowError::Config(format!("step '{}' is not a gateable review step", step))
        })?;
        let approver = approver.clone();
        registry.wrap(step, move |inner| {
            Arc::new(
                GatedReview::new(inner, approver, target.artifact_field, target.status_field)
                    .with_feedback_field(target.feedback_field)
                    .with_max_rounds(max_rounds),
            )
        })?;
        info!(step = %step, artifact = target.artifact_field, "Human approval gate installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_agent::gate::{ApprovalOutcome, ReviewRequest};
    use devflow_core::types::StepContext;
    use devflow_test_utils::ScriptedGenerator;
    use futures::future::BoxFuture;

    struct AlwaysApprove;

    impl Approver for AlwaysApprove {
        fn review(&self, _request: ReviewRequest, _ctx: StepContext) -> BoxFuture<'_, Result<ApprovalOutcome>> {
            Box::pin(async { Ok(ApprovalOutcome::Approved) })
        }
    }

    fn registry() -> StepRegistry {
        let dir = std::env::temp_dir().join("devflow-pipeline-unit");
        builtin_registry(Arc::new(ScriptedGenerator::new("Approved")), ArtifactWriter::new(dir))
    }

    #[test]
    fn sdlc_graph_shape() {
        let graph = sdlc_graph(&registry()).unwrap();
        let description = graph.describe();

        // 19 steps plus start and end
        assert_eq!(description.nodes.len(), 21);
        assert_eq!(graph.entry(), ids::GATHER_REQUIREMENTS);

        let conditional: Vec<_> = description
            .edges
            .iter()
            .filter(|e| e.branch.is_some())
            .collect();
        assert_eq!(conditional.len(), 12);
        assert!(description.edges.iter().any(|e| e.source == ids::FIX_CODE_AFTER_QA
            && e.target == ids::QA_TESTING));
        assert!(description
            .edges
            .iter()
            .any(|e| e.source == ids::MAINTAIN_APPLICATION && e.target == END));
    }

    #[test]
    fn linear_graph_has_only_direct_edges() {
        let graph = linear_graph(&registry()).unwrap();
        let description = graph.describe();
        assert_eq!(description.nodes.len(), 9);
        assert!(description.edges.iter().all(|e| e.branch.is_none()));
        assert!(!graph.has_node(ids::REVIEW_USER_STORIES));
    }

    #[test]
    fn missing_catalog_step_is_reported() {
        let err = sdlc_graph(&StepRegistry::new()).unwrap_err();
        assert!(matches!(err, DevflowError::UnknownStep(id) if id == ids::GATHER_REQUIREMENTS));
    }

    #[test]
    fn gate_targets() {
        let target = gate_target(ids::REVIEW_USER_STORIES).unwrap();
        assert_eq!(target.artifact_field, "user_stories");
        assert_eq!(target.status_field, "review_status");
        assert_eq!(target.feedback_field, "review_feedback");
        assert_eq!(gate_target(ids::SECURITY_REVIEW).unwrap().artifact_field, "code");
        // QA passes on "Passed", which a human gate cannot produce.
        assert!(gate_target(ids::QA_TESTING).is_none());
        assert!(gate_target(ids::GENERATE_CODE).is_none());
    }

    #[test]
    fn apply_gates_wraps_named_steps() {
        let mut registry = registry();
        apply_gates(
            &mut registry,
            &["review_user_stories".to_string(), "review_design".to_string()],
            Arc::new(AlwaysApprove),
            5,
        )
        .unwrap();
        assert_eq!(registry.len(), 19);
        assert!(sdlc_graph(&registry).is_ok());

        let err = apply_gates(&mut registry, &["qa_testing".to_string()], Arc::new(AlwaysApprove), 5)
            .unwrap_err();
        assert!(matches!(err, DevflowError::Config(_)));
    }

    #[test]
    fn pipeline_names() {
        assert_eq!("linear".parse::<Pipeline>().unwrap(), Pipeline::Linear);
        assert_eq!(" SDLC ".parse::<Pipeline>().unwrap(), Pipeline::Sdlc);
        assert!("waterfall".parse::<Pipeline>().is_err());
    }
}
