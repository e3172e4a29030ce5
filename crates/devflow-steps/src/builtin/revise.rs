use futures::future::BoxFuture;
use tracing::info;

use devflow_core::error::Result;
use devflow_core::state::{status, WorkflowState};
use devflow_core::traits::Step;
use devflow_core::types::StepContext;

use super::{ids, or_missing, prompts, StepEnv};
use crate::artifacts::ArtifactDir;

/// One fix stage: rewrite an artifact from the feedback a review left.
pub struct ReviseSpec {
    pub id: &'static str,
    pub description: &'static str,
    pub artifact_field: &'static str,
    pub feedback_field: &'static str,
    /// Also receives the rewritten artifact, e.g. `fixed_code`.
    pub copy_field: &'static str,
    /// `(field, value)` written once the fix is applied.
    pub status: Option<(&'static str, &'static str)>,
    pub output: &'static str,
    pub extract_to: ArtifactDir,
    pub prompt: fn(&str, &str) -> String,
}

pub static FIX_AFTER_REVIEW: ReviseSpec = ReviseSpec {
    id: ids::FIX_CODE_AFTER_REVIEW,
    description: "Apply code review feedback",
    artifact_field: "code",
    feedback_field: "code_review_feedback",
    copy_field: "fixed_code",
    status: Some(("code_review_status", status::FIXED)),
    output: "fixed_code.md",
    extract_to: ArtifactDir::Code,
    prompt: prompts::fix_code,
};

pub static FIX_AFTER_SECURITY: ReviseSpec = ReviseSpec {
    id: ids::FIX_CODE_AFTER_SECURITY,
    description: "Fix reported vulnerabilities",
    artifact_field: "code",
    feedback_field: "security_review_feedback",
    copy_field: "security_fixed_code",
    status: Some(("security_review_status", status::FIXED)),
    output: "security_fixed_code.md",
    extract_to: ArtifactDir::Code,
    prompt: prompts::fix_security,
};

pub static FIX_TEST_CASES: ReviseSpec = ReviseSpec {
    id: ids::FIX_TEST_CASES,
    description: "Apply test review feedback",
    artifact_field: "test_cases",
    feedback_field: "test_review_feedback",
    copy_field: "fixed_test_cases",
    status: Some(("test_review_status", status::FIXED)),
    output: "fixed_test_cases.md",
    extract_to: ArtifactDir::Tests,
    prompt: prompts::fix_test_cases,
};

pub static FIX_AFTER_QA: ReviseSpec = ReviseSpec {
    id: ids::FIX_CODE_AFTER_QA,
    description: "Fix the code against failed QA tests",
    artifact_field: "code",
    feedback_field: "qa_results",
    copy_field: "qa_fixed_code",
    status: None,
    output: "qa_fixed_code.md",
    extract_to: ArtifactDir::Code,
    prompt: prompts::fix_after_qa,
};

/// Runs a [`ReviseSpec`].
pub struct ReviseStep {
    env: StepEnv,
    spec: &'static ReviseSpec,
}

impl ReviseStep {
    pub fn new(env: StepEnv, spec: &'static ReviseSpec) -> Self {
        Self { env, spec }
    }
}

impl Step for ReviseStep {
    fn id(&self) -> &str {
        self.spec.id
    }

    fn description(&self) -> &str {
        self.spec.description
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let spec = self.spec;
            let prompt = (spec.prompt)(
                or_missing(state.field_str(spec.artifact_field)),
                or_missing(state.field_str(spec.feedback_field)),
            );
            let revised = self.env.ask(&ctx, prompt).await?;

            self.env.writer().write(spec.output, &revised).await?;
            let files = self.env.writer().materialize(spec.extract_to, &revised).await;

            state.set_field_str(spec.copy_field, revised.clone());
            state.set_field_str(spec.artifact_field, revised);
            if let Some((field, value)) = spec.status {
                state.set_field_str(field, value);
            }

            info!(step = spec.id, files = files.len(), "Revision applied");
            Ok(state)
        })
    }
}
