use futures::future::BoxFuture;
use tracing::{info, warn};

use devflow_core::error::Result;
use devflow_core::state::{status, WorkflowState};
use devflow_core::traits::Step;
use devflow_core::types::StepContext;

use super::{ids, or_missing, prompts, StepEnv};
use crate::verdict::Verdict;

/// One automated review stage: which field is reviewed, where the feedback
/// and the status go, and which reply marker means approval.
pub struct ReviewSpec {
    pub id: &'static str,
    pub description: &'static str,
    pub artifact_field: &'static str,
    pub feedback_field: &'static str,
    pub status_field: &'static str,
    pub marker: &'static str,
    pub approved: &'static str,
    pub rejected: &'static str,
    /// File the feedback is saved to, if any.
    pub output: Option<&'static str>,
    pub prompt: fn(&WorkflowState) -> String,
}

fn user_stories_prompt(state: &WorkflowState) -> String {
    prompts::review_user_stories(or_missing(state.user_stories.as_deref()))
}

fn design_prompt(state: &WorkflowState) -> String {
    prompts::review_design(or_missing(state.design_documents.as_deref()))
}

fn code_prompt(state: &WorkflowState) -> String {
    prompts::review_code(or_missing(state.code.as_deref()))
}

fn security_prompt(state: &WorkflowState) -> String {
    prompts::security_review(or_missing(state.code.as_deref()))
}

fn test_cases_prompt(state: &WorkflowState) -> String {
    prompts::review_test_cases(or_missing(state.test_cases.as_deref()))
}

fn qa_prompt(state: &WorkflowState) -> String {
    prompts::qa_testing(
        or_missing(state.code.as_deref()),
        or_missing(state.test_cases.as_deref()),
    )
}

pub static USER_STORIES: ReviewSpec = ReviewSpec {
    id: ids::REVIEW_USER_STORIES,
    description: "Review the user stories",
    artifact_field: "user_stories",
    feedback_field: "review_feedback",
    status_field: "review_status",
    marker: prompts::APPROVAL_MARKER,
    approved: status::APPROVED,
    rejected: status::NEEDS_REVISION,
    output: None,
    prompt: user_stories_prompt,
};

pub static DESIGN: ReviewSpec = ReviewSpec {
    id: ids::REVIEW_DESIGN,
    description: "Review the design documents",
    artifact_field: "design_documents",
    feedback_field: "design_review_feedback",
    status_field: "design_review_status",
    marker: prompts::APPROVAL_MARKER,
    approved: status::APPROVED,
    rejected: status::NEEDS_REVISION,
    output: None,
    prompt: design_prompt,
};

pub static CODE: ReviewSpec = ReviewSpec {
    id: ids::REVIEW_CODE,
    description: "Review the generated code",
    artifact_field: "code",
    feedback_field: "code_review_feedback",
    status_field: "code_review_status",
    marker: prompts::APPROVAL_MARKER,
    approved: status::APPROVED,
    rejected: status::NEEDS_REVISION,
    output: Some("code_review.md"),
    prompt: code_prompt,
};

pub static SECURITY: ReviewSpec = ReviewSpec {
    id: ids::SECURITY_REVIEW,
    description: "Audit the code for vulnerabilities",
    artifact_field: "code",
    feedback_field: "security_review_feedback",
    status_field: "security_review_status",
    marker: prompts::APPROVAL_MARKER,
    approved: status::APPROVED,
    rejected: status::NEEDS_SECURITY_FIXES,
    output: Some("security_review.md"),
    prompt: security_prompt,
};

pub static TEST_CASES: ReviewSpec = ReviewSpec {
    id: ids::REVIEW_TEST_CASES,
    description: "Review the test cases",
    artifact_field: "test_cases",
    feedback_field: "test_review_feedback",
    status_field: "test_review_status",
    marker: prompts::APPROVAL_MARKER,
    approved: status::APPROVED,
    rejected: status::NEEDS_REVISION,
    output: Some("test_review.md"),
    prompt: test_cases_prompt,
};

pub static QA: ReviewSpec = ReviewSpec {
    id: ids::QA_TESTING,
    description: "Simulate running the tests against the code",
    artifact_field: "code",
    feedback_field: "qa_results",
    status_field: "qa_status",
    marker: prompts::QA_PASSED_MARKER,
    approved: status::PASSED,
    rejected: status::FAILED,
    output: Some("qa_results.md"),
    prompt: qa_prompt,
};

/// Every review stage, keyed by step id.
pub fn spec_for(step: &str) -> Option<&'static ReviewSpec> {
    [&USER_STORIES, &DESIGN, &CODE, &SECURITY, &TEST_CASES, &QA]
        .into_iter()
        .find(|spec| spec.id == step)
}

/// Runs a [`ReviewSpec`]: prompt, store the feedback, record the verdict.
pub struct ReviewStep {
    env: StepEnv,
    spec: &'static ReviewSpec,
}

impl ReviewStep {
    pub fn new(env: StepEnv, spec: &'static ReviewSpec) -> Self {
        Self { env, spec }
    }

    pub fn spec(&self) -> &'static ReviewSpec {
        self.spec
    }
}

impl Step for ReviewStep {
    fn id(&self) -> &str {
        self.spec.id
    }

    fn description(&self) -> &str {
        self.spec.description
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let spec = self.spec;
            if state.field_str(spec.artifact_field).is_none() {
                warn!(step = spec.id, field = spec.artifact_field, "Reviewing an absent artifact");
            }

            let feedback = self.env.ask(&ctx, (spec.prompt)(&state)).await?;
            let verdict = Verdict::from_reply(&feedback, spec.marker);
            let outcome = verdict.status(spec.approved, spec.rejected);

            if let Some(file) = spec.output {
                self.env.writer().write(file, &feedback).await?;
            }
            state.set_field_str(spec.feedback_field, feedback);
            state.set_field_str(spec.status_field, outcome);

            info!(step = spec.id, status = outcome, "Review complete");
            Ok(state)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::artifacts::ArtifactWriter;
    use devflow_test_utils::{step_context, ScriptedGenerator};

    fn env(reply: &str, dir: &tempfile::TempDir) -> (StepEnv, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::new(reply));
        let env = StepEnv::new(generator.clone(), ArtifactWriter::new(dir.path()));
        (env, generator)
    }

    #[tokio::test]
    async fn approval_marker_sets_approved() {
        let dir = tempfile::tempdir().unwrap();
        let (env, generator) = env("Clear and complete. Approved", &dir);
        let step = ReviewStep::new(env, &CODE);

        let mut state = WorkflowState::new("Demo");
        state.code = Some("```app.py\nprint(1)\n```".into());
        let state = step.run(state, step_context(ids::REVIEW_CODE)).await.unwrap();

        assert_eq!(state.code_review_status.as_deref(), Some(status::APPROVED));
        assert_eq!(state.code_review_feedback.as_deref(), Some("Clear and complete. Approved"));
        assert!(generator.prompts()[0].contains("print(1)"));
        let saved = std::fs::read_to_string(dir.path().join("code_review.md")).unwrap();
        assert_eq!(saved, "Clear and complete. Approved");
    }

    #[tokio::test]
    async fn security_rejection_uses_its_own_status() {
        let dir = tempfile::tempdir().unwrap();
        let (env, _) = env("SQL injection in login. Needs Security Fixes", &dir);
        let step = ReviewStep::new(env, &SECURITY);

        let state = step
            .run(WorkflowState::new("Demo"), step_context(ids::SECURITY_REVIEW))
            .await
            .unwrap();
        assert_eq!(
            state.security_review_status.as_deref(),
            Some(status::NEEDS_SECURITY_FIXES)
        );
    }

    #[tokio::test]
    async fn qa_needs_exact_marker() {
        let dir = tempfile::tempdir().unwrap();
        let (env, generator) = env("2 of 3 passed. QA Testing: Failed", &dir);
        let step = ReviewStep::new(env, &QA);

        let mut state = WorkflowState::new("Demo");
        state.test_cases = Some("test_login".into());
        let state = step.run(state, step_context(ids::QA_TESTING)).await.unwrap();

        assert_eq!(state.qa_status.as_deref(), Some(status::FAILED));
        assert_eq!(state.qa_results.as_deref(), Some("2 of 3 passed. QA Testing: Failed"));
        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("test_login"));
        assert!(prompt.contains(crate::builtin::MISSING));
    }

    #[tokio::test]
    async fn story_review_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let (env, _) = env("Needs Revision: add acceptance criteria", &dir);
        let step = ReviewStep::new(env, &USER_STORIES);

        let state = step
            .run(WorkflowState::new("Demo"), step_context(ids::REVIEW_USER_STORIES))
            .await
            .unwrap();
        assert_eq!(state.review_status.as_deref(), Some(status::NEEDS_REVISION));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn lookup_by_step_id() {
        assert_eq!(spec_for(ids::REVIEW_DESIGN).unwrap().status_field, "design_review_status");
        assert_eq!(spec_for(ids::QA_TESTING).unwrap().marker, "QA Testing: Passed");
        assert!(spec_for(ids::GENERATE_CODE).is_none());
    }
}
