use futures::future::BoxFuture;
use tracing::info;

use devflow_core::error::Result;
use devflow_core::state::WorkflowState;
use devflow_core::traits::Step;
use devflow_core::types::StepContext;

use super::{ids, or_missing, prompts, StepEnv};
use crate::artifacts::ArtifactDir;

pub struct WriteTestCases {
    env: StepEnv,
}

impl WriteTestCases {
    pub fn new(env: StepEnv) -> Self {
        Self { env }
    }
}

impl Step for WriteTestCases {
    fn id(&self) -> &str {
        ids::WRITE_TEST_CASES
    }

    fn description(&self) -> &str {
        "Write unit, integration and end-to-end tests"
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let prompt = prompts::write_test_cases(
                or_missing(state.user_stories.as_deref()),
                or_missing(state.code.as_deref()),
            );
            let tests = self.env.ask(&ctx, prompt).await?;

            self.env.writer().write("test_cases.md", &tests).await?;
            let files = self.env.writer().materialize(ArtifactDir::Tests, &tests).await;

            info!(files = files.len(), "Test cases written");
            state.test_cases = Some(tests);
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

    #[tokio::test]
    async fn tests_land_in_tests_dir() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::new("```test_tasks.py\ndef test_add(): ...\n```"));
        let step = WriteTestCases::new(StepEnv::new(generator.clone(), ArtifactWriter::new(dir.path())));

        let mut state = WorkflowState::new("Demo");
        state.user_stories = Some("As a user I add tasks".into());
        let state = step.run(state, step_context(ids::WRITE_TEST_CASES)).await.unwrap();

        assert!(state.test_cases.is_some());
        assert!(generator.prompts()[0].contains("As a user I add tasks"));
        assert!(dir.path().join("test_cases.md").exists());
        assert!(dir.path().join("tests/test_tasks.py").exists());
    }
}
