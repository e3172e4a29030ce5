use futures::future::BoxFuture;
use tracing::info;

use devflow_core::error::Result;
use devflow_core::state::WorkflowState;
use devflow_core::traits::Step;
use devflow_core::types::StepContext;

use super::{ids, or_missing, prompts, StepEnv};
use crate::artifacts::ArtifactDir;

pub struct GenerateCode {
    env: StepEnv,
}

impl GenerateCode {
    pub fn new(env: StepEnv) -> Self {
        Self { env }
    }
}

impl Step for GenerateCode {
    fn id(&self) -> &str {
        ids::GENERATE_CODE
    }

    fn description(&self) -> &str {
        "Implement the design"
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let prompt = prompts::generate_code(
                or_missing(state.project_name.as_deref()),
                or_missing(state.design_documents.as_deref()),
            );
            let code = self.env.ask(&ctx, prompt).await?;

            self.env.writer().write("generated_code.md", &code).await?;
            let files = self.env.writer().materialize(ArtifactDir::Code, &code).await;

            info!(files = files.len(), "Code generated");
            state.code = Some(code);
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
    async fn writes_markdown_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let reply = "Layout:\n```app/main.py\nprint('todo')\n```\n```/etc/hosts\nbad\n```\n";
        let generator = Arc::new(ScriptedGenerator::new(reply));
        let step = GenerateCode::new(StepEnv::new(generator, ArtifactWriter::new(dir.path())));

        let state = step
            .run(WorkflowState::new("Demo"), step_context(ids::GENERATE_CODE))
            .await
            .unwrap();

        assert_eq!(state.code.as_deref(), Some(reply));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("generated_code.md")).unwrap(),
            reply
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("code/app/main.py")).unwrap(),
            "print('todo')"
        );
        assert!(!dir.path().join("code/etc/hosts").exists());
    }
}
