use futures::future::BoxFuture;
use tracing::info;

use devflow_core::error::Result;
use devflow_core::state::{status, WorkflowState};
use devflow_core::traits::Step;
use devflow_core::types::StepContext;

use super::{ids, or_missing, prompts, StepEnv};

pub struct CreateDesignDocuments {
    env: StepEnv,
}

impl CreateDesignDocuments {
    pub fn new(env: StepEnv) -> Self {
        Self { env }
    }
}

impl Step for CreateDesignDocuments {
    fn id(&self) -> &str {
        ids::CREATE_DESIGN_DOCUMENTS
    }

    fn description(&self) -> &str {
        "Write functional and technical design documents"
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            // Revisited through the design review's revise edge.
            let feedback = match state.design_review_status.as_deref() {
                Some(status::NEEDS_REVISION) => state.design_review_feedback.as_deref(),
                _ => None,
            };
            let prompt = prompts::design(
                or_missing(state.project_name.as_deref()),
                or_missing(state.user_stories.as_deref()),
                feedback,
            );
            let design = self.env.ask(&ctx, prompt).await?;
            self.env.writer().write("design_documents.md", &design).await?;

            info!(revision = feedback.is_some(), "Design documents written");
            state.design_documents = Some(design);
            Ok(state)
        })
    }
}
