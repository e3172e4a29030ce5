use futures::future::BoxFuture;
use tracing::info;

use devflow_core::error::Result;
use devflow_core::state::WorkflowState;
use devflow_core::traits::Step;
use devflow_core::types::StepContext;

use super::{ids, prompts, StepEnv, MISSING};

/// Writes user stories from the requirements. The revision variant also
/// feeds the story review feedback back into the prompt.
pub struct GenerateUserStories {
    env: StepEnv,
    revision: bool,
}

impl GenerateUserStories {
    pub fn new(env: StepEnv) -> Self {
        Self { env, revision: false }
    }

    pub fn revision(env: StepEnv) -> Self {
        Self { env, revision: true }
    }
}

impl Step for GenerateUserStories {
    fn id(&self) -> &str {
        if self.revision {
            ids::REVISE_USER_STORIES
        } else {
            ids::GENERATE_USER_STORIES
        }
    }

    fn description(&self) -> &str {
        if self.revision {
            "Rewrite the user stories from review feedback"
        } else {
            "Write user stories from the requirements"
        }
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let requirements = state.requirements_text().unwrap_or_else(|| MISSING.to_string());
            let feedback = if self.revision {
                state.review_feedback.as_deref()
            } else {
                None
            };

            let stories = self
                .env
                .ask(&ctx, prompts::user_stories(&requirements, feedback))
                .await?;
            self.env.writer().write("user_stories.md", &stories).await?;

            info!(revision = self.revision, "User stories written");
            state.user_stories = Some(stories);
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

    fn state() -> WorkflowState {
        let mut state = WorkflowState::new("Demo");
        state.requirements = Some(serde_json::json!({"functional": ["share lists"]}));
        state.review_feedback = Some("Add an admin role".into());
        state
    }

    #[tokio::test]
    async fn first_draft_ignores_feedback() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::new("As a user, I want lists"));
        let step = GenerateUserStories::new(StepEnv::new(generator.clone(), ArtifactWriter::new(dir.path())));

        let out = step.run(state(), step_context(ids::GENERATE_USER_STORIES)).await.unwrap();

        assert_eq!(out.user_stories.as_deref(), Some("As a user, I want lists"));
        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("share lists"));
        assert!(!prompt.contains("Add an admin role"));
        assert!(dir.path().join("user_stories.md").exists());
    }

    #[tokio::test]
    async fn revision_includes_feedback() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::new("As an admin, I want..."));
        let step = GenerateUserStories::revision(StepEnv::new(generator.clone(), ArtifactWriter::new(dir.path())));
        assert_eq!(step.id(), ids::REVISE_USER_STORIES);

        step.run(state(), step_context(ids::REVISE_USER_STORIES)).await.unwrap();
        assert!(generator.prompts()[0].contains("Revision feedback:\nAdd an admin role"));
    }
}
