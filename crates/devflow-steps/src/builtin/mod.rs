//! The SDLC step catalog.
//!
//! Every step prompts the text generator, writes the reply back into the
//! workflow state and persists it through the [`ArtifactWriter`]. Review
//! and fix steps share one implementation each, configured per stage.

pub mod code;
pub mod design;
pub mod prompts;
pub mod release;
pub mod requirements;
pub mod review;
pub mod revise;
pub mod stories;
pub mod testing;

use std::sync::Arc;

use tracing::debug;

use devflow_core::error::Result;
use devflow_core::traits::{Step, TextGenerator};
use devflow_core::types::StepContext;

use crate::artifacts::ArtifactWriter;

pub use code::GenerateCode;
pub use design::CreateDesignDocuments;
pub use release::{DeployApplication, MaintainApplication, MonitorApplication};
pub use requirements::GatherRequirements;
pub use review::{ReviewSpec, ReviewStep};
pub use revise::{ReviseSpec, ReviseStep};
pub use stories::GenerateUserStories;
pub use testing::WriteTestCases;

/// Step identifiers of the catalog.
pub mod ids {
    pub const GATHER_REQUIREMENTS: &str = "gather_requirements";
    pub const GENERATE_USER_STORIES: &str = "generate_user_stories";
    pub const REVIEW_USER_STORIES: &str = "review_user_stories";
    pub const REVISE_USER_STORIES: &str = "revise_user_stories";
    pub const CREATE_DESIGN_DOCUMENTS: &str = "create_design_documents";
    pub const REVIEW_DESIGN: &str = "review_design";
    pub const GENERATE_CODE: &str = "generate_code";
    pub const REVIEW_CODE: &str = "review_code";
    pub const FIX_CODE_AFTER_REVIEW: &str = "fix_code_after_review";
    pub const SECURITY_REVIEW: &str = "security_review";
    pub const FIX_CODE_AFTER_SECURITY: &str = "fix_code_after_security";
    pub const WRITE_TEST_CASES: &str = "write_test_cases";
    pub const REVIEW_TEST_CASES: &str = "review_test_cases";
    pub const FIX_TEST_CASES: &str = "fix_test_cases";
    pub const QA_TESTING: &str = "qa_testing";
    pub const FIX_CODE_AFTER_QA: &str = "fix_code_after_qa";
    pub const DEPLOY_APPLICATION: &str = "deploy_application";
    pub const MONITOR_APPLICATION: &str = "monitor_application";
    pub const MAINTAIN_APPLICATION: &str = "maintain_application";
}

/// Substituted into prompts for absent state fields.
pub const MISSING: &str = "(not provided)";

pub(crate) fn or_missing(value: Option<&str>) -> &str {
    value.unwrap_or(MISSING)
}

/// What every built-in step needs: a generator and somewhere to write.
#[derive(Clone)]
pub struct StepEnv {
    generator: Arc<dyn TextGenerator>,
    writer: Arc<ArtifactWriter>,
}

impl StepEnv {
    pub fn new(generator: Arc<dyn TextGenerator>, writer: ArtifactWriter) -> Self {
        Self {
            generator,
            writer: Arc::new(writer),
        }
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    pub(crate) async fn ask(&self, ctx: &StepContext, prompt: String) -> Result<String> {
        ctx.check_cancelled()?;
        debug!(step = %ctx.step, visit = ctx.visit, prompt_len = prompt.len(), "Requesting generation");
        let reply = self.generator.generate(prompt).await?;
        debug!(step = %ctx.step, reply_len = reply.len(), "Generation complete");
        Ok(reply)
    }
}

/// All nineteen catalog steps, in pipeline order.
pub fn all(env: &StepEnv) -> Vec<Arc<dyn Step>> {
    vec![
        Arc::new(GatherRequirements::new(env.clone())),
        Arc::new(GenerateUserStories::new(env.clone())),
        Arc::new(ReviewStep::new(env.clone(), &review::USER_STORIES)),
        Arc::new(GenerateUserStories::revision(env.clone())),
        Arc::new(CreateDesignDocuments::new(env.clone())),
        Arc::new(ReviewStep::new(env.clone(), &review::DESIGN)),
        Arc::new(GenerateCode::new(env.clone())),
        Arc::new(ReviewStep::new(env.clone(), &review::CODE)),
        Arc::new(ReviseStep::new(env.clone(), &revise::FIX_AFTER_REVIEW)),
        Arc::new(ReviewStep::new(env.clone(), &review::SECURITY)),
        Arc::new(ReviseStep::new(env.clone(), &revise::FIX_AFTER_SECURITY)),
        Arc::new(WriteTestCases::new(env.clone())),
        Arc::new(ReviewStep::new(env.clone(), &review::TEST_CASES)),
        Arc::new(ReviseStep::new(env.clone(), &revise::FIX_TEST_CASES)),
        Arc::new(ReviewStep::new(env.clone(), &review::QA)),
        Arc::new(ReviseStep::new(env.clone(), &revise::FIX_AFTER_QA)),
        Arc::new(DeployApplication::new(env.clone())),
        Arc::new(MonitorApplication::new(env.clone())),
        Arc::new(MaintainApplication::new(env.clone())),
    ]
}
