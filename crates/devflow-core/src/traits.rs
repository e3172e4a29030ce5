use futures::future::BoxFuture;

use crate::error::Result;
use crate::state::WorkflowState;
use crate::types::StepContext;

/// Text generation backend (chat-completions style, single reply).
pub trait TextGenerator: Send + Sync + 'static {
    fn generate(&self, prompt: String) -> BoxFuture<'_, Result<String>>;
}

/// A named unit of pipeline work: takes the state, returns the updated state.
pub trait Step: Send + Sync + 'static {
    /// Unique step identifier.
    fn id(&self) -> &str;

    /// Human-readable description, shown in graph exports.
    fn description(&self) -> &str {
        ""
    }

    fn run(&self, state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>>;
}
