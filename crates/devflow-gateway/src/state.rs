use std::sync::Arc;

use tokio::sync::RwLock;

use devflow_agent::approval::ReviewBroker;
use devflow_agent::graph::GraphDescription;
use devflow_agent::trace::ExecutionTrace;
use devflow_core::config::GatewayConfig;

/// Trace of the active run, updated by the runner after each step.
pub type SharedTrace = Arc<RwLock<ExecutionTrace>>;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub broker: Arc<ReviewBroker>,
    pub graph: GraphDescription,
    pub trace: SharedTrace,
}
