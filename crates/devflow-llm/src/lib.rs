pub mod providers;
pub mod retry;

use devflow_core::config::{AppConfig, ModelConfig};
use devflow_core::traits::TextGenerator;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create a client for one model entry. Every provider speaks the
/// OpenAI-compatible chat-completions protocol.
pub fn create_client(config: &ModelConfig) -> Box<dyn TextGenerator> {
    Box::new(OpenAiClient::new(config.clone()))
}

/// Primary model plus fallbacks, wrapped with retries.
pub fn create_generator(config: &AppConfig) -> RetryingClient {
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| (fb.clone(), create_client(fb)))
        .collect();
    RetryingClient::new(
        create_client(&config.model),
        fallbacks,
        config.model.retry.clone().unwrap_or_default(),
    )
}
