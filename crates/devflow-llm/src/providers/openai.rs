use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use devflow_core::config::ModelConfig;
use devflow_core::error::{DevflowError, Result};
use devflow_core::traits::TextGenerator;

use super::presets::get_preset;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with Groq, OpenAI, Ollama, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn endpoint(&self) -> &str {
        match &self.config.base_url {
            Some(url) => url,
            None => get_preset(&self.config.provider)
                .map(|p| p.default_base_url)
                .unwrap_or(OPENAI_API_URL),
        }
    }

    fn request_body(&self, prompt: String) -> ChatRequest {
        ChatRequest {
            model: self.config.model_id.clone(),
            messages: vec![OaiMessage {
                role: "user".to_string(),
                content: Some(prompt),
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        }
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Deserialize, Debug)]
struct OaiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: OaiMessage,
}

fn extract_reply(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| DevflowError::LlmParse(e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| DevflowError::LlmParse("response has no choices".into()))?;
    choice
        .message
        .content
        .ok_or_else(|| DevflowError::LlmParse("reply has no text content".into()))
}

impl TextGenerator for OpenAiClient {
    fn generate(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let body = self.request_body(prompt);
            let mut req = self.http.post(self.endpoint()).json(&body);

            if let Some(api_key) = self.config.resolved_api_key() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            } else if get_preset(&self.config.provider).is_some_and(|p| p.needs_api_key) {
                return Err(DevflowError::LlmRequest(format!(
                    "provider '{}' requires model.api_key",
                    self.config.provider
                )));
            }

            debug!(model = %self.config.model_id, "Sending chat completion request");

            let response = req
                .send()
                .await
                .map_err(|e| DevflowError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(DevflowError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let text = response
                .text()
                .await
                .map_err(|e| DevflowError::LlmRequest(e.to_string()))?;
            extract_reply(&text)
        })
    }
}
