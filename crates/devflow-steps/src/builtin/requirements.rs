use futures::future::BoxFuture;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use devflow_core::error::Result;
use devflow_core::state::WorkflowState;
use devflow_core::traits::Step;
use devflow_core::types::StepContext;

use super::{ids, or_missing, prompts, StepEnv};

/// Structure the free-form requirements input.
pub struct GatherRequirements {
    env: StepEnv,
}

impl GatherRequirements {
    pub fn new(env: StepEnv) -> Self {
        Self { env }
    }
}

/// Parse a reply as a JSON document, also when it is wrapped in a fenced
/// block. Anything else is kept as raw text.
pub fn parse_requirements(reply: &str) -> Value {
    let trimmed = reply.trim();
    if let Ok(doc @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str::<Value>(trimmed) {
        return doc;
    }

    let fenced = Regex::new(r"(?s)```(?:json)?\s*(\{.*\}|\[.*\])\s*```")
        .ok()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok());
    match fenced {
        Some(doc) => doc,
        None => Value::String(reply.to_string()),
    }
}

impl Step for GatherRequirements {
    fn id(&self) -> &str {
        ids::GATHER_REQUIREMENTS
    }

    fn description(&self) -> &str {
        "Turn the project request into structured requirements"
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            if state.raw_requirements_input.is_none() {
                warn!("No requirements input given; generating from an empty request");
            }
            let prompt = prompts::requirements(or_missing(state.raw_requirements_input.as_deref()));
            let reply = self.env.ask(&ctx, prompt).await?;

            let requirements = parse_requirements(&reply);
            match &requirements {
                Value::String(text) => {
                    warn!("Requirements reply is not JSON; keeping raw text");
                    self.env.writer().write("requirements.json", text).await?;
                }
                doc => {
                    self.env.writer().write_json("requirements.json", doc).await?;
                }
            }
            info!(structured = !requirements.is_string(), "Requirements gathered");
            state.requirements = Some(requirements);
            Ok(state)
        })
    }
}
