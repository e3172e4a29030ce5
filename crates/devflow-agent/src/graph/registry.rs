use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use devflow_core::error::{DevflowError, Result};
use devflow_core::state::WorkflowState;
use devflow_core::traits::Step;
use devflow_core::types::StepContext;

/// Registry of named steps, in registration order.
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn Step>>,
    order: Vec<String>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step. A step with the same id is replaced.
    pub fn register(&mut self, step: impl Step) {
        self.register_arc(Arc::new(step));
    }

    pub fn register_arc(&mut self, step: Arc<dyn Step>) {
        let id = step.id().to_string();
        if self.steps.insert(id.clone(), step).is_some() {
            debug!(step = %id, "Replacing registered step");
        } else {
            self.order.push(id);
        }
    }

    /// Get a step by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Step>> {
        self.steps.get(id).cloned()
    }

    /// Get a step by id, failing with `UnknownStep`.
    pub fn require(&self, id: &str) -> Result<Arc<dyn Step>> {
        self.get(id)
            .ok_or_else(|| DevflowError::UnknownStep(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.steps.contains_key(id)
    }

    /// Step ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Replace a registered step with a wrapper around it.
    pub fn wrap(
        &mut self,
        id: &str,
        wrapper: impl FnOnce(Arc<dyn Step>) -> Arc<dyn Step>,
    ) -> Result<()> {
        let inner = self.require(id)?;
        let wrapped = wrapper(inner);
        if wrapped.id() != id {
            return Err(DevflowError::Config(format!(
                "wrapper for step '{}' reports id '{}'",
                id,
                wrapped.id()
            )));
        }
        self.steps.insert(id.to_string(), wrapped);
        Ok(())
    }
}

type StepFn = dyn Fn(WorkflowState) -> Result<WorkflowState> + Send + Sync;

/// A synchronous step built from a closure.
pub struct FnStep {
    id: String,
    description: String,
    f: Box<StepFn>,
}

impl FnStep {
    pub fn new(
        id: impl Into<String>,
        f: impl Fn(WorkflowState) -> Result<WorkflowState> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            f: Box::new(f),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Step for FnStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, state: WorkflowState, _ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        let result = (self.f)(state);
        Box::pin(async move { result })
    }
}
