//! Mocks and fixtures shared by the devflow test suites.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use devflow_core::error::{DevflowError, Result};
use devflow_core::state::WorkflowState;
use devflow_core::traits::{Step, TextGenerator};
use devflow_core::types::{RunId, StepContext};

/// Reply queue that repeats its last entry once drained.
#[derive(Debug, Clone)]
struct ReplyQueue {
    pending: VecDeque<String>,
    last: String,
}

impl ReplyQueue {
    fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pending: VecDeque<String> = replies.into_iter().map(Into::into).collect();
        let last = pending.back().cloned().unwrap_or_default();
        Self { pending, last }
    }

    fn next(&mut self) -> String {
        if self.pending.len() > 1 {
            self.pending.pop_front().unwrap_or_default()
        } else {
            self.pending.front().cloned().unwrap_or_else(|| self.last.clone())
        }
    }
}

/// A [`TextGenerator`] answering from scripted replies.
///
/// Each rule matches prompts containing a substring; rules are checked in
/// the order they were added. Unmatched prompts get the default reply.
pub struct ScriptedGenerator {
    rules: Mutex<Vec<(String, ReplyQueue)>>,
    default_reply: String,
    prompts: Mutex<Vec<String>>,
    failures: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default_reply: default_reply.into(),
            prompts: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
        }
    }

    /// Answer prompts containing `needle` with `replies`, in order.
    pub fn on<I, S>(self, needle: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push((needle.into(), ReplyQueue::new(replies)));
        }
        self
    }

    /// Fail the next `n` calls with a retryable request error.
    pub fn failing(self, n: usize) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.prompts().iter().filter(|p| p.contains(needle)).count()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DevflowError::LlmRequest("HTTP 503: scripted failure".into()));
            }

            let reply = {
                let mut rules = self
                    .rules
                    .lock()
                    .map_err(|_| DevflowError::LlmRequest("rules poisoned".into()))?;
                rules
                    .iter_mut()
                    .find(|(needle, _)| prompt.contains(needle.as_str()))
                    .map(|(_, queue)| queue.next())
                    .unwrap_or_else(|| self.default_reply.clone())
            };

            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt);
            }
            Ok(reply)
        })
    }
}

/// A [`Step`] that writes scripted values into state fields on each visit.
pub struct ScriptedStep {
    id: String,
    writes: Mutex<Vec<(String, ReplyQueue)>>,
    fail_first: AtomicUsize,
    visits: Arc<AtomicUsize>,
}

impl ScriptedStep {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            writes: Mutex::new(Vec::new()),
            fail_first: AtomicUsize::new(0),
            visits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Write `values[n]` to `field` on the n-th visit (last value repeats).
    pub fn sets<I, S>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push((field.into(), ReplyQueue::new(values)));
        }
        self
    }

    /// Fail the first `n` invocations with a generation error.
    pub fn failing(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// Shared counter of completed and failed invocations.
    pub fn visit_counter(&self) -> Arc<AtomicUsize> {
        self.visits.clone()
    }
}

impl Step for ScriptedStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&self, mut state: WorkflowState, _ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            self.visits.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DevflowError::LlmRequest("HTTP 503: scripted failure".into()));
            }

            let mut writes = self
                .writes
                .lock()
                .map_err(|_| DevflowError::LlmRequest("writes poisoned".into()))?;
            for (field, values) in writes.iter_mut() {
                state.set_field_str(field, values.next());
            }
            Ok(state)
        })
    }
}

/// `{project_name: "Demo", raw_requirements_input: ...}`
pub fn demo_state() -> WorkflowState {
    WorkflowState::new("Demo")
        .with_requirements_input("A to-do list web app with user accounts and reminders")
}

/// Context for invoking a step directly, outside an engine run.
pub fn step_context(step: &str) -> StepContext {
    StepContext::new(RunId::new(), step, Default::default())
}
