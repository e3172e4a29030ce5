use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use devflow_core::error::{DevflowError, Result};
use devflow_core::event::EventBus;
use devflow_core::state::WorkflowState;
use devflow_core::types::{RunId, StepContext, WorkflowEvent, END};

use super::builder::WorkflowGraph;
use crate::trace::ExecutionTrace;

const DEFAULT_MAX_STEP_VISITS: usize = 5;

/// One completed step, as yielded by [`WorkflowRun::advance`].
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: String,
    /// 1-based entry count of this step within the run.
    pub visit: usize,
    /// Step the run moves to next (`END` when finished).
    pub next: String,
    pub state: WorkflowState,
}

/// Everything needed to continue a run later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub current_step: String,
    pub state: WorkflowState,
    pub trace: ExecutionTrace,
    pub visits: BTreeMap<String, usize>,
    pub finished: bool,
}

/// Walks a [`WorkflowGraph`]. Cheap to clone; every run owns its own state.
#[derive(Clone)]
pub struct WorkflowEngine {
    graph: Arc<WorkflowGraph>,
    max_step_visits: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl WorkflowEngine {
    pub fn new(graph: WorkflowGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            max_step_visits: DEFAULT_MAX_STEP_VISITS,
            event_bus: None,
        }
    }

    /// Bound on entries into any single step. 0 disables the bound.
    pub fn with_max_step_visits(mut self, max: usize) -> Self {
        self.max_step_visits = max;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn max_step_visits(&self) -> usize {
        self.max_step_visits
    }

    /// Start a run at the entry step with a fresh id and cancellation token.
    pub fn start(&self, initial: WorkflowState) -> WorkflowRun {
        self.start_with(initial, RunId::new(), CancellationToken::new())
    }

    pub fn start_with(
        &self,
        initial: WorkflowState,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> WorkflowRun {
        info!(run_id = %run_id, entry = %self.graph.entry(), "Workflow run started");
        self.publish(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
            entry: self.graph.entry().to_string(),
        });
        WorkflowRun {
            engine: self.clone(),
            run_id,
            current: self.graph.entry().to_string(),
            state: initial,
            trace: ExecutionTrace::new(),
            visits: BTreeMap::new(),
            cancel,
            failed: None,
        }
    }

    /// Continue a run from a snapshot taken by [`WorkflowRun::snapshot`].
    pub fn resume(&self, snapshot: RunSnapshot, cancel: CancellationToken) -> Result<WorkflowRun> {
        if !self.graph.has_node(&snapshot.current_step) {
            return Err(DevflowError::UnknownStep(snapshot.current_step));
        }
        info!(
            run_id = %snapshot.run_id,
            step = %snapshot.current_step,
            completed = snapshot.trace.len(),
            "Resuming workflow run"
        );
        Ok(WorkflowRun {
            engine: self.clone(),
            run_id: snapshot.run_id,
            current: snapshot.current_step,
            state: snapshot.state,
            trace: snapshot.trace,
            visits: snapshot.visits,
            cancel,
            failed: None,
        })
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// A single execution of a workflow graph.
///
/// Nothing runs until `advance()` is called; each call executes exactly one
/// step. A step failure leaves the run on that step, so calling `advance()`
/// again retries it. Unknown branches and the visit bound are fatal.
pub struct WorkflowRun {
    engine: WorkflowEngine,
    run_id: RunId,
    current: String,
    state: WorkflowState,
    trace: ExecutionTrace,
    visits: BTreeMap<String, usize>,
    cancel: CancellationToken,
    failed: Option<String>,
}

impl WorkflowRun {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Step executed by the next `advance()`, or `END`.
    pub fn current_step(&self) -> &str {
        &self.current
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn trace(&self) -> &ExecutionTrace {
        &self.trace
    }

    pub fn is_finished(&self) -> bool {
        self.current == END
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id.clone(),
            current_step: self.current.clone(),
            state: self.state.clone(),
            trace: self.trace.clone(),
            visits: self.visits.clone(),
            finished: self.is_finished(),
        }
    }

    /// Execute the current step and move along its transition.
    ///
    /// Returns `Ok(None)` once the run has reached `END`.
    pub async fn advance(&mut self) -> Result<Option<StepOutcome>> {
        if let Some(reason) = &self.failed {
            debug!(run_id = %self.run_id, reason = %reason, "advance() on a failed run");
            return Err(DevflowError::RunFinished);
        }
        if self.is_finished() {
            return Ok(None);
        }

        if self.cancel.is_cancelled() {
            self.cancelled();
            return Err(DevflowError::Cancelled);
        }

        let step_id = self.current.clone();
        let visit = self.visits.get(&step_id).copied().unwrap_or(0) + 1;
        let limit = self.engine.max_step_visits;
        if limit > 0 && visit > limit {
            warn!(step = %step_id, limit, "Step visit bound reached");
            let err = DevflowError::RevisionLimitExceeded {
                step: step_id.clone(),
                limit,
            };
            self.fail(&step_id, &err);
            return Err(err);
        }

        let step = match self.engine.graph.step(&step_id) {
            Some(step) => step,
            None => {
                let err = DevflowError::UnknownStep(step_id.clone());
                self.fail(&step_id, &err);
                return Err(err);
            }
        };

        debug!(run_id = %self.run_id, step = %step_id, visit, "Executing step");
        self.engine.publish(WorkflowEvent::StepStarted {
            run_id: self.run_id.clone(),
            step: step_id.clone(),
            visit,
        });

        let ctx = StepContext {
            run_id: self.run_id.clone(),
            step: step_id.clone(),
            visit,
            cancel: self.cancel.clone(),
        };

        let result = tokio::select! {
            r = step.run(self.state.clone(), ctx) => r,
            _ = self.cancel.cancelled() => Err(DevflowError::Cancelled),
        };

        let new_state = match result {
            Ok(state) => state,
            Err(e) => {
                let err = e.in_step(&step_id);
                warn!(run_id = %self.run_id, step = %step_id, error = %err, "Step failed");
                self.engine.publish(WorkflowEvent::StepFailed {
                    run_id: self.run_id.clone(),
                    step: step_id.clone(),
                    error: err.to_string(),
                });
                match &err {
                    DevflowError::Cancelled => self.cancelled(),
                    DevflowError::RevisionLimitExceeded { .. } => {
                        self.failed = Some(err.to_string());
                    }
                    _ => {}
                }
                return Err(err);
            }
        };

        self.visits.insert(step_id.clone(), visit);
        self.trace.record(&step_id, &new_state);

        let next = match self.engine.graph.transition(&step_id) {
            Some(transition) => transition.resolve(&step_id, &new_state),
            None => Err(DevflowError::Config(format!(
                "step '{}' has no outgoing transition",
                step_id
            ))),
        };
        self.state = new_state;
        let next = match next {
            Ok(next) => next,
            Err(err) => {
                self.fail(&step_id, &err);
                return Err(err);
            }
        };

        info!(run_id = %self.run_id, step = %step_id, next = %next, "Step completed");
        self.engine.publish(WorkflowEvent::StepCompleted {
            run_id: self.run_id.clone(),
            step: step_id.clone(),
            next: next.clone(),
        });

        self.current = next.clone();
        if self.is_finished() {
            info!(run_id = %self.run_id, steps = self.trace.len(), "Workflow run completed");
            self.engine.publish(WorkflowEvent::RunCompleted {
                run_id: self.run_id.clone(),
                steps: self.trace.len(),
            });
        }

        Ok(Some(StepOutcome {
            step: step_id,
            visit,
            next,
            state: self.state.clone(),
        }))
    }

    /// Advance until `END`, returning the final state.
    pub async fn run_to_end(&mut self) -> Result<WorkflowState> {
        while self.advance().await?.is_some() {}
        Ok(self.state.clone())
    }

    /// The remaining steps as a stream. The stream ends after `END` or the
    /// first error.
    pub fn into_stream(self) -> BoxStream<'static, Result<StepOutcome>> {
        Box::pin(futures::stream::unfold(Some(self), |run| async move {
            let mut run = run?;
            match run.advance().await {
                Ok(Some(outcome)) => Some((Ok(outcome), Some(run))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        }))
    }

    fn fail(&mut self, step: &str, err: &DevflowError) {
        self.failed = Some(err.to_string());
        self.engine.publish(WorkflowEvent::StepFailed {
            run_id: self.run_id.clone(),
            step: step.to_string(),
            error: err.to_string(),
        });
    }

    fn cancelled(&self) {
        info!(run_id = %self.run_id, step = %self.current, "Workflow run cancelled");
        self.engine.publish(WorkflowEvent::RunCancelled {
            run_id: self.run_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use futures::StreamExt;

    use super::*;
    use crate::graph::builder::GraphBuilder;
    use crate::graph::registry::FnStep;
    use crate::graph::transition::{Predicate, StatusRoute};
    use devflow_core::state::status;
    use devflow_core::types::BranchKey;
    use devflow_test_utils::ScriptedStep;

    fn design_loop(review: ScriptedStep) -> WorkflowGraph {
        GraphBuilder::new()
            .step(ScriptedStep::new("create_design_documents").sets("design_documents", ["v1", "v2", "v3"]))
            .step(review)
            .step(ScriptedStep::new("generate_code").sets("code", ["fn main() {}"]))
            .entry("create_design_documents")
            .edge("create_design_documents", "review_design")
            .status_route(
                "review_design",
                StatusRoute::new("design_review_status", status::APPROVED, BranchKey::Revise),
                "generate_code",
                "create_design_documents",
            )
            .edge("generate_code", END)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn revision_loop_revisits_step_with_distinct_snapshots() {
        let review = ScriptedStep::new("review_design")
            .sets("design_review_status", [status::NEEDS_REVISION, status::APPROVED]);
        let engine = WorkflowEngine::new(design_loop(review));
        let mut run = engine.start(WorkflowState::new("Demo"));

        let state = run.run_to_end().await.unwrap();
        assert_eq!(state.code.as_deref(), Some("fn main() {}"));
        assert_eq!(
            run.trace().steps(),
            vec![
                "create_design_documents",
                "review_design",
                "create_design_documents",
                "review_design",
                "generate_code",
            ]
        );
        let design_snapshots: Vec<_> = run
            .trace()
            .entries()
            .iter()
            .filter(|e| e.step == "create_design_documents")
            .map(|e| e.snapshot["design_documents"].clone())
            .collect();
        assert_eq!(design_snapshots, vec!["v1", "v2"]);
        assert!(run.is_finished());
        assert!(run.advance().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn advance_yields_one_step_at_a_time() {
        let review = ScriptedStep::new("review_design")
            .sets("design_review_status", [status::APPROVED]);
        let mut run = WorkflowEngine::new(design_loop(review)).start(WorkflowState::default());

        let first = run.advance().await.unwrap().unwrap();
        assert_eq!(first.step, "create_design_documents");
        assert_eq!(first.next, "review_design");
        assert_eq!(first.visit, 1);
        assert_eq!(run.trace().len(), 1);
        assert_eq!(run.current_step(), "review_design");
    }

    #[tokio::test]
    async fn failed_step_keeps_trace_and_is_retried() {
        let review = ScriptedStep::new("review_design")
            .sets("design_review_status", [status::APPROVED])
            .failing(1);
        let calls = review.visit_counter();
        let mut run = WorkflowEngine::new(design_loop(review)).start(WorkflowState::default());

        run.advance().await.unwrap();
        let err = run.advance().await.unwrap_err();
        match &err {
            DevflowError::StepExecution { step, source } => {
                assert_eq!(step, "review_design");
                assert!(matches!(**source, DevflowError::LlmRequest(_)));
            }
            other => panic!("expected StepExecution, got {other:?}"),
        }
        assert!(err.is_resumable());
        assert_eq!(run.trace().steps(), vec!["create_design_documents"]);
        assert_eq!(run.current_step(), "review_design");

        let retried = run.advance().await.unwrap().unwrap();
        assert_eq!(retried.step, "review_design");
        assert_eq!(retried.visit, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_branch_is_fatal() {
        let graph = GraphBuilder::new()
            .step(FnStep::new("qa_testing", Ok))
            .entry("qa_testing")
            .conditional(
                "qa_testing",
                Predicate::custom("always fix", |_| BranchKey::Fix),
                [(BranchKey::Proceed, END)],
            )
            .build()
            .unwrap();
        let mut run = WorkflowEngine::new(graph).start(WorkflowState::default());

        let err = run.advance().await.unwrap_err();
        assert!(matches!(err, DevflowError::UnknownBranch { ref branch, .. } if branch == "fix"));
        assert!(!err.is_resumable());
        assert_eq!(run.trace().len(), 1);
        assert!(matches!(run.advance().await, Err(DevflowError::RunFinished)));
    }

    #[tokio::test]
    async fn visit_bound_stops_endless_revision() {
        let review = ScriptedStep::new("review_design")
            .sets("design_review_status", [status::NEEDS_REVISION]);
        let mut run = WorkflowEngine::new(design_loop(review))
            .with_max_step_visits(2)
            .start(WorkflowState::default());

        let err = run.run_to_end().await.unwrap_err();
        assert!(matches!(
            err,
            DevflowError::RevisionLimitExceeded { ref step, limit: 2 } if step == "create_design_documents"
        ));
        assert_eq!(run.trace().count("create_design_documents"), 2);
        assert_eq!(run.trace().count("review_design"), 2);
    }

    #[tokio::test]
    async fn zero_bound_is_unbounded() {
        let review = ScriptedStep::new("review_design").sets(
            "design_review_status",
            [
                status::NEEDS_REVISION,
                status::NEEDS_REVISION,
                status::NEEDS_REVISION,
                status::NEEDS_REVISION,
                status::NEEDS_REVISION,
                status::NEEDS_REVISION,
                status::APPROVED,
            ],
        );
        let mut run = WorkflowEngine::new(design_loop(review))
            .with_max_step_visits(0)
            .start(WorkflowState::default());
        run.run_to_end().await.unwrap();
        assert_eq!(run.trace().count("review_design"), 7);
    }

    #[tokio::test]
    async fn cancellation_observed_before_step() {
        let review = ScriptedStep::new("review_design");
        let calls = review.visit_counter();
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let engine = WorkflowEngine::new(design_loop(review)).with_event_bus(bus);

        let cancel = CancellationToken::new();
        let mut run = engine.start_with(WorkflowState::default(), RunId::new(), cancel.clone());
        run.advance().await.unwrap();
        cancel.cancel();

        assert!(matches!(run.advance().await, Err(DevflowError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(run.trace().len(), 1);

        let mut saw_cancel = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, WorkflowEvent::RunCancelled { .. }) {
                saw_cancel = true;
            }
        }
        assert!(saw_cancel);
    }

    #[tokio::test]
    async fn snapshot_and_resume_continue_where_left_off() {
        let engine = WorkflowEngine::new(design_loop(
            ScriptedStep::new("review_design").sets("design_review_status", [status::APPROVED]),
        ));
        let mut run = engine.start(WorkflowState::new("Demo"));
        run.advance().await.unwrap();
        let snapshot = run.snapshot();
        assert!(!snapshot.finished);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: RunSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);

        let mut resumed = engine.resume(restored, CancellationToken::new()).unwrap();
        assert_eq!(resumed.run_id(), run.run_id());
        assert_eq!(resumed.current_step(), "review_design");
        resumed.run_to_end().await.unwrap();
        assert_eq!(
            resumed.trace().steps(),
            vec!["create_design_documents", "review_design", "generate_code"]
        );
    }

    #[tokio::test]
    async fn resume_rejects_unknown_step() {
        let engine = WorkflowEngine::new(design_loop(ScriptedStep::new("review_design")));
        let mut snapshot = engine.start(WorkflowState::default()).snapshot();
        snapshot.current_step = "deleted_step".into();
        assert!(matches!(
            engine.resume(snapshot, CancellationToken::new()),
            Err(DevflowError::UnknownStep(_))
        ));
    }

    #[tokio::test]
    async fn stream_yields_every_step() {
        let engine = WorkflowEngine::new(design_loop(
            ScriptedStep::new("review_design").sets("design_review_status", [status::APPROVED]),
        ));
        let outcomes: Vec<_> = engine
            .start(WorkflowState::default())
            .into_stream()
            .collect()
            .await;
        let steps: Vec<String> = outcomes.into_iter().map(|o| o.unwrap().step).collect();
        assert_eq!(steps, vec!["create_design_documents", "review_design", "generate_code"]);
    }

    #[tokio::test]
    async fn events_follow_the_run() {
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let engine = WorkflowEngine::new(design_loop(
            ScriptedStep::new("review_design").sets("design_review_status", [status::APPROVED]),
        ))
        .with_event_bus(bus);
        engine.start(WorkflowState::default()).run_to_end().await.unwrap();

        let mut completed = 0;
        let mut finished = false;
        while let Ok(event) = events.try_recv() {
            match event {
                WorkflowEvent::StepCompleted { .. } => completed += 1,
                WorkflowEvent::RunCompleted { steps, .. } => {
                    finished = true;
                    assert_eq!(steps, 3);
                }
                _ => {}
            }
        }
        assert_eq!(completed, 3);
        assert!(finished);
    }
}
