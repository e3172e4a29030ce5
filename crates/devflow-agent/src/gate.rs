use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use devflow_core::error::{DevflowError, Result};
use devflow_core::state::{status, WorkflowState};
use devflow_core::traits::Step;
use devflow_core::types::{ReviewDecision, StepContext};

use crate::approval::ReviewBroker;

/// What a human reviewer is asked to look at.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub step: String,
    pub artifact_field: String,
    pub artifact: String,
    /// Feedback produced by the automated review, if any.
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    /// Send the artifact back through the graph's revise edge.
    Revise,
    /// Review again with this replacement artifact.
    Revised(String),
}

/// Source of human review outcomes.
pub trait Approver: Send + Sync + 'static {
    fn review(&self, request: ReviewRequest, ctx: StepContext) -> BoxFuture<'_, Result<ApprovalOutcome>>;
}

/// Synchronous decision source, e.g. a console prompt.
pub trait DecisionSource: Send + Sync + 'static {
    fn decide(&self, request: ReviewRequest) -> BoxFuture<'_, Result<ReviewDecision>>;
}

/// Asks a [`DecisionSource`] in-process and resumes immediately.
pub struct LocalApprover {
    source: Arc<dyn DecisionSource>,
    timeout: Option<Duration>,
}

impl LocalApprover {
    pub fn new(source: Arc<dyn DecisionSource>) -> Self {
        Self {
            source,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Approver for LocalApprover {
    fn review(&self, request: ReviewRequest, ctx: StepContext) -> BoxFuture<'_, Result<ApprovalOutcome>> {
        Box::pin(async move {
            let artifact = request.artifact.clone();
            let decide = self.source.decide(request);
            let decision = tokio::select! {
                r = async {
                    match self.timeout {
                        Some(limit) => tokio::time::timeout(limit, decide)
                            .await
                            .unwrap_or_else(|_| Err(DevflowError::ApprovalTimeout { artifact })),
                        None => decide.await,
                    }
                } => r?,
                _ = ctx.cancel.cancelled() => return Err(DevflowError::Cancelled),
            };
            Ok(match decision {
                ReviewDecision::Approved => ApprovalOutcome::Approved,
                ReviewDecision::NeedsRevision => ApprovalOutcome::Revise,
            })
        })
    }
}

/// Waits for a decision submitted out of band through a [`ReviewBroker`].
///
/// On "needs revision" it keeps waiting for the replacement artifact.
pub struct RemoteApprover {
    broker: Arc<ReviewBroker>,
    timeout: Option<Duration>,
}

impl RemoteApprover {
    pub fn new(broker: Arc<ReviewBroker>) -> Self {
        Self {
            broker,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Approver for RemoteApprover {
    fn review(&self, request: ReviewRequest, ctx: StepContext) -> BoxFuture<'_, Result<ApprovalOutcome>> {
        Box::pin(async move {
            let key = request.artifact;
            self.broker.open(&key, &request.step).await;

            match self.broker.wait_decision(&key, &ctx.cancel, self.timeout).await? {
                ReviewDecision::Approved => Ok(ApprovalOutcome::Approved),
                ReviewDecision::NeedsRevision => {
                    info!(step = %request.step, "Waiting for revised artifact");
                    let revised = self
                        .broker
                        .wait_revision(&key, &ctx.cancel, self.timeout)
                        .await?;
                    Ok(ApprovalOutcome::Revised(revised))
                }
            }
        })
    }
}

/// Wraps a review step with a human decision on one artifact field.
///
/// The automated review runs first; the human decision then overrides the
/// status field. A revised artifact replaces the field and the review
/// reruns from the top, at most `max_rounds` times (0 = unbounded).
pub struct GatedReview {
    inner: Arc<dyn Step>,
    approver: Arc<dyn Approver>,
    artifact_field: String,
    status_field: String,
    feedback_field: Option<String>,
    max_rounds: usize,
}

impl GatedReview {
    pub fn new(
        inner: Arc<dyn Step>,
        approver: Arc<dyn Approver>,
        artifact_field: impl Into<String>,
        status_field: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            approver,
            artifact_field: artifact_field.into(),
            status_field: status_field.into(),
            feedback_field: None,
            max_rounds: 0,
        }
    }

    pub fn with_feedback_field(mut self, field: impl Into<String>) -> Self {
        self.feedback_field = Some(field.into());
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }
}

impl Step for GatedReview {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn run(&self, state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let mut state = state;
            let mut round = 0;
            loop {
                ctx.check_cancelled()?;
                round += 1;
                if self.max_rounds > 0 && round > self.max_rounds {
                    warn!(step = %self.id(), rounds = self.max_rounds, "Revision rounds exhausted");
                    return Err(DevflowError::RevisionLimitExceeded {
                        step: self.id().to_string(),
                        limit: self.max_rounds,
                    });
                }

                state = self.inner.run(state, ctx.clone()).await?;

                let artifact = state
                    .field_str(&self.artifact_field)
                    .unwrap_or_default()
                    .to_string();
                let feedback = self
                    .feedback_field
                    .as_deref()
                    .and_then(|f| state.field_str(f))
                    .map(str::to_string);
                state.set_field_str(&self.status_field, status::PENDING_USER_APPROVAL);

                let request = ReviewRequest {
                    step: self.id().to_string(),
                    artifact_field: self.artifact_field.clone(),
                    artifact,
                    feedback,
                };
                match self.approver.review(request, ctx.clone()).await? {
                    ApprovalOutcome::Approved => {
                        state.set_field_str(&self.status_field, status::APPROVED);
                        return Ok(state);
                    }
                    ApprovalOutcome::Revise => {
                        state.set_field_str(&self.status_field, status::NEEDS_REVISION);
                        return Ok(state);
                    }
                    ApprovalOutcome::Revised(replacement) => {
                        info!(step = %self.id(), round, "Reviewing revised artifact");
                        state.set_field_str(&self.artifact_field, replacement);
                    }
                }
            }
        })
    }
}
