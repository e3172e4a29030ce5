use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use devflow_core::error::{DevflowError, Result};
use devflow_core::event::EventBus;
use devflow_core::types::{ReviewDecision, WorkflowEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateStatus {
    Pending,
    Approved,
    NeedsRevision,
}

/// A review waiting on a human, keyed by the exact artifact text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewGate {
    pub id: String,
    pub artifact_key: String,
    pub step: String,
    pub status: GateStatus,
    pub requested_at: DateTime<Utc>,
}

#[derive(Default)]
struct Stores {
    gates: HashMap<String, ReviewGate>,
    /// original artifact -> replacement
    revisions: HashMap<String, String>,
}

/// Pending review decisions and submitted revisions.
///
/// Both maps sit behind one lock. Waiters register with the `Notify` before
/// inspecting the maps, so a submission landing between the check and the
/// wait still wakes them.
pub struct ReviewBroker {
    stores: Mutex<Stores>,
    notify: Notify,
    event_bus: Option<Arc<EventBus>>,
}

impl Default for ReviewBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewBroker {
    pub fn new() -> Self {
        Self {
            stores: Mutex::new(Stores::default()),
            notify: Notify::new(),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Record a pending review for `artifact_key`. Reopening an existing key
    /// resets it to `Pending` and drops any stale revision.
    pub async fn open(&self, artifact_key: &str, step: &str) -> ReviewGate {
        let gate = ReviewGate {
            id: uuid::Uuid::new_v4().to_string(),
            artifact_key: artifact_key.to_string(),
            step: step.to_string(),
            status: GateStatus::Pending,
            requested_at: Utc::now(),
        };
        {
            let mut stores = self.stores.lock().await;
            stores.revisions.remove(artifact_key);
            stores.gates.insert(artifact_key.to_string(), gate.clone());
        }
        info!(gate_id = %gate.id, step = %step, "Review awaiting decision");
        self.publish(WorkflowEvent::ReviewRequested {
            artifact_key: artifact_key.to_string(),
            step: step.to_string(),
        });
        gate
    }

    /// Record a human decision for a pending review.
    pub async fn submit_decision(
        &self,
        artifact_key: &str,
        decision: ReviewDecision,
    ) -> Result<ReviewGate> {
        let gate = {
            let mut stores = self.stores.lock().await;
            let gate = stores
                .gates
                .get_mut(artifact_key)
                .ok_or_else(|| DevflowError::UnknownArtifact(truncate(artifact_key)))?;
            if gate.status != GateStatus::Pending {
                return Err(DevflowError::Validation(format!(
                    "review {} is already decided",
                    gate.id
                )));
            }
            gate.status = match decision {
                ReviewDecision::Approved => GateStatus::Approved,
                ReviewDecision::NeedsRevision => GateStatus::NeedsRevision,
            };
            gate.clone()
        };
        self.notify.notify_waiters();
        info!(gate_id = %gate.id, decision = %decision, "Review decision submitted");
        self.publish(WorkflowEvent::ReviewResolved {
            artifact_key: artifact_key.to_string(),
            decision,
        });
        Ok(gate)
    }

    /// Store a replacement for an artifact whose review asked for revision.
    ///
    /// The gate stays `NeedsRevision` until the waiting review consumes the
    /// replacement; reviewing the revised text then opens a fresh `Pending`
    /// gate keyed by that text.
    pub async fn submit_revision(&self, original: &str, revised: &str) -> Result<()> {
        if original.trim().is_empty() || revised.trim().is_empty() {
            return Err(DevflowError::Validation(
                "original_artifact and revised_artifact must be non-empty".into(),
            ));
        }
        {
            let mut stores = self.stores.lock().await;
            match stores.gates.get(original) {
                Some(gate) if gate.status == GateStatus::NeedsRevision => {}
                _ => return Err(DevflowError::UnknownArtifact(truncate(original))),
            }
            stores
                .revisions
                .insert(original.to_string(), revised.to_string());
        }
        self.notify.notify_waiters();
        debug!(bytes = revised.len(), "Revision submitted");
        self.publish(WorkflowEvent::RevisionSubmitted {
            artifact_key: original.to_string(),
        });
        Ok(())
    }

    /// Wait until the review for `artifact_key` is decided.
    ///
    /// An approved gate is removed; a gate needing revision stays until its
    /// replacement is consumed by [`wait_revision`](Self::wait_revision).
    pub async fn wait_decision(
        &self,
        artifact_key: &str,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<ReviewDecision> {
        self.wait_for(artifact_key, cancel, timeout, |stores| {
            let status = stores
                .gates
                .get(artifact_key)
                .map(|g| g.status)
                .ok_or_else(|| DevflowError::UnknownArtifact(truncate(artifact_key)))?;
            Ok(match status {
                GateStatus::Pending => None,
                GateStatus::Approved => {
                    stores.gates.remove(artifact_key);
                    Some(ReviewDecision::Approved)
                }
                GateStatus::NeedsRevision => Some(ReviewDecision::NeedsRevision),
            })
        })
        .await
    }

    /// Wait for the replacement of `artifact_key`, consuming it and the gate.
    pub async fn wait_revision(
        &self,
        artifact_key: &str,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<String> {
        self.wait_for(artifact_key, cancel, timeout, |stores| {
            if !stores.gates.contains_key(artifact_key) {
                return Err(DevflowError::UnknownArtifact(truncate(artifact_key)));
            }
            Ok(stores.revisions.remove(artifact_key).map(|revised| {
                stores.gates.remove(artifact_key);
                revised
            }))
        })
        .await
    }

    async fn wait_for<T>(
        &self,
        artifact_key: &str,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
        mut check: impl FnMut(&mut Stores) -> Result<Option<T>>,
    ) -> Result<T> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(value) = check(&mut *self.stores.lock().await)? {
                    return Ok::<T, DevflowError>(value);
                }
                notified.await;
            }
        };

        let outcome = tokio::select! {
            r = with_timeout(timeout, wait) => r,
            _ = cancel.cancelled() => Some(Err(DevflowError::Cancelled)),
        };

        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => {
                if matches!(e, DevflowError::Cancelled) {
                    self.remove(artifact_key).await;
                }
                Err(e)
            }
            None => {
                self.remove(artifact_key).await;
                Err(DevflowError::ApprovalTimeout {
                    artifact: truncate(artifact_key),
                })
            }
        }
    }

    /// All open reviews, oldest first.
    pub async fn list(&self) -> Vec<ReviewGate> {
        let mut gates: Vec<ReviewGate> = self.stores.lock().await.gates.values().cloned().collect();
        gates.sort_by_key(|g| g.requested_at);
        gates
    }

    pub async fn get(&self, artifact_key: &str) -> Option<ReviewGate> {
        self.stores.lock().await.gates.get(artifact_key).cloned()
    }

    /// Find an open review by prefix of its id.
    pub async fn find_by_prefix(&self, prefix: &str) -> Option<ReviewGate> {
        self.stores
            .lock()
            .await
            .gates
            .values()
            .find(|g| g.id.starts_with(prefix))
            .cloned()
    }

    /// Drop a gate and any revision stored for it.
    pub async fn remove(&self, artifact_key: &str) -> bool {
        let mut stores = self.stores.lock().await;
        stores.revisions.remove(artifact_key);
        stores.gates.remove(artifact_key).is_some()
    }
}

/// `None` when the deadline passed first.
async fn with_timeout<T>(timeout: Option<Duration>, fut: impl Future<Output = T>) -> Option<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn truncate(artifact: &str) -> String {
    const MAX: usize = 60;
    match artifact.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &artifact[..idx]),
        None => artifact.to_string(),
    }
}
