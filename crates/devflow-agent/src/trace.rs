use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use devflow_core::error::Result;
use devflow_core::state::WorkflowState;

/// `step -> snapshot` export inside the output directory.
pub const TRACE_FILE: &str = "execution_history.json";
/// Ordered entries, revisits included; what [`ExecutionTrace::load`] reads.
pub const TRACE_LOG_FILE: &str = "execution_log.json";

/// One completed step and the state it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: String,
    pub snapshot: Map<String, Value>,
    pub completed_at: DateTime<Utc>,
}

/// Append-only record of completed steps, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    entries: Vec<TraceEntry>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot of `state` for `step`.
    pub fn record(&mut self, step: &str, state: &WorkflowState) {
        self.entries.push(TraceEntry {
            step: step.to_string(),
            snapshot: snapshot_state(state),
            completed_at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    /// Number of completed visits of `step`.
    pub fn count(&self, step: &str) -> usize {
        self.entries.iter().filter(|e| e.step == step).count()
    }

    /// Step ids in completion order.
    pub fn steps(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.step.as_str()).collect()
    }

    /// `step -> snapshot`, keeping the latest snapshot of revisited steps.
    pub fn to_step_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for entry in &self.entries {
            map.insert(entry.step.clone(), Value::Object(entry.snapshot.clone()));
        }
        map
    }

    /// Write the ordered trace as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_pretty(path, self)
    }

    /// Write [`to_step_map`](Self::to_step_map) as pretty JSON.
    pub fn save_step_map(&self, path: &Path) -> Result<()> {
        write_pretty(path, &self.to_step_map())
    }

    /// Write both files into `dir`; returns the path of the step map.
    pub fn export(&self, dir: &Path) -> Result<PathBuf> {
        let history = dir.join(TRACE_FILE);
        self.save_step_map(&history)?;
        self.save(&dir.join(TRACE_LOG_FILE))?;
        Ok(history)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn write_pretty(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// JSON object view of the state. Opaque values become display strings;
/// a state that cannot be serialized at all is kept as its debug rendering.
pub fn snapshot_state(state: &WorkflowState) -> Map<String, Value> {
    match serde_json::to_value(state) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
        Err(e) => {
            warn!(error = %e, "State snapshot fell back to debug rendering");
            let mut map = Map::new();
            map.insert("debug".to_string(), Value::String(format!("{state:?}")));
            map
        }
    }
}
