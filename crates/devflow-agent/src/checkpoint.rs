use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use devflow_core::error::{DevflowError, Result};

use crate::graph::RunSnapshot;

/// Summary row for listing saved runs.
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    pub run_id: String,
    pub current_step: String,
    pub completed_steps: usize,
    pub saved_at: DateTime<Utc>,
}

/// Latest [`RunSnapshot`] per run, backed by SQLite.
pub struct CheckpointStore {
    conn: Mutex<Connection>,
}

fn db_err(context: &str, e: impl std::fmt::Display) -> DevflowError {
    DevflowError::Database(format!("{}: {}", context, e))
}

impl CheckpointStore {
    /// Open or create the checkpoint database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| db_err("Failed to open checkpoint store", e))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS run_checkpoints (
                 run_id TEXT PRIMARY KEY,
                 current_step TEXT NOT NULL,
                 completed_steps INTEGER NOT NULL,
                 snapshot_json TEXT NOT NULL,
                 saved_at TEXT NOT NULL
             );",
        )
        .map_err(|e| db_err("Failed to initialize checkpoint schema", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Save a snapshot, replacing any earlier one for the same run.
    pub fn save(&self, snapshot: &RunSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock().map_err(|e| db_err("Lock poisoned", e))?;
        conn.execute(
            "INSERT OR REPLACE INTO run_checkpoints (run_id, current_step, completed_steps, snapshot_json, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.run_id.0,
                snapshot.current_step,
                snapshot.trace.len() as i64,
                json,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| db_err("Failed to save checkpoint", e))?;
        Ok(())
    }

    pub fn load(&self, run_id: &str) -> Result<Option<RunSnapshot>> {
        let conn = self.conn.lock().map_err(|e| db_err("Lock poisoned", e))?;
        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot_json FROM run_checkpoints WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_err("Failed to load checkpoint", e))?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Most recently saved snapshot of any run.
    pub fn load_latest(&self) -> Result<Option<RunSnapshot>> {
        let run_id = self.list()?.into_iter().next().map(|info| info.run_id);
        match run_id {
            Some(id) => self.load(&id),
            None => Ok(None),
        }
    }

    /// Saved runs, newest first.
    pub fn list(&self) -> Result<Vec<CheckpointInfo>> {
        let conn = self.conn.lock().map_err(|e| db_err("Lock poisoned", e))?;
        let mut stmt = conn
            .prepare(
                "SELECT run_id, current_step, completed_steps, saved_at
                 FROM run_checkpoints
                 ORDER BY saved_at DESC",
            )
            .map_err(|e| db_err("Failed to prepare query", e))?;

        let rows = stmt
            .query_map([], |row| {
                let saved_at: String = row.get(3)?;
                Ok(CheckpointInfo {
                    run_id: row.get(0)?,
                    current_step: row.get(1)?,
                    completed_steps: row.get::<_, i64>(2)? as usize,
                    saved_at: DateTime::parse_from_rfc3339(&saved_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(|e| db_err("Failed to list checkpoints", e))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("Failed to read checkpoint row", e))
    }

    /// Delete a run's checkpoint.
    pub fn delete(&self, run_id: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| db_err("Lock poisoned", e))?;
        conn.execute(
            "DELETE FROM run_checkpoints WHERE run_id = ?1",
            params![run_id],
        )
        .map_err(|e| db_err("Failed to delete checkpoint", e))
    }
}
