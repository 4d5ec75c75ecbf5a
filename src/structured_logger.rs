//! Request log of the workflow service, one JSON object per line.
//!
//! Every command the service handles and every batch of events it commits
//! is written as one line with:
//! - a monotonic sequence number for ordering
//! - an ISO 8601 timestamp with microsecond precision
//! - the invocation id correlating all lines of one process

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::domain::errors::CoreError;
use crate::domain::permissions::Actor;

/// Structured JSONL logger shared by the workflow service.
pub struct StructuredLogger {
    invocation_id: String,
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

/// One line of `events.jsonl`.
#[derive(Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Increases by one per line within an invocation
    pub seq: u64,
    /// UTC, microsecond precision
    pub ts: String,
    pub invocation_id: String,
    /// Aggregate type, or `Effects` for dispatch records
    pub component: String,
    pub event: Value,
}

impl StructuredLogger {
    /// Opens `<logs_dir>/events.jsonl` for appending, creating the directory.
    pub fn new(invocation_id: &str, logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            invocation_id: invocation_id.to_string(),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Appends one line. Write failures are swallowed: the log never
    /// fails a request.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            invocation_id: self.invocation_id.clone(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    /// Logs a command about to be handled by an aggregate.
    pub fn log_command(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        actor: &Actor,
        command: &impl Serialize,
    ) {
        self.log(
            aggregate_type,
            serde_json::json!({
                "type": "Command",
                "aggregate_id": aggregate_id,
                "actor_id": actor.id(),
                "actor_role": actor.role,
                "command": command
            }),
        );
    }

    /// Logs the events of one commit.
    pub fn log_committed(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        version: u64,
        events: &impl Serialize,
    ) {
        self.log(
            aggregate_type,
            serde_json::json!({
                "type": "Committed",
                "aggregate_id": aggregate_id,
                "version": version,
                "events": events
            }),
        );
    }

    /// Logs a command the core refused.
    pub fn log_rejected(&self, aggregate_type: &str, aggregate_id: &str, error: &CoreError) {
        self.log(
            aggregate_type,
            serde_json::json!({
                "type": "Rejected",
                "aggregate_id": aggregate_id,
                "kind": error.kind(),
                "message": error.to_string()
            }),
        );
    }

    /// Logs side effects parked in the outbox after a commit.
    pub fn log_effects_deferred(&self, aggregate_id: &str, deferred: usize) {
        self.log(
            "Effects",
            serde_json::json!({
                "type": "Deferred",
                "aggregate_id": aggregate_id,
                "count": deferred
            }),
        );
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }
}

#[cfg(test)]
#[path = "tests/structured_logger_tests.rs"]
mod tests;
