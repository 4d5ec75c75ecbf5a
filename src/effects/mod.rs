//! Side effects owed after a commit.
//!
//! The workflow core returns notification intents and the event store writes
//! the audit trail; this module carries both out to the collaborators that
//! live outside the core. Delivery never affects the committed state: a
//! failed attempt is logged and parked in the [`Outbox`] until
//! [`EffectDispatcher::retry_outbox`] succeeds or gives up.

pub mod audit_sink;
pub mod documents;
pub mod notifier;
pub mod outbox;

pub use audit_sink::{AuditSink, JsonlAuditSink};
pub use documents::{DocumentMetadata, DocumentStorage, FsDocumentStorage};
pub use notifier::{JsonlNotifier, NotificationDispatcher, TracingNotifier};
pub use outbox::{Outbox, OutboxEntry};

use crate::domain::audit::AuditRecord;
use crate::domain::intents::NotificationIntent;
use crate::domain::types::TimestampUtc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Filesystem or transport failure.
    Io(String),
    /// The collaborator answered but refused the request.
    Rejected(String),
    /// A stored document was not found.
    Missing(String),
}

impl std::fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollaboratorError::Io(msg) => write!(f, "I/O failure: {}", msg),
            CollaboratorError::Rejected(msg) => write!(f, "rejected: {}", msg),
            CollaboratorError::Missing(msg) => write!(f, "not found: {}", msg),
        }
    }
}

impl std::error::Error for CollaboratorError {}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        CollaboratorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::Io(err.to_string())
    }
}

/// One unit of post-commit work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    Notify {
        event_name: String,
        payload: serde_json::Value,
    },
    Audit {
        record: AuditRecord,
    },
}

impl SideEffect {
    pub fn notify(intent: &NotificationIntent) -> Self {
        SideEffect::Notify {
            event_name: intent.event_name.clone(),
            payload: intent.dispatch_payload(),
        }
    }

    fn label(&self) -> &str {
        match self {
            SideEffect::Notify { event_name, .. } => event_name,
            SideEffect::Audit { record } => &record.action,
        }
    }
}

/// Outcome of one outbox retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub delivered: usize,
    pub pending: usize,
    pub dead_lettered: usize,
}

/// Sends side effects to their collaborators, parking failures in the outbox.
pub struct EffectDispatcher {
    notifier: Arc<dyn NotificationDispatcher>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    outbox: Outbox,
}

impl EffectDispatcher {
    pub fn new(notifier: Arc<dyn NotificationDispatcher>, outbox: Outbox) -> Self {
        Self {
            notifier,
            audit_sink: None,
            outbox,
        }
    }

    /// Mirrors every committed audit record to `sink`.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Effects owed for a commit. Audit mirroring is skipped when no sink
    /// is configured.
    pub fn effects_for(
        &self,
        intents: &[NotificationIntent],
        audit: Vec<AuditRecord>,
    ) -> Vec<SideEffect> {
        let mut effects: Vec<SideEffect> = intents.iter().map(SideEffect::notify).collect();
        if self.audit_sink.is_some() {
            effects.extend(audit.into_iter().map(|record| SideEffect::Audit { record }));
        }
        effects
    }

    /// Attempts every effect once. Returns how many were parked in the outbox.
    pub async fn dispatch(&self, effects: Vec<SideEffect>) -> usize {
        let mut deferred = 0;
        for effect in effects {
            if let Err(err) = self.attempt(&effect).await {
                tracing::warn!(effect = effect.label(), error = %err, "side effect failed, parking in outbox");
                deferred += 1;
                if let Err(park_err) = self.outbox.enqueue(effect, &err.to_string()) {
                    tracing::error!(error = %park_err, "failed to write outbox entry");
                }
            }
        }
        deferred
    }

    /// Re-attempts every parked effect once. Entries that reach the attempt
    /// limit move to the dead-letter file.
    pub async fn retry_outbox(&self) -> Result<RetryReport, CollaboratorError> {
        let mut batch = self.outbox.lock_pending()?;
        let mut report = RetryReport::default();
        let mut still_failing = Vec::new();

        for mut entry in batch.take_entries() {
            match self.attempt(&entry.effect).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    entry.attempts += 1;
                    entry.last_error = err.to_string();
                    entry.last_attempt_at = TimestampUtc::now();
                    still_failing.push(entry);
                }
            }
        }

        let (pending, dead_lettered) = self.outbox.settle(batch, still_failing)?;
        report.pending = pending;
        report.dead_lettered = dead_lettered;
        if dead_lettered > 0 {
            tracing::warn!(dead_lettered, "outbox entries exhausted their attempts");
        }
        Ok(report)
    }

    async fn attempt(&self, effect: &SideEffect) -> Result<(), CollaboratorError> {
        match effect {
            SideEffect::Notify {
                event_name,
                payload,
            } => self.notifier.dispatch(event_name, payload).await,
            SideEffect::Audit { record } => match &self.audit_sink {
                Some(sink) => sink.record(record).await,
                None => Ok(()),
            },
        }
    }
}

/// Appends one JSON line to `path` under an exclusive lock.
pub(crate) fn append_jsonl(path: &Path, value: &impl Serialize) -> Result<(), CollaboratorError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    let line = serde_json::to_string(value)?;
    writeln!(file, "{}", line)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/effects_tests.rs"]
mod tests;
