//! Audit mirror outside the event log.

use super::{append_jsonl, CollaboratorError};
use crate::domain::audit::AuditRecord;
use async_trait::async_trait;
use std::path::PathBuf;

/// Receives a copy of every committed audit record.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<(), CollaboratorError>;
}

/// Appends audit records to a JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), CollaboratorError> {
        append_jsonl(&self.path, record)
    }
}
