//! Notification delivery.

use super::{append_jsonl, CollaboratorError};
use crate::domain::types::TimestampUtc;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// Delivers named notifications to recipients. At-least-once: a payload may
/// arrive twice after an outbox retry.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Result<(), CollaboratorError>;
}

/// Writes notifications to the tracing log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationDispatcher for TracingNotifier {
    async fn dispatch(
        &self,
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(event = event_name, %payload, "notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct NotificationLine<'a> {
    ts: TimestampUtc,
    event_name: &'a str,
    payload: &'a serde_json::Value,
}

/// Appends notifications to a JSONL file for a mailer to pick up.
#[derive(Debug, Clone)]
pub struct JsonlNotifier {
    path: PathBuf,
}

impl JsonlNotifier {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl NotificationDispatcher for JsonlNotifier {
    async fn dispatch(
        &self,
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        append_jsonl(
            &self.path,
            &NotificationLine {
                ts: TimestampUtc::now(),
                event_name,
                payload,
            },
        )
    }
}
