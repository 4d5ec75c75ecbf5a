//! Displayed status of a workshop session.
//!
//! The status is never stored. It is recomputed from the session's facts and
//! the live participant count every time someone asks.

use super::WorkshopSession;
use crate::domain::errors::CoreError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Human-visible status of a workshop session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Ready,
    InProgress,
    Completed,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 4] = [
        SessionStatus::Pending,
        SessionStatus::Ready,
        SessionStatus::InProgress,
        SessionStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Ready => "READY",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
        }
    }

    /// Contracts may no longer be changed by non-administrators.
    pub fn locks_contracts(&self) -> bool {
        matches!(self, SessionStatus::InProgress | SessionStatus::Completed)
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        SessionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| CoreError::validation(format!("unknown session status '{}'", s)))
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives the status; first matching rule wins.
pub fn derive_session_status(session: &WorkshopSession, participant_count: u32) -> SessionStatus {
    if session.activity_done() {
        SessionStatus::Completed
    } else if session.evs_contract_signed() || session.municipality_contract_signed() {
        // One signature is enough to leave READY.
        SessionStatus::InProgress
    } else if participant_count >= session.min_capacity() {
        SessionStatus::Ready
    } else {
        SessionStatus::Pending
    }
}
