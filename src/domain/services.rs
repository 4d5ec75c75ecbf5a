//! External services for the case file and workshop session aggregates.
//!
//! Services provide external dependencies (time, session policy) to the
//! aggregates without coupling them to specific implementations.

use crate::domain::types::TimestampUtc;

/// Services injected into both aggregates for command handling.
#[derive(Debug, Clone, Default)]
pub struct DomainServices {
    pub clock: DomainClock,
    pub session_policy: SessionPolicy,
}

/// Clock service for timestamp generation.
#[derive(Debug, Clone, Default)]
pub struct DomainClock {
    fixed: Option<TimestampUtc>,
}

impl DomainClock {
    /// A clock that always returns `at`. Used by tests and replays.
    pub fn fixed(at: TimestampUtc) -> Self {
        Self { fixed: Some(at) }
    }

    /// Returns the current UTC timestamp.
    pub fn now(&self) -> TimestampUtc {
        self.fixed.unwrap_or_else(TimestampUtc::now)
    }
}

/// Business rules for workshop sessions that vary by deployment.
#[derive(Debug, Clone, Default)]
pub struct SessionPolicy {
    /// When set, both the field organization and the municipality must have
    /// signed before the activity can be marked done.
    pub require_both_signatures: bool,
}
