//! Error types for the case file workflow core.

use cqrs_es::AggregateError;
use std::fmt::{Display, Formatter};

/// Errors returned by every core operation.
///
/// `NotFound`, `InvalidTransition`, `Forbidden`, `ValidationError`,
/// `AlreadyCompleted` and `Vetoed` describe a bad request and are returned
/// verbatim. `Conflict` and `Transient` may be retried after a fresh read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No entity with this id (or not visible to the actor).
    NotFound { entity: &'static str, id: String },
    /// The requested state change is not an edge of the lifecycle graph.
    InvalidTransition { message: String },
    /// The edge exists but the actor's role lacks the required capability.
    Forbidden { message: String },
    /// Optimistic version check failed (concurrent modification detected).
    Conflict { message: String },
    /// Malformed input.
    ValidationError { message: String },
    /// The workshop activity has already been marked as done.
    AlreadyCompleted { message: String },
    /// An external guard refused the mutation before it reached the core.
    Vetoed { reason: String },
    /// Store or collaborator infrastructure failure.
    Transient { message: String },
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Returns true if the caller may retry after refetching current state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Transient { .. })
    }

    /// Stable machine-readable kind, used by the CLI exit output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Forbidden { .. } => "forbidden",
            Self::Conflict { .. } => "conflict",
            Self::ValidationError { .. } => "validation_error",
            Self::AlreadyCompleted { .. } => "already_completed",
            Self::Vetoed { .. } => "vetoed",
            Self::Transient { .. } => "transient",
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{} not found: {}", entity, id),
            Self::InvalidTransition { message } => write!(f, "invalid transition: {}", message),
            Self::Forbidden { message } => write!(f, "forbidden: {}", message),
            Self::Conflict { message } => write!(f, "conflict: {}", message),
            Self::ValidationError { message } => write!(f, "validation error: {}", message),
            Self::AlreadyCompleted { message } => write!(f, "already completed: {}", message),
            Self::Vetoed { reason } => write!(f, "vetoed: {}", reason),
            Self::Transient { message } => write!(f, "transient failure: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<AggregateError<CoreError>> for CoreError {
    fn from(err: AggregateError<CoreError>) -> Self {
        match err {
            AggregateError::UserError(inner) => inner,
            AggregateError::AggregateConflict => Self::Conflict {
                message: "entity was modified concurrently, refetch and retry".to_string(),
            },
            AggregateError::DatabaseConnectionError(e) => Self::transient(e.to_string()),
            AggregateError::DeserializationError(e) => {
                Self::transient(format!("corrupt store record: {}", e))
            }
            AggregateError::UnexpectedError(e) => Self::transient(e.to_string()),
        }
    }
}
