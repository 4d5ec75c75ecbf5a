//! Events emitted by the case file aggregate.
//!
//! Stored events double as the audit trail: each one is committed together
//! with the acting user's id and role in its metadata.

use crate::domain::lifecycle::{LifecycleState, Milestone};
use crate::domain::types::{
    ActorId, Amount, OrganizationId, ReferenceCode, SessionId, Territory, TimestampUtc,
};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

/// Events emitted by the case file aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseFileEvent {
    /// Case file was opened in `DRAFT`.
    CaseFileCreated {
        reference: ReferenceCode,
        emitter_id: ActorId,
        territory: Option<Territory>,
        payload: serde_json::Value,
        total_amount: Amount,
        created_at: TimestampUtc,
    },

    /// Descriptive data was edited.
    DraftUpdated {
        territory: Option<Territory>,
        payload: Option<serde_json::Value>,
        total_amount: Option<Amount>,
        updated_at: TimestampUtc,
    },

    /// A field organization was assigned.
    OrganizationAssigned {
        organization_id: OrganizationId,
        assigned_by: ActorId,
        assigned_at: TimestampUtc,
    },

    /// The file moved along one lifecycle edge.
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
        actor_id: ActorId,
        milestone: Option<Milestone>,
        changed_at: TimestampUtc,
    },

    /// A rejected file was returned to the coordinator for reassignment.
    ReopenedForReassignment {
        previous_organization_id: Option<OrganizationId>,
        reopened_by: ActorId,
        reopened_at: TimestampUtc,
    },

    /// The file now contributes to a workshop session's participant count.
    WorkshopSessionLinked {
        session_id: SessionId,
        previous_session_id: Option<SessionId>,
        linked_at: TimestampUtc,
    },
}

impl DomainEvent for CaseFileEvent {
    fn event_type(&self) -> String {
        match self {
            Self::CaseFileCreated { .. } => "CaseFileCreated".to_string(),
            Self::DraftUpdated { .. } => "DraftUpdated".to_string(),
            Self::OrganizationAssigned { .. } => "OrganizationAssigned".to_string(),
            Self::StateChanged { .. } => "StateChanged".to_string(),
            Self::ReopenedForReassignment { .. } => "ReopenedForReassignment".to_string(),
            Self::WorkshopSessionLinked { .. } => "WorkshopSessionLinked".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
