//! Events emitted by the workshop session aggregate.

use super::ContractParty;
use crate::domain::types::{ActorId, DocumentLocator, TimestampUtc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkshopSessionEvent {
    SessionCreated {
        label: String,
        min_capacity: u32,
        max_capacity: u32,
        created_at: TimestampUtc,
    },

    ContractSignatureRecorded {
        party: ContractParty,
        locator: Option<DocumentLocator>,
        recorded_by: ActorId,
        recorded_at: TimestampUtc,
    },

    ActivityMarkedDone {
        marked_by: ActorId,
        marked_at: TimestampUtc,
    },

    ActivityDoneReverted {
        reverted_by: ActorId,
        reverted_at: TimestampUtc,
    },
}

impl DomainEvent for WorkshopSessionEvent {
    fn event_type(&self) -> String {
        match self {
            Self::SessionCreated { .. } => "SessionCreated".to_string(),
            Self::ContractSignatureRecorded { .. } => "ContractSignatureRecorded".to_string(),
            Self::ActivityMarkedDone { .. } => "ActivityMarkedDone".to_string(),
            Self::ActivityDoneReverted { .. } => "ActivityDoneReverted".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
