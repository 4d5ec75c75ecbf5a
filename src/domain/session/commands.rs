//! Commands for the workshop session aggregate.

use super::ContractParty;
use crate::domain::permissions::Actor;
use crate::domain::types::DocumentLocator;
use serde::{Deserialize, Serialize};

/// Commands that can be sent to the workshop session aggregate.
///
/// `participant_count` is read from the case file store by the caller at the
/// moment the command is issued; the aggregate never caches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkshopSessionCommand {
    Create {
        actor: Actor,
        label: String,
        min_capacity: u32,
        max_capacity: u32,
    },

    RecordContractSignature {
        actor: Actor,
        party: ContractParty,
        signed: bool,
        locator: Option<DocumentLocator>,
        participant_count: u32,
    },

    MarkActivityDone {
        actor: Actor,
        participant_count: u32,
    },

    /// Administrative correction of a wrongly declared activity.
    RevertActivityDone { actor: Actor },
}

impl WorkshopSessionCommand {
    pub fn actor(&self) -> &Actor {
        match self {
            Self::Create { actor, .. }
            | Self::RecordContractSignature { actor, .. }
            | Self::MarkActivityDone { actor, .. }
            | Self::RevertActivityDone { actor } => actor,
        }
    }
}
