//! Commands for the case file aggregate.

use crate::domain::lifecycle::LifecycleState;
use crate::domain::permissions::Actor;
use crate::domain::types::{Amount, OrganizationId, ReferenceCode, SessionId, Territory};
use serde::{Deserialize, Serialize};

/// Commands that can be sent to the case file aggregate.
///
/// Every command carries the authenticated actor so the aggregate can
/// consult the permission matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseFileCommand {
    /// Open a new case file in `DRAFT`.
    Create {
        actor: Actor,
        reference: ReferenceCode,
        draft: CaseFileDraft,
    },

    /// Edit descriptive data while the file is editable.
    UpdateDraft { actor: Actor, changes: DraftChanges },

    /// Move along one edge of the lifecycle graph.
    RequestTransition { actor: Actor, to: LifecycleState },

    /// Assign the field organization and enter `ASSIGNED_EVS` in one step.
    AssignOrganization {
        actor: Actor,
        organization_id: OrganizationId,
    },

    /// Operator action returning an `EVS_REJECTED` file to the coordinator.
    ReopenForReassignment { actor: Actor },

    /// Point the case file at a workshop session.
    LinkWorkshopSession { actor: Actor, session_id: SessionId },
}

impl CaseFileCommand {
    pub fn actor(&self) -> &Actor {
        match self {
            Self::Create { actor, .. }
            | Self::UpdateDraft { actor, .. }
            | Self::RequestTransition { actor, .. }
            | Self::AssignOrganization { actor, .. }
            | Self::ReopenForReassignment { actor }
            | Self::LinkWorkshopSession { actor, .. } => actor,
        }
    }
}

/// Initial data of a case file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CaseFileDraft {
    #[serde(default)]
    pub territory: Option<Territory>,
    /// Participant and family data; opaque to the workflow core.
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub total_amount: Amount,
}

/// Partial update of an editable case file. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DraftChanges {
    #[serde(default)]
    pub territory: Option<Territory>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub total_amount: Option<Amount>,
}

impl DraftChanges {
    pub fn is_empty(&self) -> bool {
        self.territory.is_none() && self.payload.is_none() && self.total_amount.is_none()
    }
}
