//! Audit records.
//!
//! An audit record is a read of one stored event line: the event type is the
//! action and the actor travels in the event metadata. Because the line is
//! the state change, the two can never be committed separately.

use crate::domain::permissions::Actor;
use crate::domain::types::TimestampUtc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key holding the acting user's id.
pub const META_ACTOR_ID: &str = "actor_id";
/// Metadata key holding the acting user's role.
pub const META_ACTOR_ROLE: &str = "actor_role";

/// Append-only audit fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub entity: String,
    pub entity_id: String,
    pub sequence: u64,
    pub action: String,
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
    pub metadata: HashMap<String, String>,
    pub recorded_at: TimestampUtc,
}

impl AuditRecord {
    /// Builds a record, lifting the actor keys out of `metadata`.
    pub fn new(
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        sequence: u64,
        action: impl Into<String>,
        mut metadata: HashMap<String, String>,
        recorded_at: TimestampUtc,
    ) -> Self {
        let actor_id = metadata.remove(META_ACTOR_ID);
        let actor_role = metadata.remove(META_ACTOR_ROLE);
        Self {
            entity: entity.into(),
            entity_id: entity_id.into(),
            sequence,
            action: action.into(),
            actor_id,
            actor_role,
            metadata,
            recorded_at,
        }
    }
}

/// Event metadata for a command issued by `actor`, merged with caller-supplied
/// request metadata. Caller keys cannot overwrite the actor keys.
pub fn actor_metadata(actor: &Actor, request: &HashMap<String, String>) -> HashMap<String, String> {
    let mut metadata = request.clone();
    metadata.insert(META_ACTOR_ID.to_string(), actor.id().to_string());
    metadata.insert(META_ACTOR_ROLE.to_string(), actor.role.to_string());
    metadata
}
