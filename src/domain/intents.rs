//! Notification intents derived from committed events.
//!
//! Intents are computed after the commit from the events that were actually
//! stored, so a rejected command never produces one.

use crate::domain::case_file::{CaseFile, CaseFileEvent};
use crate::domain::lifecycle::{find_edge, Recipient};
use crate::domain::session::{WorkshopSession, WorkshopSessionEvent};
use crate::domain::types::{CaseFileId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A notification the core owes to some party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntent {
    /// Dotted event name, e.g. `case_file.assigned_evs`.
    pub event_name: String,
    pub recipient: Recipient,
    /// Concrete addressee when the core knows it (emitter or organization id).
    pub recipient_id: Option<String>,
    pub entity: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
}

impl NotificationIntent {
    /// Body handed to the notification dispatcher.
    pub fn dispatch_payload(&self) -> serde_json::Value {
        json!({
            "recipient": self.recipient,
            "recipient_id": self.recipient_id,
            "entity": self.entity,
            "entity_id": self.entity_id,
            "data": self.payload,
        })
    }
}

fn recipient_id(file: &CaseFile, recipient: Recipient) -> Option<String> {
    match recipient {
        Recipient::Emitter => Some(file.emitter_id().to_string()),
        Recipient::AssignedOrganization => file.assigned_organization_id().map(|o| o.to_string()),
        Recipient::Coordinator | Recipient::OversightBody => None,
    }
}

/// Intents owed for events committed on a case file.
///
/// `file` is the state after the events were applied.
pub fn case_file_intents(
    id: &CaseFileId,
    file: &CaseFile,
    events: &[CaseFileEvent],
) -> Vec<NotificationIntent> {
    let mut intents = Vec::new();

    for event in events {
        match event {
            CaseFileEvent::StateChanged { from, to, .. } => {
                let Some(edge) = find_edge(*from, *to) else {
                    continue;
                };
                let event_name = format!("case_file.{}", to.as_str().to_lowercase());
                for recipient in edge.notify {
                    intents.push(NotificationIntent {
                        event_name: event_name.clone(),
                        recipient: *recipient,
                        recipient_id: recipient_id(file, *recipient),
                        entity: "case_file".to_string(),
                        entity_id: id.to_string(),
                        payload: json!({
                            "reference": file.reference(),
                            "from": from,
                            "to": to,
                        }),
                    });
                }
            }

            CaseFileEvent::ReopenedForReassignment {
                previous_organization_id,
                ..
            } => intents.push(NotificationIntent {
                event_name: "case_file.reopened_for_reassignment".to_string(),
                recipient: Recipient::Coordinator,
                recipient_id: None,
                entity: "case_file".to_string(),
                entity_id: id.to_string(),
                payload: json!({
                    "reference": file.reference(),
                    "previous_organization_id": previous_organization_id,
                }),
            }),

            CaseFileEvent::CaseFileCreated { .. }
            | CaseFileEvent::DraftUpdated { .. }
            | CaseFileEvent::OrganizationAssigned { .. }
            | CaseFileEvent::WorkshopSessionLinked { .. } => {}
        }
    }

    intents
}

/// Intents owed for events committed on a workshop session.
pub fn session_intents(
    id: &SessionId,
    session: &WorkshopSession,
    events: &[WorkshopSessionEvent],
) -> Vec<NotificationIntent> {
    events
        .iter()
        .filter_map(|event| match event {
            WorkshopSessionEvent::ActivityMarkedDone { marked_by, .. } => {
                Some(NotificationIntent {
                    event_name: "workshop_session.activity_done".to_string(),
                    recipient: Recipient::OversightBody,
                    recipient_id: None,
                    entity: "workshop_session".to_string(),
                    entity_id: id.to_string(),
                    payload: json!({
                        "label": session.label(),
                        "marked_by": marked_by,
                    }),
                })
            }
            _ => None,
        })
        .collect()
}
