//! Workshop session aggregate.
//!
//! A session stores facts only: capacity bounds, the two contract signatures
//! and whether the activity took place. Its participant count comes from the
//! case files pointing at it and its status from [`derive_session_status`].

pub mod commands;
pub mod derive;
pub mod events;

pub use commands::WorkshopSessionCommand;
pub use derive::{derive_session_status, SessionStatus};
pub use events::WorkshopSessionEvent;

use crate::domain::errors::CoreError;
use crate::domain::intents::NotificationIntent;
use crate::domain::permissions::{Capability, Role};
use crate::domain::services::DomainServices;
use crate::domain::types::{DocumentLocator, SessionId, TimestampUtc};
use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Party whose signature a session contract carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractParty {
    /// The field organization (EVS/CS).
    Evs,
    Municipality,
}

impl FromStr for ContractParty {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EVS" | "EVS_CS" | "FIELD_ORGANIZATION" => Ok(ContractParty::Evs),
            "MUNICIPALITY" | "COMMUNE" => Ok(ContractParty::Municipality),
            _ => Err(CoreError::validation(format!(
                "unknown contract party '{}' (expected EVS or MUNICIPALITY)",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ContractParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractParty::Evs => f.write_str("EVS"),
            ContractParty::Municipality => f.write_str("MUNICIPALITY"),
        }
    }
}

/// Stored facts of a workshop session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopSession {
    label: String,
    min_capacity: u32,
    max_capacity: u32,
    evs_contract_signed: bool,
    municipality_contract_signed: bool,
    municipality_contract_locator: Option<DocumentLocator>,
    activity_done: bool,
    created_at: TimestampUtc,
    updated_at: TimestampUtc,
}

impl WorkshopSession {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn min_capacity(&self) -> u32 {
        self.min_capacity
    }

    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    pub fn evs_contract_signed(&self) -> bool {
        self.evs_contract_signed
    }

    pub fn municipality_contract_signed(&self) -> bool {
        self.municipality_contract_signed
    }

    pub fn municipality_contract_locator(&self) -> Option<&DocumentLocator> {
        self.municipality_contract_locator.as_ref()
    }

    pub fn activity_done(&self) -> bool {
        self.activity_done
    }

    pub fn is_signed_by(&self, party: ContractParty) -> bool {
        match party {
            ContractParty::Evs => self.evs_contract_signed,
            ContractParty::Municipality => self.municipality_contract_signed,
        }
    }

    pub fn created_at(&self) -> &TimestampUtc {
        &self.created_at
    }

    pub fn updated_at(&self) -> &TimestampUtc {
        &self.updated_at
    }
}

/// Workshop session aggregate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum WorkshopSessionState {
    #[default]
    Uninitialized,
    Active(Box<WorkshopSession>),
}

/// The workshop session aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkshopSessionAggregate {
    pub state: WorkshopSessionState,
}

impl WorkshopSessionAggregate {
    pub fn session(&self) -> Option<&WorkshopSession> {
        match &self.state {
            WorkshopSessionState::Active(session) => Some(session),
            WorkshopSessionState::Uninitialized => None,
        }
    }
}

#[async_trait]
impl Aggregate for WorkshopSessionAggregate {
    type Command = WorkshopSessionCommand;
    type Event = WorkshopSessionEvent;
    type Error = CoreError;
    type Services = DomainServices;

    fn aggregate_type() -> String {
        "workshop_session".to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let now = services.clock.now();

        match (&self.state, command) {
            (
                WorkshopSessionState::Uninitialized,
                WorkshopSessionCommand::Create {
                    actor,
                    label,
                    min_capacity,
                    max_capacity,
                },
            ) => {
                actor.require(Capability::ManageSessions)?;
                if label.trim().is_empty() {
                    return Err(CoreError::validation("session label must not be empty"));
                }
                if min_capacity == 0 || min_capacity > max_capacity {
                    return Err(CoreError::validation(format!(
                        "invalid capacity bounds {}..{}",
                        min_capacity, max_capacity
                    )));
                }
                Ok(vec![WorkshopSessionEvent::SessionCreated {
                    label,
                    min_capacity,
                    max_capacity,
                    created_at: now,
                }])
            }

            (WorkshopSessionState::Active(_), WorkshopSessionCommand::Create { .. }) => {
                Err(CoreError::validation("workshop session already exists"))
            }

            (WorkshopSessionState::Uninitialized, _) => Err(CoreError::not_found(
                "workshop_session",
                "uninitialized aggregate",
            )),

            (
                WorkshopSessionState::Active(session),
                WorkshopSessionCommand::RecordContractSignature {
                    actor,
                    party,
                    signed,
                    locator,
                    participant_count,
                },
            ) => {
                actor.require(Capability::SignSessionContract)?;
                if locator.is_some() && party != ContractParty::Municipality {
                    return Err(CoreError::validation(
                        "a contract document can only be attached to the municipality signature",
                    ));
                }
                let status = derive_session_status(session, participant_count);
                if status.locks_contracts() && actor.role != Role::Administrator {
                    return Err(CoreError::forbidden(format!(
                        "contracts are locked while the session is {}",
                        status
                    )));
                }

                let already_signed = session.is_signed_by(party);
                if !signed {
                    if already_signed {
                        return Err(CoreError::validation(format!(
                            "the {} signature cannot be withdrawn",
                            party
                        )));
                    }
                    return Ok(vec![]);
                }
                let same_document =
                    locator.is_none() || locator == session.municipality_contract_locator;
                if already_signed && same_document {
                    return Ok(vec![]);
                }

                Ok(vec![WorkshopSessionEvent::ContractSignatureRecorded {
                    party,
                    locator,
                    recorded_by: actor.id().clone(),
                    recorded_at: now,
                }])
            }

            (
                WorkshopSessionState::Active(session),
                WorkshopSessionCommand::MarkActivityDone {
                    actor,
                    participant_count,
                },
            ) => {
                actor.require(Capability::DeclareActivity)?;
                if session.activity_done {
                    return Err(CoreError::AlreadyCompleted {
                        message: "workshop session activity is already marked done".to_string(),
                    });
                }
                let status = derive_session_status(session, participant_count);
                if status != SessionStatus::InProgress {
                    return Err(CoreError::invalid_transition(format!(
                        "activity can only be marked done while IN_PROGRESS, session is {}",
                        status
                    )));
                }
                if services.session_policy.require_both_signatures
                    && !(session.evs_contract_signed && session.municipality_contract_signed)
                {
                    return Err(CoreError::validation(
                        "both the EVS and the municipality contracts must be signed",
                    ));
                }
                Ok(vec![WorkshopSessionEvent::ActivityMarkedDone {
                    marked_by: actor.id().clone(),
                    marked_at: now,
                }])
            }

            (
                WorkshopSessionState::Active(session),
                WorkshopSessionCommand::RevertActivityDone { actor },
            ) => {
                actor.require(Capability::CorrectRecords)?;
                if !session.activity_done {
                    return Err(CoreError::invalid_transition(
                        "activity is not marked done",
                    ));
                }
                Ok(vec![WorkshopSessionEvent::ActivityDoneReverted {
                    reverted_by: actor.id().clone(),
                    reverted_at: now,
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        if let WorkshopSessionEvent::SessionCreated {
            label,
            min_capacity,
            max_capacity,
            created_at,
        } = event
        {
            self.state = WorkshopSessionState::Active(Box::new(WorkshopSession {
                label,
                min_capacity,
                max_capacity,
                evs_contract_signed: false,
                municipality_contract_signed: false,
                municipality_contract_locator: None,
                activity_done: false,
                created_at,
                updated_at: created_at,
            }));
            return;
        }

        let WorkshopSessionState::Active(session) = &mut self.state else {
            return;
        };

        match event {
            WorkshopSessionEvent::SessionCreated { .. } => {}

            WorkshopSessionEvent::ContractSignatureRecorded {
                party,
                locator,
                recorded_at,
                ..
            } => {
                match party {
                    ContractParty::Evs => session.evs_contract_signed = true,
                    ContractParty::Municipality => {
                        session.municipality_contract_signed = true;
                        if locator.is_some() {
                            session.municipality_contract_locator = locator;
                        }
                    }
                }
                session.updated_at = recorded_at;
            }

            WorkshopSessionEvent::ActivityMarkedDone { marked_at, .. } => {
                session.activity_done = true;
                session.updated_at = marked_at;
            }

            WorkshopSessionEvent::ActivityDoneReverted { reverted_at, .. } => {
                session.activity_done = false;
                session.updated_at = reverted_at;
            }
        }
    }
}

/// A workshop session with its live participant count and derived status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: SessionId,
    pub version: u64,
    #[serde(flatten)]
    pub session: WorkshopSession,
    pub participant_count: u32,
    pub status: SessionStatus,
}

impl SessionView {
    /// Builds the view, deriving the status from the given count.
    pub fn new(id: SessionId, version: u64, session: WorkshopSession, participant_count: u32) -> Self {
        let status = derive_session_status(&session, participant_count);
        Self {
            id,
            version,
            session,
            participant_count,
            status,
        }
    }

    /// Remaining seats before `max_capacity`.
    pub fn free_seats(&self) -> u32 {
        self.session.max_capacity.saturating_sub(self.participant_count)
    }
}

/// Result of a successful session mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session: SessionView,
    pub intents: Vec<NotificationIntent>,
}

#[cfg(test)]
#[path = "../tests/session_tests.rs"]
mod tests;
