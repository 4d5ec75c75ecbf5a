//! Case file aggregate.
//!
//! The aggregate owns the lifecycle state and the milestone stamps of one
//! case file. All mutations arrive as [`CaseFileCommand`]s; the aggregate
//! validates them against the transition policy and the permission matrix
//! and answers with the [`CaseFileEvent`]s to commit.

pub mod commands;
pub mod events;
pub mod view;

pub use commands::{CaseFileCommand, CaseFileDraft, DraftChanges};
pub use events::CaseFileEvent;
pub use view::{CaseFileView, TransitionOutcome};

use crate::domain::errors::CoreError;
use crate::domain::lifecycle::{authorize_transition, LifecycleState, Milestone};
use crate::domain::permissions::{Capability, Role, ScopedRecord};
use crate::domain::services::DomainServices;
use crate::domain::types::{
    ActorId, Amount, OrganizationId, ReferenceCode, SessionId, Territory, TimestampUtc,
};
use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

/// Who set a milestone, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneStamp {
    pub actor_id: ActorId,
    pub at: TimestampUtc,
}

/// Milestone stamps of a case file. A stamp is only ever set by the edge
/// entering the state that implies it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Milestones {
    pub contract_signed: Option<MilestoneStamp>,
    pub advance_payment_sent: Option<MilestoneStamp>,
    pub activity_completed: Option<MilestoneStamp>,
    pub field_check_completed: Option<MilestoneStamp>,
    pub final_report_sent: Option<MilestoneStamp>,
    pub remaining_payment_sent: Option<MilestoneStamp>,
}

impl Milestones {
    pub fn get(&self, milestone: Milestone) -> Option<&MilestoneStamp> {
        match milestone {
            Milestone::ContractSigned => self.contract_signed.as_ref(),
            Milestone::AdvancePaymentSent => self.advance_payment_sent.as_ref(),
            Milestone::ActivityCompleted => self.activity_completed.as_ref(),
            Milestone::FieldCheckCompleted => self.field_check_completed.as_ref(),
            Milestone::FinalReportSent => self.final_report_sent.as_ref(),
            Milestone::RemainingPaymentSent => self.remaining_payment_sent.as_ref(),
        }
    }

    pub fn is_set(&self, milestone: Milestone) -> bool {
        self.get(milestone).is_some()
    }

    fn set(&mut self, milestone: Milestone, stamp: MilestoneStamp) {
        let slot = match milestone {
            Milestone::ContractSigned => &mut self.contract_signed,
            Milestone::AdvancePaymentSent => &mut self.advance_payment_sent,
            Milestone::ActivityCompleted => &mut self.activity_completed,
            Milestone::FieldCheckCompleted => &mut self.field_check_completed,
            Milestone::FinalReportSent => &mut self.final_report_sent,
            Milestone::RemainingPaymentSent => &mut self.remaining_payment_sent,
        };
        *slot = Some(stamp);
    }
}

/// Data of an opened case file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    reference: ReferenceCode,
    state: LifecycleState,
    emitter_id: ActorId,
    assigned_organization_id: Option<OrganizationId>,
    territory: Option<Territory>,
    workshop_session_id: Option<SessionId>,
    payload: serde_json::Value,
    total_amount: Amount,
    milestones: Milestones,
    created_at: TimestampUtc,
    updated_at: TimestampUtc,
}

impl CaseFile {
    pub fn reference(&self) -> &ReferenceCode {
        &self.reference
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn emitter_id(&self) -> &ActorId {
        &self.emitter_id
    }

    pub fn assigned_organization_id(&self) -> Option<&OrganizationId> {
        self.assigned_organization_id.as_ref()
    }

    pub fn territory(&self) -> Option<&Territory> {
        self.territory.as_ref()
    }

    pub fn workshop_session_id(&self) -> Option<SessionId> {
        self.workshop_session_id
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn total_amount(&self) -> Amount {
        self.total_amount
    }

    pub fn milestones(&self) -> &Milestones {
        &self.milestones
    }

    pub fn created_at(&self) -> &TimestampUtc {
        &self.created_at
    }

    pub fn updated_at(&self) -> &TimestampUtc {
        &self.updated_at
    }
}

impl ScopedRecord for CaseFile {
    fn emitter_id(&self) -> &ActorId {
        &self.emitter_id
    }

    fn assigned_organization_id(&self) -> Option<&OrganizationId> {
        self.assigned_organization_id.as_ref()
    }

    fn territory(&self) -> Option<&Territory> {
        self.territory.as_ref()
    }
}

/// Case file aggregate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum CaseFileState {
    /// No `CaseFileCreated` event has been applied.
    #[default]
    Uninitialized,
    /// Case file exists (boxed for memory efficiency).
    Active(Box<CaseFile>),
}

/// The case file aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaseFileAggregate {
    pub state: CaseFileState,
}

impl CaseFileAggregate {
    /// Returns the case file data, if the aggregate has been created.
    pub fn case_file(&self) -> Option<&CaseFile> {
        match &self.state {
            CaseFileState::Active(file) => Some(file),
            CaseFileState::Uninitialized => None,
        }
    }
}

#[async_trait]
impl Aggregate for CaseFileAggregate {
    type Command = CaseFileCommand;
    type Event = CaseFileEvent;
    type Error = CoreError;
    type Services = DomainServices;

    fn aggregate_type() -> String {
        "case_file".to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let now = services.clock.now();

        match (&self.state, command) {
            // Create - only valid on uninitialized aggregate
            (CaseFileState::Uninitialized, CaseFileCommand::Create { actor, reference, draft }) => {
                actor.require(Capability::Create)?;
                Ok(vec![CaseFileEvent::CaseFileCreated {
                    reference,
                    emitter_id: actor.id().clone(),
                    territory: draft.territory,
                    payload: draft.payload,
                    total_amount: draft.total_amount,
                    created_at: now,
                }])
            }

            (CaseFileState::Active(file), CaseFileCommand::Create { .. }) => Err(
                CoreError::validation(format!("case file {} already exists", file.reference)),
            ),

            (CaseFileState::Uninitialized, _) => {
                Err(CoreError::not_found("case_file", "uninitialized aggregate"))
            }

            (CaseFileState::Active(file), CaseFileCommand::UpdateDraft { actor, changes }) => {
                if !file.state.is_editable() {
                    return Err(CoreError::invalid_transition(format!(
                        "case file in {} can no longer be edited",
                        file.state
                    )));
                }
                actor.require(Capability::EditDraft)?;
                if actor.role != Role::Administrator && actor.id() != &file.emitter_id {
                    return Err(CoreError::forbidden(
                        "only the emitter may edit a case file",
                    ));
                }
                if changes.is_empty() {
                    return Err(CoreError::validation("no changes supplied"));
                }
                Ok(vec![CaseFileEvent::DraftUpdated {
                    territory: changes.territory,
                    payload: changes.payload,
                    total_amount: changes.total_amount,
                    updated_at: now,
                }])
            }

            (CaseFileState::Active(file), CaseFileCommand::RequestTransition { actor, to }) => {
                let edge = authorize_transition(file.state, to, actor.role)?;
                // A first assignment needs an organization; re-confirming after
                // NEEDS_INFO keeps the one already recorded.
                if edge.to == LifecycleState::AssignedEvs && file.assigned_organization_id.is_none()
                {
                    return Err(CoreError::validation(
                        "no organization assigned yet, use assign_organization",
                    ));
                }
                Ok(vec![CaseFileEvent::StateChanged {
                    from: file.state,
                    to,
                    actor_id: actor.id().clone(),
                    milestone: edge.milestone,
                    changed_at: now,
                }])
            }

            (
                CaseFileState::Active(file),
                CaseFileCommand::AssignOrganization {
                    actor,
                    organization_id,
                },
            ) => {
                let edge =
                    authorize_transition(file.state, LifecycleState::AssignedEvs, actor.role)?;
                if organization_id.as_str().trim().is_empty() {
                    return Err(CoreError::validation("organization id must not be empty"));
                }
                Ok(vec![
                    CaseFileEvent::OrganizationAssigned {
                        organization_id,
                        assigned_by: actor.id().clone(),
                        assigned_at: now,
                    },
                    CaseFileEvent::StateChanged {
                        from: edge.from,
                        to: edge.to,
                        actor_id: actor.id().clone(),
                        milestone: edge.milestone,
                        changed_at: now,
                    },
                ])
            }

            (CaseFileState::Active(file), CaseFileCommand::ReopenForReassignment { actor }) => {
                if file.state != LifecycleState::EvsRejected {
                    return Err(CoreError::invalid_transition(format!(
                        "only EVS_REJECTED files can be reopened, this one is {}",
                        file.state
                    )));
                }
                actor.require(Capability::ReassignRejected)?;
                Ok(vec![CaseFileEvent::ReopenedForReassignment {
                    previous_organization_id: file.assigned_organization_id.clone(),
                    reopened_by: actor.id().clone(),
                    reopened_at: now,
                }])
            }

            (
                CaseFileState::Active(file),
                CaseFileCommand::LinkWorkshopSession { actor, session_id },
            ) => {
                actor.require(Capability::ManageSessions)?;
                if file.state.is_terminal() || file.state == LifecycleState::EvsRejected {
                    return Err(CoreError::invalid_transition(format!(
                        "case file in {} cannot join a workshop session",
                        file.state
                    )));
                }
                if file.workshop_session_id == Some(session_id) {
                    return Ok(vec![]);
                }
                Ok(vec![CaseFileEvent::WorkshopSessionLinked {
                    session_id,
                    previous_session_id: file.workshop_session_id,
                    linked_at: now,
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        if let CaseFileEvent::CaseFileCreated {
            reference,
            emitter_id,
            territory,
            payload,
            total_amount,
            created_at,
        } = event
        {
            self.state = CaseFileState::Active(Box::new(CaseFile {
                reference,
                state: LifecycleState::Draft,
                emitter_id,
                assigned_organization_id: None,
                territory,
                workshop_session_id: None,
                payload,
                total_amount,
                milestones: Milestones::default(),
                created_at,
                updated_at: created_at,
            }));
            return;
        }

        let CaseFileState::Active(file) = &mut self.state else {
            return;
        };

        match event {
            CaseFileEvent::CaseFileCreated { .. } => {}

            CaseFileEvent::DraftUpdated {
                territory,
                payload,
                total_amount,
                updated_at,
            } => {
                if territory.is_some() {
                    file.territory = territory;
                }
                if let Some(payload) = payload {
                    file.payload = payload;
                }
                if let Some(total_amount) = total_amount {
                    file.total_amount = total_amount;
                }
                file.updated_at = updated_at;
            }

            CaseFileEvent::OrganizationAssigned {
                organization_id,
                assigned_at,
                ..
            } => {
                file.assigned_organization_id = Some(organization_id);
                file.updated_at = assigned_at;
            }

            CaseFileEvent::StateChanged {
                to,
                actor_id,
                milestone,
                changed_at,
                ..
            } => {
                file.state = to;
                if let Some(milestone) = milestone {
                    file.milestones.set(
                        milestone,
                        MilestoneStamp {
                            actor_id,
                            at: changed_at,
                        },
                    );
                }
                file.updated_at = changed_at;
            }

            CaseFileEvent::ReopenedForReassignment { reopened_at, .. } => {
                file.assigned_organization_id = None;
                file.state = LifecycleState::SubmittedToFeves;
                file.updated_at = reopened_at;
            }

            CaseFileEvent::WorkshopSessionLinked {
                session_id,
                linked_at,
                ..
            } => {
                file.workshop_session_id = Some(session_id);
                file.updated_at = linked_at;
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/case_file_tests.rs"]
mod tests;
