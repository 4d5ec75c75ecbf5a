//! Workshop session operations of the workflow service.

use super::{collaborator_error, Committed, Request, WorkflowService};
use crate::domain::audit::AuditRecord;
use crate::domain::errors::CoreError;
use crate::domain::intents::session_intents;
use crate::domain::permissions::{Actor, Capability};
use crate::domain::types::{DocumentLocator, SessionId};
use crate::domain::{
    ContractParty, SessionOutcome, SessionView, WorkshopSessionAggregate, WorkshopSessionCommand,
};
use crate::effects::DocumentMetadata;
use crate::guard::{self, Operation};
use cqrs_es::EventStore;
use std::collections::HashMap;

fn session_exists(
    id: &SessionId,
) -> impl FnOnce(&WorkshopSessionAggregate, u64) -> Result<(), CoreError> + '_ {
    move |aggregate, _| match aggregate.session() {
        Some(_) => Ok(()),
        None => Err(CoreError::not_found("workshop_session", id)),
    }
}

impl WorkflowService {
    /// Opens a workshop session with seat bounds.
    pub async fn create_session(
        &self,
        actor: &Actor,
        label: &str,
        min_capacity: u32,
        max_capacity: u32,
    ) -> Result<SessionOutcome, CoreError> {
        let id = SessionId::new();
        let aggregate_id = id.to_string();
        let committed = self
            .execute(
                &self.sessions,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::CreateSession,
                    actor,
                    metadata: &HashMap::new(),
                },
                WorkshopSessionCommand::Create {
                    actor: actor.clone(),
                    label: label.trim().to_string(),
                    min_capacity,
                    max_capacity,
                },
                |_, _| Ok(()),
            )
            .await?;
        self.finish_session(id, 0, committed).await
    }

    /// Records one party's contract signature.
    pub async fn record_contract_signature(
        &self,
        actor: &Actor,
        id: &SessionId,
        party: ContractParty,
        signed: bool,
        locator: Option<DocumentLocator>,
    ) -> Result<SessionOutcome, CoreError> {
        let participant_count = self.participant_count(id)?;
        let aggregate_id = id.to_string();
        let committed = self
            .execute(
                &self.sessions,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::RecordContractSignature,
                    actor,
                    metadata: &HashMap::new(),
                },
                WorkshopSessionCommand::RecordContractSignature {
                    actor: actor.clone(),
                    party,
                    signed,
                    locator,
                    participant_count,
                },
                session_exists(id),
            )
            .await?;
        self.finish_session(*id, participant_count, committed).await
    }

    /// Stores the signed municipality contract and records the signature
    /// with its locator.
    pub async fn attach_contract_document(
        &self,
        actor: &Actor,
        id: &SessionId,
        blob: &[u8],
        metadata: DocumentMetadata,
    ) -> Result<SessionOutcome, CoreError> {
        guard::enforce(self.guard.as_ref(), actor, Operation::RecordContractSignature)?;
        actor.require(Capability::SignSessionContract)?;
        if blob.is_empty() {
            return Err(CoreError::validation("contract document is empty"));
        }
        self.get_session(actor, id).await?;

        let metadata = DocumentMetadata {
            uploaded_by: Some(actor.id().to_string()),
            ..metadata
        };
        let locator = self
            .documents
            .store(blob, &metadata)
            .await
            .map_err(collaborator_error)?;
        tracing::info!(session_id = %id, locator = %locator, "stored contract document");

        self.record_contract_signature(actor, id, ContractParty::Municipality, true, Some(locator))
            .await
    }

    /// Declares the workshop activity done.
    pub async fn mark_activity_done(
        &self,
        actor: &Actor,
        id: &SessionId,
    ) -> Result<SessionOutcome, CoreError> {
        let participant_count = self.participant_count(id)?;
        let aggregate_id = id.to_string();
        let committed = self
            .execute(
                &self.sessions,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::MarkActivityDone,
                    actor,
                    metadata: &HashMap::new(),
                },
                WorkshopSessionCommand::MarkActivityDone {
                    actor: actor.clone(),
                    participant_count,
                },
                session_exists(id),
            )
            .await?;
        self.finish_session(*id, participant_count, committed).await
    }

    /// Administrative correction of a wrongly declared activity.
    pub async fn revert_activity_done(
        &self,
        actor: &Actor,
        id: &SessionId,
    ) -> Result<SessionOutcome, CoreError> {
        let participant_count = self.participant_count(id)?;
        let aggregate_id = id.to_string();
        let committed = self
            .execute(
                &self.sessions,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::RevertActivityDone,
                    actor,
                    metadata: &HashMap::new(),
                },
                WorkshopSessionCommand::RevertActivityDone {
                    actor: actor.clone(),
                },
                session_exists(id),
            )
            .await?;
        self.finish_session(*id, participant_count, committed).await
    }

    /// Reads one session with its live participant count.
    pub async fn get_session(
        &self,
        _actor: &Actor,
        id: &SessionId,
    ) -> Result<SessionView, CoreError> {
        let context = self.sessions.load_aggregate(&id.to_string()).await?;
        let Some(session) = context.aggregate.session() else {
            return Err(CoreError::not_found("workshop_session", id));
        };
        Ok(SessionView::new(
            *id,
            context.current_sequence,
            session.clone(),
            self.participant_count(id)?,
        ))
    }

    /// Every session, oldest first.
    pub fn list_sessions(&self, _actor: &Actor) -> Result<Vec<SessionView>, CoreError> {
        let counts = self.participant_counts()?;
        let mut views = Vec::new();
        for (aggregate_id, (version, aggregate)) in self.sessions.replay_all()? {
            let Some(session) = aggregate.session() else {
                continue;
            };
            let id = SessionId::from_string(&aggregate_id)
                .map_err(|e| CoreError::transient(format!("corrupt session id: {}", e)))?;
            let count = counts.get(&id).copied().unwrap_or(0);
            views.push(SessionView::new(id, version, session.clone(), count));
        }
        views.sort_by_key(|view| *view.session.created_at());
        Ok(views)
    }

    pub async fn session_audit(
        &self,
        actor: &Actor,
        id: &SessionId,
    ) -> Result<Vec<AuditRecord>, CoreError> {
        self.get_session(actor, id).await?;
        Ok(self.sessions.audit_trail(&id.to_string())?)
    }

    async fn finish_session(
        &self,
        id: SessionId,
        participant_count: u32,
        committed: Committed<WorkshopSessionAggregate>,
    ) -> Result<SessionOutcome, CoreError> {
        let Committed {
            aggregate,
            version,
            events,
            audit,
        } = committed;
        let session = aggregate
            .session()
            .cloned()
            .ok_or_else(|| CoreError::not_found("workshop_session", id))?;
        let intents = session_intents(&id, &session, &events);
        self.settle_effects(&id.to_string(), &intents, audit).await;

        Ok(SessionOutcome {
            session: SessionView::new(id, version, session, participant_count),
            intents,
        })
    }
}
