//! Request-scoped entry point of the workflow.
//!
//! Each operation runs as one unit: veto check, load, validate, commit under
//! the store's optimistic sequence check, then side-effect dispatch. A
//! failure before the commit leaves no trace; a failure after it never
//! rolls the commit back.

mod case_files;
mod sessions;

pub use case_files::TransitionRequest;

use crate::config::{NotificationSink, ServiceConfig};
use crate::domain::audit::{actor_metadata, AuditRecord};
use crate::domain::errors::CoreError;
use crate::domain::intents::NotificationIntent;
use crate::domain::permissions::Actor;
use crate::domain::services::DomainServices;
use crate::domain::types::TimestampUtc;
use crate::domain::{CaseFileAggregate, WorkshopSessionAggregate};
use crate::effects::{
    CollaboratorError, DocumentStorage, EffectDispatcher, FsDocumentStorage, JsonlAuditSink,
    JsonlNotifier, NotificationDispatcher, Outbox, RetryReport, TracingNotifier,
};
use crate::event_store::FileEventStore;
use crate::guard::{self, AllowAll, DemoAccountGuard, MutationGuard, Operation};
use crate::structured_logger::StructuredLogger;
use cqrs_es::{Aggregate, DomainEvent, EventStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Aggregate state and events after a successful commit.
struct Committed<A: Aggregate> {
    aggregate: A,
    version: u64,
    events: Vec<A::Event>,
    audit: Vec<AuditRecord>,
}

/// Who is asking for what, on which aggregate.
struct Request<'a> {
    aggregate_id: &'a str,
    operation: Operation,
    actor: &'a Actor,
    metadata: &'a HashMap<String, String>,
}

/// The workflow core behind one data directory.
pub struct WorkflowService {
    case_files: FileEventStore<CaseFileAggregate>,
    sessions: FileEventStore<WorkshopSessionAggregate>,
    services: DomainServices,
    guard: Arc<dyn MutationGuard>,
    effects: EffectDispatcher,
    documents: Arc<dyn DocumentStorage>,
    logger: Option<Arc<StructuredLogger>>,
}

impl WorkflowService {
    /// Service over `data_dir` with default collaborators: notifications to
    /// the tracing log, no veto, documents under `<data_dir>/documents`.
    pub fn new(data_dir: &Path, snapshot_every: u64, max_attempts: u32) -> Self {
        Self {
            case_files: FileEventStore::in_dir(data_dir, snapshot_every),
            sessions: FileEventStore::in_dir(data_dir, snapshot_every),
            services: DomainServices::default(),
            guard: Arc::new(AllowAll),
            effects: EffectDispatcher::new(
                Arc::new(TracingNotifier),
                Outbox::new(data_dir, max_attempts),
            ),
            documents: Arc::new(FsDocumentStorage::new(data_dir.join("documents"))),
            logger: None,
        }
    }

    /// Wires every collaborator from configuration.
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let data_dir = config.data_dir()?;
        let notifier: Arc<dyn NotificationDispatcher> = match config.notifications.sink {
            NotificationSink::Log => Arc::new(TracingNotifier),
            NotificationSink::File => Arc::new(JsonlNotifier::new(config.notifications_path()?)),
        };
        let mut effects = EffectDispatcher::new(
            notifier,
            Outbox::new(&data_dir, config.outbox.max_attempts),
        );
        if config.audit.mirror {
            effects = effects.with_audit_sink(Arc::new(JsonlAuditSink::new(config.audit_path()?)));
        }

        let logger = StructuredLogger::new(&uuid::Uuid::new_v4().to_string(), &config.logs_dir()?)?;

        Ok(Self::new(&data_dir, config.store.snapshot_every, config.outbox.max_attempts)
            .with_services(config.domain_services())
            .with_guard(Arc::new(DemoAccountGuard::new(
                config.demo.production,
                config.demo.demo_actors.iter().cloned(),
            )))
            .with_effects(effects)
            .with_logger(Arc::new(logger)))
    }

    pub fn with_services(mut self, services: DomainServices) -> Self {
        self.services = services;
        self
    }

    pub fn with_guard(mut self, guard: Arc<dyn MutationGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_effects(mut self, effects: EffectDispatcher) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentStorage>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_logger(mut self, logger: Arc<StructuredLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Re-attempts every side effect parked in the outbox.
    pub async fn retry_outbox(&self) -> Result<RetryReport, CoreError> {
        self.effects
            .retry_outbox()
            .await
            .map_err(|e| CoreError::transient(e.to_string()))
    }

    /// Runs one command through load, check, handle and commit.
    ///
    /// `precheck` sees the loaded aggregate and its version before the
    /// command is handled; it is where visibility and expected-version
    /// checks live.
    async fn execute<A>(
        &self,
        store: &FileEventStore<A>,
        request: Request<'_>,
        command: A::Command,
        precheck: impl FnOnce(&A, u64) -> Result<(), CoreError>,
    ) -> Result<Committed<A>, CoreError>
    where
        A: Aggregate<Error = CoreError, Services = DomainServices> + Clone,
        A::Command: Serialize,
    {
        self.execute_guarded(store, request, command, precheck, |_| Ok(()))
            .await
    }

    /// Like [`Self::execute`], with `invariant` checked against every
    /// aggregate of the store inside the commit lock.
    async fn execute_guarded<A>(
        &self,
        store: &FileEventStore<A>,
        request: Request<'_>,
        command: A::Command,
        precheck: impl FnOnce(&A, u64) -> Result<(), CoreError>,
        invariant: impl FnOnce(&BTreeMap<String, (u64, A)>) -> Result<(), CoreError>,
    ) -> Result<Committed<A>, CoreError>
    where
        A: Aggregate<Error = CoreError, Services = DomainServices> + Clone,
        A::Command: Serialize,
    {
        guard::enforce(self.guard.as_ref(), request.actor, request.operation)?;
        let aggregate_type = A::aggregate_type();
        if let Some(logger) = &self.logger {
            logger.log_command(&aggregate_type, request.aggregate_id, request.actor, &command);
        }

        let result = self
            .handle_and_commit(store, &request, command, precheck, invariant)
            .await;

        match (&result, &self.logger) {
            (Ok(committed), Some(logger)) if !committed.events.is_empty() => {
                logger.log_committed(
                    &aggregate_type,
                    request.aggregate_id,
                    committed.version,
                    &committed.events,
                );
            }
            (Err(err), Some(logger)) => {
                logger.log_rejected(&aggregate_type, request.aggregate_id, err)
            }
            _ => {}
        }
        result
    }

    async fn handle_and_commit<A>(
        &self,
        store: &FileEventStore<A>,
        request: &Request<'_>,
        command: A::Command,
        precheck: impl FnOnce(&A, u64) -> Result<(), CoreError>,
        invariant: impl FnOnce(&BTreeMap<String, (u64, A)>) -> Result<(), CoreError>,
    ) -> Result<Committed<A>, CoreError>
    where
        A: Aggregate<Error = CoreError, Services = DomainServices> + Clone,
    {
        let context = store.load_aggregate(request.aggregate_id).await?;
        precheck(&context.aggregate, context.current_sequence)?;

        let events = context.aggregate.handle(command, &self.services).await?;
        let mut aggregate = context.aggregate.clone();
        let loaded_version = context.current_sequence;

        let envelopes = store.commit_guarded(
            events,
            context,
            actor_metadata(request.actor, request.metadata),
            invariant,
        )?;

        let recorded_at = TimestampUtc::now();
        let mut events = Vec::with_capacity(envelopes.len());
        let mut audit = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            audit.push(AuditRecord::new(
                A::aggregate_type(),
                request.aggregate_id,
                envelope.sequence as u64,
                envelope.payload.event_type(),
                envelope.metadata,
                recorded_at,
            ));
            aggregate.apply(envelope.payload.clone());
            events.push(envelope.payload);
        }
        let version = audit.last().map(|r| r.sequence).unwrap_or(loaded_version);

        Ok(Committed {
            aggregate,
            version,
            events,
            audit,
        })
    }

    /// Dispatches what a commit owes. Failures are parked, never returned.
    async fn settle_effects(
        &self,
        aggregate_id: &str,
        intents: &[NotificationIntent],
        audit: Vec<AuditRecord>,
    ) {
        let effects = self.effects.effects_for(intents, audit);
        if effects.is_empty() {
            return;
        }
        let deferred = self.effects.dispatch(effects).await;
        if deferred > 0 {
            if let Some(logger) = &self.logger {
                logger.log_effects_deferred(aggregate_id, deferred);
            }
        }
    }
}

fn collaborator_error(err: CollaboratorError) -> CoreError {
    match err {
        CollaboratorError::Rejected(msg) => CoreError::validation(msg),
        CollaboratorError::Missing(msg) => CoreError::not_found("document", msg),
        CollaboratorError::Io(msg) => CoreError::transient(msg),
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
