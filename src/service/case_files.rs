//! Case file operations of the workflow service.

use super::{Committed, Request, WorkflowService};
use crate::domain::audit::AuditRecord;
use crate::domain::errors::CoreError;
use crate::domain::intents::case_file_intents;
use crate::domain::lifecycle::LifecycleState;
use crate::domain::permissions::{visibility_predicate, Actor};
use crate::domain::types::{CaseFileId, OrganizationId, ReferenceCode, SessionId, TimestampUtc};
use crate::domain::{
    CaseFile, CaseFileAggregate, CaseFileCommand, CaseFileDraft, CaseFileView, DraftChanges,
    TransitionOutcome, WorkshopSession,
};
use crate::guard::Operation;
use cqrs_es::EventStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Attempts at drawing a reference code not already in use.
const REFERENCE_ATTEMPTS: usize = 8;

/// Target state of a lifecycle move, with optional audit metadata and the
/// version the caller last saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub to: LifecycleState,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl TransitionRequest {
    pub fn to(to: LifecycleState) -> Self {
        Self {
            to,
            ..Self::default()
        }
    }

    pub fn expecting(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

fn check_version(expected: Option<u64>, actual: u64) -> Result<(), CoreError> {
    match expected {
        Some(expected) if expected != actual => Err(CoreError::Conflict {
            message: format!(
                "case file is at version {}, request expected {}",
                actual, expected
            ),
        }),
        _ => Ok(()),
    }
}

fn is_visible(actor: &Actor, file: &CaseFile) -> bool {
    visibility_predicate::<CaseFile>(actor.role, &actor.context)(file)
}

/// The file must exist, be visible to `actor` and match `expected_version`.
fn visible_at<'a>(
    actor: &'a Actor,
    id: &'a CaseFileId,
    expected_version: Option<u64>,
) -> impl FnOnce(&CaseFileAggregate, u64) -> Result<(), CoreError> + 'a {
    move |aggregate, version| {
        match aggregate.case_file() {
            Some(file) if is_visible(actor, file) => {}
            _ => return Err(CoreError::not_found("case_file", id)),
        }
        check_version(expected_version, version)
    }
}

/// No other case file in `files` already uses `reference`.
pub(super) fn reference_free(
    files: &BTreeMap<String, (u64, CaseFileAggregate)>,
    reference: &ReferenceCode,
) -> Result<(), CoreError> {
    let taken = files
        .values()
        .filter_map(|(_, aggregate)| aggregate.case_file())
        .any(|file| file.reference() == reference);
    if taken {
        return Err(CoreError::Conflict {
            message: format!("reference code {} is already in use", reference),
        });
    }
    Ok(())
}

/// `session` keeps a seat for `aggregate_id` once every file linked to it
/// other than `aggregate_id` itself is counted.
fn seat_available(
    files: &BTreeMap<String, (u64, CaseFileAggregate)>,
    aggregate_id: &str,
    session_id: &SessionId,
    session: &WorkshopSession,
) -> Result<(), CoreError> {
    let taken = files
        .iter()
        .filter(|(id, _)| id.as_str() != aggregate_id)
        .filter_map(|(_, (_, aggregate))| aggregate.case_file())
        .filter(|file| file.workshop_session_id() == Some(*session_id))
        .count() as u64;
    if taken >= u64::from(session.max_capacity()) {
        return Err(CoreError::validation(format!(
            "workshop session '{}' is full ({} of {} seats taken)",
            session.label(),
            taken,
            session.max_capacity()
        )));
    }
    Ok(())
}

impl WorkflowService {
    /// Opens a new case file in `DRAFT` with a fresh reference code.
    pub async fn create_case_file(
        &self,
        actor: &Actor,
        draft: CaseFileDraft,
    ) -> Result<TransitionOutcome, CoreError> {
        let taken: BTreeSet<ReferenceCode> = self
            .case_files
            .replay_all()?
            .values()
            .filter_map(|(_, aggregate)| aggregate.case_file())
            .map(|file| file.reference().clone())
            .collect();

        let now = TimestampUtc::now();
        let (id, reference) = (0..REFERENCE_ATTEMPTS)
            .map(|_| {
                let id = CaseFileId::new();
                let reference = ReferenceCode::generate(&id, &now);
                (id, reference)
            })
            .find(|(_, reference)| !taken.contains(reference))
            .ok_or_else(|| CoreError::Conflict {
                message: "could not allocate a unique reference code".to_string(),
            })?;

        let aggregate_id = id.to_string();
        let unique = reference.clone();
        let committed = self
            .execute_guarded(
                &self.case_files,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::CreateCaseFile,
                    actor,
                    metadata: &HashMap::new(),
                },
                CaseFileCommand::Create {
                    actor: actor.clone(),
                    reference,
                    draft,
                },
                |_, _| Ok(()),
                |files| reference_free(files, &unique),
            )
            .await?;
        self.finish_case_file(id, committed).await
    }

    /// Edits an editable case file.
    pub async fn update_draft(
        &self,
        actor: &Actor,
        id: &CaseFileId,
        changes: DraftChanges,
        expected_version: Option<u64>,
    ) -> Result<TransitionOutcome, CoreError> {
        let aggregate_id = id.to_string();
        let committed = self
            .execute(
                &self.case_files,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::UpdateDraft,
                    actor,
                    metadata: &HashMap::new(),
                },
                CaseFileCommand::UpdateDraft {
                    actor: actor.clone(),
                    changes,
                },
                visible_at(actor, id, expected_version),
            )
            .await?;
        self.finish_case_file(*id, committed).await
    }

    /// Moves a case file along one edge of the lifecycle graph.
    pub async fn request_transition(
        &self,
        actor: &Actor,
        id: &CaseFileId,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, CoreError> {
        let aggregate_id = id.to_string();
        let committed = self
            .execute(
                &self.case_files,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::RequestTransition,
                    actor,
                    metadata: &request.metadata,
                },
                CaseFileCommand::RequestTransition {
                    actor: actor.clone(),
                    to: request.to,
                },
                visible_at(actor, id, request.expected_version),
            )
            .await?;
        self.finish_case_file(*id, committed).await
    }

    /// Records the field organization and enters `ASSIGNED_EVS` in one commit.
    pub async fn assign_organization(
        &self,
        actor: &Actor,
        id: &CaseFileId,
        organization_id: OrganizationId,
        expected_version: Option<u64>,
    ) -> Result<TransitionOutcome, CoreError> {
        let aggregate_id = id.to_string();
        let committed = self
            .execute(
                &self.case_files,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::AssignOrganization,
                    actor,
                    metadata: &HashMap::new(),
                },
                CaseFileCommand::AssignOrganization {
                    actor: actor.clone(),
                    organization_id,
                },
                visible_at(actor, id, expected_version),
            )
            .await?;
        self.finish_case_file(*id, committed).await
    }

    /// Returns an `EVS_REJECTED` file to the coordinator for a new assignment.
    pub async fn reopen_for_reassignment(
        &self,
        actor: &Actor,
        id: &CaseFileId,
    ) -> Result<TransitionOutcome, CoreError> {
        let aggregate_id = id.to_string();
        let committed = self
            .execute(
                &self.case_files,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::ReopenForReassignment,
                    actor,
                    metadata: &HashMap::new(),
                },
                CaseFileCommand::ReopenForReassignment {
                    actor: actor.clone(),
                },
                visible_at(actor, id, None),
            )
            .await?;
        self.finish_case_file(*id, committed).await
    }

    /// Points a case file at a workshop session that still has a free seat.
    pub async fn link_workshop_session(
        &self,
        actor: &Actor,
        id: &CaseFileId,
        session_id: &SessionId,
    ) -> Result<TransitionOutcome, CoreError> {
        let session = self
            .sessions
            .load_aggregate(&session_id.to_string())
            .await?
            .aggregate;

        let aggregate_id = id.to_string();
        let visible = visible_at(actor, id, None);
        let committed = self
            .execute_guarded(
                &self.case_files,
                Request {
                    aggregate_id: &aggregate_id,
                    operation: Operation::LinkWorkshopSession,
                    actor,
                    metadata: &HashMap::new(),
                },
                CaseFileCommand::LinkWorkshopSession {
                    actor: actor.clone(),
                    session_id: *session_id,
                },
                |aggregate: &CaseFileAggregate, version| {
                    visible(aggregate, version)?;
                    match session.session() {
                        Some(_) => Ok(()),
                        None => Err(CoreError::not_found("workshop_session", session_id)),
                    }
                },
                |files| match session.session() {
                    Some(session) => seat_available(files, &aggregate_id, session_id, session),
                    None => Ok(()),
                },
            )
            .await?;
        self.finish_case_file(*id, committed).await
    }

    /// Reads one case file.
    pub async fn get_case_file(
        &self,
        actor: &Actor,
        id: &CaseFileId,
    ) -> Result<CaseFileView, CoreError> {
        let context = self.case_files.load_aggregate(&id.to_string()).await?;
        match context.aggregate.case_file() {
            Some(file) if is_visible(actor, file) => Ok(CaseFileView {
                id: *id,
                version: context.current_sequence,
                case_file: file.clone(),
            }),
            _ => Err(CoreError::not_found("case_file", id)),
        }
    }

    /// Looks a case file up by its reference code.
    pub async fn find_by_reference(
        &self,
        actor: &Actor,
        reference: &ReferenceCode,
    ) -> Result<CaseFileView, CoreError> {
        self.list_case_files(actor, None)?
            .into_iter()
            .find(|view| view.case_file.reference() == reference)
            .ok_or_else(|| CoreError::not_found("case_file", reference))
    }

    /// Case files visible to `actor`, oldest first, optionally in one state.
    pub fn list_case_files(
        &self,
        actor: &Actor,
        state: Option<LifecycleState>,
    ) -> Result<Vec<CaseFileView>, CoreError> {
        let visible = visibility_predicate::<CaseFile>(actor.role, &actor.context);
        let mut views: Vec<CaseFileView> = Vec::new();
        for (aggregate_id, (version, aggregate)) in self.case_files.replay_all()? {
            let Some(file) = aggregate.case_file() else {
                continue;
            };
            if !visible(file) || state.is_some_and(|s| s != file.state()) {
                continue;
            }
            let id = CaseFileId::from_string(&aggregate_id)
                .map_err(|e| CoreError::transient(format!("corrupt case file id: {}", e)))?;
            views.push(CaseFileView {
                id,
                version,
                case_file: file.clone(),
            });
        }
        views.sort_by_key(|view| *view.case_file.created_at());
        Ok(views)
    }

    /// Audit trail of a case file visible to `actor`.
    pub async fn case_file_audit(
        &self,
        actor: &Actor,
        id: &CaseFileId,
    ) -> Result<Vec<AuditRecord>, CoreError> {
        self.get_case_file(actor, id).await?;
        Ok(self.case_files.audit_trail(&id.to_string())?)
    }

    /// Number of case files linked to `session_id`, from one read of the log.
    pub fn participant_count(&self, session_id: &SessionId) -> Result<u32, CoreError> {
        Ok(self.participant_counts()?.get(session_id).copied().unwrap_or(0))
    }

    pub(super) fn participant_counts(&self) -> Result<HashMap<SessionId, u32>, CoreError> {
        let mut counts = HashMap::new();
        for (_, aggregate) in self.case_files.replay_all()?.values() {
            if let Some(session_id) = aggregate.case_file().and_then(|f| f.workshop_session_id()) {
                *counts.entry(session_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn finish_case_file(
        &self,
        id: CaseFileId,
        committed: Committed<CaseFileAggregate>,
    ) -> Result<TransitionOutcome, CoreError> {
        let Committed {
            aggregate,
            version,
            events,
            audit,
        } = committed;
        let file = aggregate
            .case_file()
            .cloned()
            .ok_or_else(|| CoreError::not_found("case_file", id))?;
        let intents = case_file_intents(&id, &file, &events);
        self.settle_effects(&id.to_string(), &intents, audit).await;

        Ok(TransitionOutcome {
            case_file: CaseFileView {
                id,
                version,
                case_file: file,
            },
            intents,
        })
    }
}
