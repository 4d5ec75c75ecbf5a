//! Unit tests for CaseFileAggregate command handling and event application.

use super::*;
use crate::domain::lifecycle::{find_edge, EDGES};
use crate::domain::permissions::{capabilities, has_capability, Actor, Role};
use crate::domain::types::TimestampUtc;
use cqrs_es::Aggregate;
use std::collections::BTreeSet;

/// Create default services for testing.
fn test_services() -> DomainServices {
    DomainServices::default()
}

fn issuer() -> Actor {
    Actor::new("issuer-1", Role::Issuer)
}

fn oversight() -> Actor {
    Actor::new("po-1", Role::ProjectOversight)
}

fn evs() -> Actor {
    Actor::new("evs-user", Role::FieldOrganization).with_organization("evs-1")
}

fn created_event() -> CaseFileEvent {
    CaseFileEvent::CaseFileCreated {
        reference: "FEVES-2026-ABCDEF".parse().unwrap(),
        emitter_id: "issuer-1".into(),
        territory: Some("59".into()),
        payload: serde_json::json!({"family": "Martin", "children": 2}),
        total_amount: Amount(120_000),
        created_at: TimestampUtc::now(),
    }
}

/// Apply CaseFileCreated to get an aggregate in DRAFT.
fn created() -> CaseFileAggregate {
    let mut agg = CaseFileAggregate::default();
    agg.apply(created_event());
    agg
}

/// Force an aggregate into `state` with organization `evs-1` already recorded.
fn aggregate_in(state: LifecycleState) -> CaseFileAggregate {
    let mut agg = created();
    agg.apply(CaseFileEvent::OrganizationAssigned {
        organization_id: "evs-1".into(),
        assigned_by: "setup".into(),
        assigned_at: TimestampUtc::now(),
    });
    if state != LifecycleState::Draft {
        agg.apply(CaseFileEvent::StateChanged {
            from: LifecycleState::Draft,
            to: state,
            actor_id: "setup".into(),
            milestone: None,
            changed_at: TimestampUtc::now(),
        });
    }
    agg
}

/// Handle a command and apply the resulting events.
async fn execute(
    agg: &mut CaseFileAggregate,
    command: CaseFileCommand,
) -> Result<Vec<CaseFileEvent>, CoreError> {
    let events = agg.handle(command, &test_services()).await?;
    for event in events.clone() {
        agg.apply(event);
    }
    Ok(events)
}

fn transition(actor: Actor, to: LifecycleState) -> CaseFileCommand {
    CaseFileCommand::RequestTransition { actor, to }
}

fn file(agg: &CaseFileAggregate) -> &CaseFile {
    agg.case_file().expect("case file should exist")
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn create_by_issuer_opens_draft() {
    let mut agg = CaseFileAggregate::default();
    let events = execute(
        &mut agg,
        CaseFileCommand::Create {
            actor: issuer(),
            reference: "FEVES-2026-000001".parse().unwrap(),
            draft: CaseFileDraft::default(),
        },
    )
    .await
    .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(file(&agg).state(), LifecycleState::Draft);
    assert_eq!(file(&agg).emitter_id().as_str(), "issuer-1");
    assert_eq!(file(&agg).assigned_organization_id(), None);
}

#[tokio::test]
async fn create_by_field_organization_is_forbidden() {
    let agg = CaseFileAggregate::default();
    let result = agg
        .handle(
            CaseFileCommand::Create {
                actor: evs(),
                reference: "FEVES-2026-000001".parse().unwrap(),
                draft: CaseFileDraft::default(),
            },
            &test_services(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::Forbidden { .. })));
}

#[tokio::test]
async fn create_on_existing_case_file_fails() {
    let agg = created();
    let result = agg
        .handle(
            CaseFileCommand::Create {
                actor: issuer(),
                reference: "FEVES-2026-000002".parse().unwrap(),
                draft: CaseFileDraft::default(),
            },
            &test_services(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::ValidationError { .. })));
}

#[tokio::test]
async fn commands_on_uninitialized_aggregate_are_not_found() {
    let agg = CaseFileAggregate::default();
    let result = agg
        .handle(
            transition(issuer(), LifecycleState::SubmittedToFeves),
            &test_services(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::NotFound { .. })));
}

// ============================================================================
// Transitions
// ============================================================================

#[tokio::test]
async fn full_lifecycle_stamps_milestones_in_order() {
    let mut agg = created();
    execute(&mut agg, transition(issuer(), LifecycleState::SubmittedToFeves))
        .await
        .unwrap();
    execute(
        &mut agg,
        CaseFileCommand::AssignOrganization {
            actor: oversight(),
            organization_id: "evs-1".into(),
        },
    )
    .await
    .unwrap();

    let path = [
        (evs(), LifecycleState::EvsAccepted),
        (oversight(), LifecycleState::ContractSent),
        (evs(), LifecycleState::ContractSigned),
        (oversight(), LifecycleState::Advance70Paid),
        (evs(), LifecycleState::ActivityDone),
        (Actor::new("pr-1", Role::PartnerRelations), LifecycleState::FieldCheckScheduled),
        (Actor::new("pr-1", Role::PartnerRelations), LifecycleState::FieldCheckDone),
        (evs(), LifecycleState::FinalReportReceived),
        (oversight(), LifecycleState::Remaining30Paid),
        (Actor::new("cd-1", Role::OversightBody), LifecycleState::Closed),
        (oversight(), LifecycleState::Archived),
    ];

    let mut reached = BTreeSet::from([
        LifecycleState::Draft,
        LifecycleState::SubmittedToFeves,
        LifecycleState::AssignedEvs,
    ]);
    for (actor, to) in path {
        execute(&mut agg, transition(actor, to)).await.unwrap();
        reached.insert(to);

        for milestone in Milestone::ALL {
            assert_eq!(
                file(&agg).milestones().is_set(milestone),
                reached.contains(&milestone.implied_by()),
                "{:?} after entering {}",
                milestone,
                to
            );
        }
    }

    assert_eq!(file(&agg).state(), LifecycleState::Archived);
    let stamp = file(&agg).milestones().contract_signed.as_ref().unwrap();
    assert_eq!(stamp.actor_id.as_str(), "evs-user");
}

#[tokio::test]
async fn missing_edge_is_invalid_transition() {
    let agg = created();
    let result = agg
        .handle(transition(issuer(), LifecycleState::Closed), &test_services())
        .await;

    assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
}

#[tokio::test]
async fn partner_relations_cannot_close() {
    let agg = aggregate_in(LifecycleState::Remaining30Paid);
    let result = agg
        .handle(
            transition(
                Actor::new("pr-1", Role::PartnerRelations),
                LifecycleState::Closed,
            ),
            &test_services(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::Forbidden { .. })));
}

#[tokio::test]
async fn first_assignment_cannot_go_through_request_transition() {
    let mut agg = created();
    execute(&mut agg, transition(issuer(), LifecycleState::SubmittedToFeves))
        .await
        .unwrap();

    let result = agg
        .handle(
            transition(oversight(), LifecycleState::AssignedEvs),
            &test_services(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::ValidationError { .. })));
}

#[tokio::test]
async fn transition_table_matches_graph_for_every_role() {
    for from in LifecycleState::ALL {
        for to in LifecycleState::ALL {
            for role in Role::ALL {
                let agg = aggregate_in(from);
                let actor = Actor::new("someone", role).with_organization("evs-1");
                let expected = find_edge(from, to)
                    .map(|edge| has_capability(role, edge.capability))
                    .unwrap_or(false);

                let result = agg.handle(transition(actor, to), &test_services()).await;

                assert_eq!(result.is_ok(), expected, "{} -> {} as {}", from, to, role);
            }
        }
    }
}

#[test]
fn every_edge_is_reachable_by_some_non_admin_role() {
    for edge in EDGES {
        let holders: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|r| *r != Role::Administrator && capabilities(*r).contains(&edge.capability))
            .collect();
        assert!(!holders.is_empty(), "{} -> {}", edge.from, edge.to);
    }
}

// ============================================================================
// Assignment
// ============================================================================

#[tokio::test]
async fn assign_organization_commits_assignment_and_transition_together() {
    let mut agg = created();
    execute(&mut agg, transition(issuer(), LifecycleState::SubmittedToFeves))
        .await
        .unwrap();

    let events = execute(
        &mut agg,
        CaseFileCommand::AssignOrganization {
            actor: oversight(),
            organization_id: "evs-7".into(),
        },
    )
    .await
    .unwrap();

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], CaseFileEvent::OrganizationAssigned { .. }));
    assert!(matches!(
        events[1],
        CaseFileEvent::StateChanged {
            from: LifecycleState::SubmittedToFeves,
            to: LifecycleState::AssignedEvs,
            ..
        }
    ));
    assert_eq!(file(&agg).assigned_organization_id().unwrap().as_str(), "evs-7");
}

#[tokio::test]
async fn assign_outside_submitted_is_invalid() {
    let agg = created();
    let result = agg
        .handle(
            CaseFileCommand::AssignOrganization {
                actor: oversight(),
                organization_id: "evs-1".into(),
            },
            &test_services(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
}

#[tokio::test]
async fn assign_by_issuer_is_forbidden() {
    let agg = aggregate_in(LifecycleState::SubmittedToFeves);
    let result = agg
        .handle(
            CaseFileCommand::AssignOrganization {
                actor: issuer(),
                organization_id: "evs-1".into(),
            },
            &test_services(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::Forbidden { .. })));
}

#[tokio::test]
async fn needs_info_round_trip_keeps_assigned_organization() {
    let mut agg = created();
    execute(&mut agg, transition(issuer(), LifecycleState::SubmittedToFeves))
        .await
        .unwrap();
    execute(
        &mut agg,
        CaseFileCommand::AssignOrganization {
            actor: oversight(),
            organization_id: "evs-1".into(),
        },
    )
    .await
    .unwrap();
    execute(&mut agg, transition(evs(), LifecycleState::NeedsInfo))
        .await
        .unwrap();
    execute(&mut agg, transition(issuer(), LifecycleState::SubmittedToFeves))
        .await
        .unwrap();
    execute(&mut agg, transition(oversight(), LifecycleState::AssignedEvs))
        .await
        .unwrap();

    assert_eq!(file(&agg).state(), LifecycleState::AssignedEvs);
    assert_eq!(file(&agg).assigned_organization_id().unwrap().as_str(), "evs-1");
}

// ============================================================================
// Rejection and reassignment
// ============================================================================

#[tokio::test]
async fn rejected_file_needs_explicit_reopen() {
    let mut agg = aggregate_in(LifecycleState::AssignedEvs);
    execute(&mut agg, transition(evs(), LifecycleState::EvsRejected))
        .await
        .unwrap();

    for to in LifecycleState::ALL {
        let result = agg
            .handle(transition(Actor::new("admin", Role::Administrator), to), &test_services())
            .await;
        assert!(matches!(result, Err(CoreError::InvalidTransition { .. })), "{}", to);
    }

    let events = execute(&mut agg, CaseFileCommand::ReopenForReassignment { actor: oversight() })
        .await
        .unwrap();

    assert!(matches!(
        &events[0],
        CaseFileEvent::ReopenedForReassignment { previous_organization_id: Some(org), .. }
            if org.as_str() == "evs-1"
    ));
    assert_eq!(file(&agg).state(), LifecycleState::SubmittedToFeves);
    assert_eq!(file(&agg).assigned_organization_id(), None);

    execute(
        &mut agg,
        CaseFileCommand::AssignOrganization {
            actor: oversight(),
            organization_id: "evs-2".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(file(&agg).state(), LifecycleState::AssignedEvs);
}

#[tokio::test]
async fn reopen_requires_rejected_state_and_capability() {
    let agg = aggregate_in(LifecycleState::AssignedEvs);
    let result = agg
        .handle(
            CaseFileCommand::ReopenForReassignment { actor: oversight() },
            &test_services(),
        )
        .await;
    assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));

    let agg = aggregate_in(LifecycleState::EvsRejected);
    let result = agg
        .handle(
            CaseFileCommand::ReopenForReassignment { actor: issuer() },
            &test_services(),
        )
        .await;
    assert!(matches!(result, Err(CoreError::Forbidden { .. })));
}

// ============================================================================
// Draft edits and session links
// ============================================================================

#[tokio::test]
async fn emitter_edits_draft() {
    let mut agg = created();
    execute(
        &mut agg,
        CaseFileCommand::UpdateDraft {
            actor: issuer(),
            changes: DraftChanges {
                total_amount: Some(Amount(99_000)),
                ..DraftChanges::default()
            },
        },
    )
    .await
    .unwrap();

    assert_eq!(file(&agg).total_amount(), Amount(99_000));
    assert_eq!(file(&agg).territory().unwrap().as_str(), "59");
}

#[tokio::test]
async fn other_issuer_cannot_edit() {
    let agg = created();
    let result = agg
        .handle(
            CaseFileCommand::UpdateDraft {
                actor: Actor::new("issuer-2", Role::Issuer),
                changes: DraftChanges {
                    payload: Some(serde_json::json!({})),
                    ..DraftChanges::default()
                },
            },
            &test_services(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::Forbidden { .. })));
}

#[tokio::test]
async fn edits_are_rejected_after_submission_and_when_empty() {
    let agg = aggregate_in(LifecycleState::ContractSent);
    let result = agg
        .handle(
            CaseFileCommand::UpdateDraft {
                actor: issuer(),
                changes: DraftChanges {
                    total_amount: Some(Amount(1)),
                    ..DraftChanges::default()
                },
            },
            &test_services(),
        )
        .await;
    assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));

    let agg = created();
    let result = agg
        .handle(
            CaseFileCommand::UpdateDraft {
                actor: issuer(),
                changes: DraftChanges::default(),
            },
            &test_services(),
        )
        .await;
    assert!(matches!(result, Err(CoreError::ValidationError { .. })));
}

#[tokio::test]
async fn linking_same_session_twice_is_a_no_op() {
    let mut agg = aggregate_in(LifecycleState::EvsAccepted);
    let session_id = SessionId::new();
    let link = CaseFileCommand::LinkWorkshopSession {
        actor: oversight(),
        session_id,
    };

    assert_eq!(execute(&mut agg, link.clone()).await.unwrap().len(), 1);
    assert_eq!(file(&agg).workshop_session_id(), Some(session_id));
    assert!(execute(&mut agg, link).await.unwrap().is_empty());
}

#[tokio::test]
async fn closed_files_cannot_join_sessions() {
    let agg = aggregate_in(LifecycleState::Closed);
    let result = agg
        .handle(
            CaseFileCommand::LinkWorkshopSession {
                actor: oversight(),
                session_id: SessionId::new(),
            },
            &test_services(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
}
