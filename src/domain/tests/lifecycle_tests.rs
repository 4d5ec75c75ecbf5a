//! Tests for the lifecycle graph and transition policy.

use super::*;
use crate::domain::permissions::Role;
use proptest::prelude::*;
use proptest::sample::select;

#[test]
fn every_state_is_reachable_from_draft() {
    let reachable = reachable_from_draft();
    for state in LifecycleState::ALL {
        assert!(reachable.contains(&state), "{} unreachable", state);
    }
}

#[test]
fn evs_rejected_is_a_dead_end() {
    assert_eq!(outgoing(LifecycleState::EvsRejected).count(), 0);
    for target in LifecycleState::ALL {
        for role in Role::ALL {
            let err = authorize_transition(LifecycleState::EvsRejected, target, role).unwrap_err();
            assert!(matches!(err, CoreError::InvalidTransition { .. }));
        }
    }
}

#[test]
fn archived_is_terminal() {
    assert_eq!(outgoing(LifecycleState::Archived).count(), 0);
    assert!(LifecycleState::Archived.is_terminal());
    assert!(LifecycleState::Closed.is_terminal());
    assert!(!LifecycleState::Remaining30Paid.is_terminal());
}

#[test]
fn needs_info_loops_back_to_submitted() {
    let edge = find_edge(LifecycleState::NeedsInfo, LifecycleState::SubmittedToFeves).unwrap();
    assert_eq!(edge.capability, Capability::Submit);
}

#[test]
fn the_only_cycle_is_the_needs_info_loop() {
    let backwards: Vec<_> = EDGES
        .iter()
        .filter(|e| e.to <= e.from)
        .map(|e| (e.from, e.to))
        .collect();
    assert_eq!(
        backwards,
        vec![(LifecycleState::NeedsInfo, LifecycleState::SubmittedToFeves)]
    );
}

#[test]
fn each_edge_is_declared_once() {
    for (i, a) in EDGES.iter().enumerate() {
        for b in &EDGES[i + 1..] {
            assert!(!(a.from == b.from && a.to == b.to), "{} -> {}", a.from, a.to);
        }
    }
}

#[test]
fn each_milestone_is_stamped_by_exactly_one_edge() {
    for milestone in Milestone::ALL {
        let count = EDGES.iter().filter(|e| e.milestone == Some(milestone)).count();
        assert_eq!(count, 1, "{:?}", milestone);
    }
    assert_eq!(
        Milestone::AdvancePaymentSent.implied_by(),
        LifecycleState::Advance70Paid
    );
}

#[test]
fn partner_relations_closing_is_forbidden() {
    let err = authorize_transition(
        LifecycleState::Remaining30Paid,
        LifecycleState::Closed,
        Role::PartnerRelations,
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden { .. }));
}

#[test]
fn missing_edge_wins_over_missing_capability() {
    let err = authorize_transition(
        LifecycleState::Draft,
        LifecycleState::Closed,
        Role::PartnerRelations,
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));
}

#[test]
fn truth_table_matches_graph_and_matrix() {
    for from in LifecycleState::ALL {
        for to in LifecycleState::ALL {
            for role in Role::ALL {
                let expected = find_edge(from, to)
                    .map(|e| has_capability(role, e.capability))
                    .unwrap_or(false);
                let actual = authorize_transition(from, to, role).is_ok();
                assert_eq!(expected, actual, "{} -> {} as {}", from, to, role);
            }
        }
    }
}

#[test]
fn state_names_match_wire_format() {
    let json = serde_json::to_string(&LifecycleState::Advance70Paid).unwrap();
    assert_eq!(json, "\"ADVANCE_70_PAID\"");
    let json = serde_json::to_string(&LifecycleState::SubmittedToFeves).unwrap();
    assert_eq!(json, "\"SUBMITTED_TO_FEVES\"");
    for state in LifecycleState::ALL {
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, format!("\"{}\"", state.as_str()));
        assert_eq!(state.as_str().parse::<LifecycleState>().unwrap(), state);
    }
}

proptest! {
    #[test]
    fn authorization_errors_are_never_retryable(
        from in select(LifecycleState::ALL.to_vec()),
        to in select(LifecycleState::ALL.to_vec()),
        role in select(Role::ALL.to_vec()),
    ) {
        if let Err(err) = authorize_transition(from, to, role) {
            prop_assert!(!err.is_retryable());
            let is_policy_error = matches!(
                err,
                CoreError::InvalidTransition { .. } | CoreError::Forbidden { .. }
            );
            prop_assert!(is_policy_error);
        }
    }
}
