//! Case file lifecycle graph and transition policy.
//!
//! Every legal state change is one row of [`EDGES`]. Each row names the
//! single capability it requires, the milestone it stamps and who must be
//! notified. [`authorize_transition`] is the only place that decides whether
//! a `(current, requested, role)` triple is allowed.

use crate::domain::errors::CoreError;
use crate::domain::permissions::{has_capability, Capability, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::str::FromStr;

/// Lifecycle state of a case file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    #[default]
    Draft,
    SubmittedToFeves,
    AssignedEvs,
    EvsAccepted,
    EvsRejected,
    NeedsInfo,
    ContractSent,
    ContractSigned,
    #[serde(rename = "ADVANCE_70_PAID")]
    Advance70Paid,
    ActivityDone,
    FieldCheckScheduled,
    FieldCheckDone,
    FinalReportReceived,
    #[serde(rename = "REMAINING_30_PAID")]
    Remaining30Paid,
    Closed,
    Archived,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 16] = [
        LifecycleState::Draft,
        LifecycleState::SubmittedToFeves,
        LifecycleState::AssignedEvs,
        LifecycleState::EvsAccepted,
        LifecycleState::EvsRejected,
        LifecycleState::NeedsInfo,
        LifecycleState::ContractSent,
        LifecycleState::ContractSigned,
        LifecycleState::Advance70Paid,
        LifecycleState::ActivityDone,
        LifecycleState::FieldCheckScheduled,
        LifecycleState::FieldCheckDone,
        LifecycleState::FinalReportReceived,
        LifecycleState::Remaining30Paid,
        LifecycleState::Closed,
        LifecycleState::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Draft => "DRAFT",
            LifecycleState::SubmittedToFeves => "SUBMITTED_TO_FEVES",
            LifecycleState::AssignedEvs => "ASSIGNED_EVS",
            LifecycleState::EvsAccepted => "EVS_ACCEPTED",
            LifecycleState::EvsRejected => "EVS_REJECTED",
            LifecycleState::NeedsInfo => "NEEDS_INFO",
            LifecycleState::ContractSent => "CONTRACT_SENT",
            LifecycleState::ContractSigned => "CONTRACT_SIGNED",
            LifecycleState::Advance70Paid => "ADVANCE_70_PAID",
            LifecycleState::ActivityDone => "ACTIVITY_DONE",
            LifecycleState::FieldCheckScheduled => "FIELD_CHECK_SCHEDULED",
            LifecycleState::FieldCheckDone => "FIELD_CHECK_DONE",
            LifecycleState::FinalReportReceived => "FINAL_REPORT_RECEIVED",
            LifecycleState::Remaining30Paid => "REMAINING_30_PAID",
            LifecycleState::Closed => "CLOSED",
            LifecycleState::Archived => "ARCHIVED",
        }
    }

    /// Closed and archived files accept no further lifecycle work.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Closed | LifecycleState::Archived)
    }

    /// Files in these states may still have their descriptive data edited.
    pub fn is_editable(&self) -> bool {
        matches!(self, LifecycleState::Draft | LifecycleState::NeedsInfo)
    }
}

impl FromStr for LifecycleState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        LifecycleState::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| CoreError::validation(format!("unknown case file state '{}'", s)))
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress fact stamped on a case file by the edge entering its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    ContractSigned,
    AdvancePaymentSent,
    ActivityCompleted,
    FieldCheckCompleted,
    FinalReportSent,
    RemainingPaymentSent,
}

impl Milestone {
    pub const ALL: [Milestone; 6] = [
        Milestone::ContractSigned,
        Milestone::AdvancePaymentSent,
        Milestone::ActivityCompleted,
        Milestone::FieldCheckCompleted,
        Milestone::FinalReportSent,
        Milestone::RemainingPaymentSent,
    ];

    /// The state whose arrival sets this milestone.
    pub fn implied_by(&self) -> LifecycleState {
        EDGES
            .iter()
            .find(|edge| edge.milestone == Some(*self))
            .map(|edge| edge.to)
            .unwrap_or(LifecycleState::Archived)
    }
}

/// Party that must hear about a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// The coordinating body (FEVES).
    Coordinator,
    /// The actor who created the case file.
    Emitter,
    /// The field organization currently assigned.
    AssignedOrganization,
    /// The oversight body validating closures.
    OversightBody,
}

/// One legal state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub capability: Capability,
    pub milestone: Option<Milestone>,
    pub notify: &'static [Recipient],
}

const fn edge(
    from: LifecycleState,
    to: LifecycleState,
    capability: Capability,
    milestone: Option<Milestone>,
    notify: &'static [Recipient],
) -> Edge {
    Edge {
        from,
        to,
        capability,
        milestone,
        notify,
    }
}

use LifecycleState as S;
use Recipient as R;

/// The lifecycle graph. `EVS_REJECTED` has no outgoing edge.
pub const EDGES: &[Edge] = &[
    edge(S::Draft, S::SubmittedToFeves, Capability::Submit, None, &[R::Coordinator]),
    edge(S::NeedsInfo, S::SubmittedToFeves, Capability::Submit, None, &[R::Coordinator]),
    edge(
        S::SubmittedToFeves,
        S::AssignedEvs,
        Capability::Assign,
        None,
        &[R::AssignedOrganization],
    ),
    edge(
        S::AssignedEvs,
        S::EvsAccepted,
        Capability::RespondAssignment,
        None,
        &[R::Coordinator, R::Emitter],
    ),
    edge(
        S::AssignedEvs,
        S::EvsRejected,
        Capability::RespondAssignment,
        None,
        &[R::Coordinator, R::Emitter],
    ),
    edge(S::AssignedEvs, S::NeedsInfo, Capability::RespondAssignment, None, &[R::Emitter]),
    edge(
        S::EvsAccepted,
        S::ContractSent,
        Capability::SendContract,
        None,
        &[R::AssignedOrganization],
    ),
    edge(
        S::ContractSent,
        S::ContractSigned,
        Capability::SignContract,
        Some(Milestone::ContractSigned),
        &[R::Coordinator],
    ),
    edge(
        S::ContractSigned,
        S::Advance70Paid,
        Capability::RecordPayment,
        Some(Milestone::AdvancePaymentSent),
        &[R::AssignedOrganization],
    ),
    edge(
        S::Advance70Paid,
        S::ActivityDone,
        Capability::DeclareActivity,
        Some(Milestone::ActivityCompleted),
        &[R::Coordinator],
    ),
    edge(
        S::ActivityDone,
        S::FieldCheckScheduled,
        Capability::ScheduleFieldCheck,
        None,
        &[R::AssignedOrganization],
    ),
    edge(
        S::FieldCheckScheduled,
        S::FieldCheckDone,
        Capability::ValidateFieldCheck,
        Some(Milestone::FieldCheckCompleted),
        &[R::Coordinator],
    ),
    edge(
        S::FieldCheckDone,
        S::FinalReportReceived,
        Capability::SubmitFinalReport,
        Some(Milestone::FinalReportSent),
        &[R::Coordinator],
    ),
    edge(
        S::FinalReportReceived,
        S::Remaining30Paid,
        Capability::RecordPayment,
        Some(Milestone::RemainingPaymentSent),
        &[R::AssignedOrganization],
    ),
    edge(
        S::Remaining30Paid,
        S::Closed,
        Capability::OfficialValidation,
        None,
        &[R::Emitter, R::AssignedOrganization, R::OversightBody],
    ),
    edge(S::Closed, S::Archived, Capability::Archive, None, &[]),
];

/// Looks up the edge `from -> to`.
pub fn find_edge(from: LifecycleState, to: LifecycleState) -> Option<&'static Edge> {
    EDGES.iter().find(|e| e.from == from && e.to == to)
}

/// Edges leaving `from`.
pub fn outgoing(from: LifecycleState) -> impl Iterator<Item = &'static Edge> {
    EDGES.iter().filter(move |e| e.from == from)
}

/// Decides whether `role` may move a case file from `current` to `requested`.
///
/// Graph membership is checked before the capability, so a missing edge is
/// always `InvalidTransition` whatever the role.
pub fn authorize_transition(
    current: LifecycleState,
    requested: LifecycleState,
    role: Role,
) -> Result<&'static Edge, CoreError> {
    let edge = find_edge(current, requested).ok_or_else(|| {
        CoreError::invalid_transition(format!("{} -> {} is not allowed", current, requested))
    })?;

    if !has_capability(role, edge.capability) {
        return Err(CoreError::forbidden(format!(
            "role {} lacks capability {} required for {} -> {}",
            role, edge.capability, current, requested
        )));
    }

    Ok(edge)
}

/// States reachable from `DRAFT` following the graph.
pub fn reachable_from_draft() -> BTreeSet<LifecycleState> {
    let mut seen = BTreeSet::from([LifecycleState::Draft]);
    let mut queue = VecDeque::from([LifecycleState::Draft]);
    while let Some(state) = queue.pop_front() {
        for edge in outgoing(state) {
            if seen.insert(edge.to) {
                queue.push_back(edge.to);
            }
        }
    }
    seen
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
