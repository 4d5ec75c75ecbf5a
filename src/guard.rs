//! Pre-mutation veto for demonstration accounts.
//!
//! The service consults the guard before a mutating command reaches an
//! aggregate, so a vetoed call leaves no trace in the event log.

use crate::domain::errors::CoreError;
use crate::domain::permissions::Actor;
use serde::Serialize;
use std::collections::BTreeSet;

/// Mutating operations exposed by the workflow service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateCaseFile,
    UpdateDraft,
    RequestTransition,
    AssignOrganization,
    ReopenForReassignment,
    LinkWorkshopSession,
    CreateSession,
    RecordContractSignature,
    MarkActivityDone,
    RevertActivityDone,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateCaseFile => "create_case_file",
            Operation::UpdateDraft => "update_draft",
            Operation::RequestTransition => "request_transition",
            Operation::AssignOrganization => "assign_organization",
            Operation::ReopenForReassignment => "reopen_for_reassignment",
            Operation::LinkWorkshopSession => "link_workshop_session",
            Operation::CreateSession => "create_session",
            Operation::RecordContractSignature => "record_contract_signature",
            Operation::MarkActivityDone => "mark_activity_done",
            Operation::RevertActivityDone => "revert_activity_done",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether `actor` may run a mutating operation at all.
pub trait MutationGuard: Send + Sync {
    /// `Err(reason)` vetoes the call.
    fn check(&self, actor: &Actor, operation: Operation) -> Result<(), String>;
}

/// Converts a guard decision into the service error.
pub fn enforce(
    guard: &dyn MutationGuard,
    actor: &Actor,
    operation: Operation,
) -> Result<(), CoreError> {
    guard.check(actor, operation).map_err(|reason| {
        tracing::info!(actor = %actor.id(), %operation, %reason, "mutation vetoed");
        CoreError::Vetoed { reason }
    })
}

/// Lets everything through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl MutationGuard for AllowAll {
    fn check(&self, _actor: &Actor, _operation: Operation) -> Result<(), String> {
        Ok(())
    }
}

/// Blocks mutations by demonstration accounts on a production deployment.
#[derive(Debug, Clone, Default)]
pub struct DemoAccountGuard {
    production: bool,
    demo_actors: BTreeSet<String>,
}

impl DemoAccountGuard {
    pub fn new(production: bool, demo_actors: impl IntoIterator<Item = String>) -> Self {
        Self {
            production,
            demo_actors: demo_actors.into_iter().collect(),
        }
    }

    pub fn is_demo(&self, actor: &Actor) -> bool {
        self.demo_actors.contains(actor.id().as_str())
    }
}

impl MutationGuard for DemoAccountGuard {
    fn check(&self, actor: &Actor, operation: Operation) -> Result<(), String> {
        if self.production && self.is_demo(actor) {
            return Err(format!(
                "demonstration account {} cannot {} in production",
                actor.id(),
                operation
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permissions::Role;

    fn guard(production: bool) -> DemoAccountGuard {
        DemoAccountGuard::new(production, vec!["demo-admin".to_string()])
    }

    #[test]
    fn test_demo_actor_is_vetoed_in_production() {
        let actor = Actor::new("demo-admin", Role::Administrator);
        let err = enforce(&guard(true), &actor, Operation::RequestTransition).unwrap_err();

        assert!(matches!(err, CoreError::Vetoed { .. }));
        assert!(err.to_string().contains("request_transition"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_demo_actor_is_allowed_outside_production() {
        let actor = Actor::new("demo-admin", Role::Administrator);
        assert!(enforce(&guard(false), &actor, Operation::CreateSession).is_ok());
    }

    #[test]
    fn test_real_actor_is_allowed_in_production() {
        let actor = Actor::new("admin-1", Role::Administrator);
        assert!(enforce(&guard(true), &actor, Operation::CreateCaseFile).is_ok());
        assert!(enforce(&AllowAll, &actor, Operation::CreateCaseFile).is_ok());
    }
}
