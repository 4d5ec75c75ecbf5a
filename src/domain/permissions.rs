//! Permission matrix: which capabilities each role holds.
//!
//! The matrix is a static table consulted by a single authorization function.
//! Nothing outside this module decides what a role may do.
//!
//! View capabilities also scope *which* case files an actor sees; see
//! [`visibility_predicate`].

use crate::domain::errors::CoreError;
use crate::domain::types::{ActorId, OrganizationId, Territory};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Closed set of roles supplied by the authentication boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    ProjectOversight,
    Issuer,
    PartnerRelations,
    FieldOrganization,
    OversightBody,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Administrator,
        Role::ProjectOversight,
        Role::Issuer,
        Role::PartnerRelations,
        Role::FieldOrganization,
        Role::OversightBody,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::ProjectOversight => "project_oversight",
            Role::Issuer => "issuer",
            Role::PartnerRelations => "partner_relations",
            Role::FieldOrganization => "field_organization",
            Role::OversightBody => "oversight_body",
        }
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| CoreError::validation(format!("unknown role '{}'", s)))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic permission token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewAll,
    ViewOwn,
    ViewAssigned,
    ViewFiltered,
    Create,
    EditDraft,
    Submit,
    Assign,
    ReassignRejected,
    RespondAssignment,
    SendContract,
    SignContract,
    RecordPayment,
    DeclareActivity,
    ScheduleFieldCheck,
    ValidateFieldCheck,
    SubmitFinalReport,
    OfficialValidation,
    Archive,
    Upload,
    Export,
    ManageIdentities,
    ManageSessions,
    SignSessionContract,
    CorrectRecords,
}

impl Capability {
    pub const ALL: [Capability; 25] = [
        Capability::ViewAll,
        Capability::ViewOwn,
        Capability::ViewAssigned,
        Capability::ViewFiltered,
        Capability::Create,
        Capability::EditDraft,
        Capability::Submit,
        Capability::Assign,
        Capability::ReassignRejected,
        Capability::RespondAssignment,
        Capability::SendContract,
        Capability::SignContract,
        Capability::RecordPayment,
        Capability::DeclareActivity,
        Capability::ScheduleFieldCheck,
        Capability::ValidateFieldCheck,
        Capability::SubmitFinalReport,
        Capability::OfficialValidation,
        Capability::Archive,
        Capability::Upload,
        Capability::Export,
        Capability::ManageIdentities,
        Capability::ManageSessions,
        Capability::SignSessionContract,
        Capability::CorrectRecords,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ViewAll => "view_all",
            Capability::ViewOwn => "view_own",
            Capability::ViewAssigned => "view_assigned",
            Capability::ViewFiltered => "view_filtered",
            Capability::Create => "create",
            Capability::EditDraft => "edit_draft",
            Capability::Submit => "submit",
            Capability::Assign => "assign",
            Capability::ReassignRejected => "reassign_rejected",
            Capability::RespondAssignment => "respond_assignment",
            Capability::SendContract => "send_contract",
            Capability::SignContract => "sign_contract",
            Capability::RecordPayment => "record_payment",
            Capability::DeclareActivity => "declare_activity",
            Capability::ScheduleFieldCheck => "schedule_field_check",
            Capability::ValidateFieldCheck => "validate_field_check",
            Capability::SubmitFinalReport => "submit_final_report",
            Capability::OfficialValidation => "official_validation",
            Capability::Archive => "archive",
            Capability::Upload => "upload",
            Capability::Export => "export",
            Capability::ManageIdentities => "manage_identities",
            Capability::ManageSessions => "manage_sessions",
            Capability::SignSessionContract => "sign_session_contract",
            Capability::CorrectRecords => "correct_records",
        }
    }
}

impl FromStr for Capability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|cap| cap.as_str() == s)
            .ok_or_else(|| CoreError::validation(format!("unknown capability '{}'", s)))
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Matrix
// ============================================================================

const ADMINISTRATOR: &[Capability] = &Capability::ALL;

const PROJECT_OVERSIGHT: &[Capability] = &[
    Capability::ViewAll,
    Capability::Assign,
    Capability::ReassignRejected,
    Capability::SendContract,
    Capability::RecordPayment,
    Capability::ScheduleFieldCheck,
    Capability::ValidateFieldCheck,
    Capability::Archive,
    Capability::Upload,
    Capability::Export,
    Capability::ManageSessions,
];

const ISSUER: &[Capability] = &[
    Capability::ViewOwn,
    Capability::Create,
    Capability::EditDraft,
    Capability::Submit,
    Capability::Upload,
];

const PARTNER_RELATIONS: &[Capability] = &[
    Capability::ViewFiltered,
    Capability::ScheduleFieldCheck,
    Capability::ValidateFieldCheck,
    Capability::Export,
];

const FIELD_ORGANIZATION: &[Capability] = &[
    Capability::ViewAssigned,
    Capability::RespondAssignment,
    Capability::SignContract,
    Capability::DeclareActivity,
    Capability::SubmitFinalReport,
    Capability::Upload,
    Capability::SignSessionContract,
];

const OVERSIGHT_BODY: &[Capability] = &[
    Capability::ViewAll,
    Capability::OfficialValidation,
    Capability::Export,
];

/// Returns the capability set granted to `role`.
pub fn capabilities(role: Role) -> &'static [Capability] {
    match role {
        Role::Administrator => ADMINISTRATOR,
        Role::ProjectOversight => PROJECT_OVERSIGHT,
        Role::Issuer => ISSUER,
        Role::PartnerRelations => PARTNER_RELATIONS,
        Role::FieldOrganization => FIELD_ORGANIZATION,
        Role::OversightBody => OVERSIGHT_BODY,
    }
}

/// Pure, total lookup in the permission matrix.
pub fn has_capability(role: Role, capability: Capability) -> bool {
    capabilities(role).contains(&capability)
}

/// String form of [`has_capability`]: unknown roles or tokens are `false`.
pub fn has_capability_token(role: &str, token: &str) -> bool {
    match (role.parse::<Role>(), token.parse::<Capability>()) {
        (Ok(role), Ok(capability)) => has_capability(role, capability),
        _ => false,
    }
}

// ============================================================================
// Actors and visibility
// ============================================================================

/// What the authentication boundary knows about the actor beyond its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: ActorId,
    /// Organization the actor works for (field organizations).
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
    /// Territories covered by a partner-relations actor.
    #[serde(default)]
    pub territories: Vec<Territory>,
}

/// Authenticated caller of a core operation. The core trusts this pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: Role,
    #[serde(flatten)]
    pub context: ActorContext,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, role: Role) -> Self {
        Self {
            role,
            context: ActorContext {
                actor_id: id.into(),
                organization_id: None,
                territories: Vec::new(),
            },
        }
    }

    pub fn with_organization(mut self, organization_id: impl Into<OrganizationId>) -> Self {
        self.context.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_territory(mut self, territory: impl Into<Territory>) -> Self {
        self.context.territories.push(territory.into());
        self
    }

    pub fn id(&self) -> &ActorId {
        &self.context.actor_id
    }

    pub fn can(&self, capability: Capability) -> bool {
        has_capability(self.role, capability)
    }

    /// Fails with `Forbidden` unless the actor's role holds `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), CoreError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(CoreError::forbidden(format!(
                "role {} lacks capability {}",
                self.role, capability
            )))
        }
    }
}

/// Fields of a record that view scopes filter on.
pub trait ScopedRecord {
    fn emitter_id(&self) -> &ActorId;
    fn assigned_organization_id(&self) -> Option<&OrganizationId>;
    fn territory(&self) -> Option<&Territory>;
}

/// Which case files a view capability reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewScope {
    All,
    Own,
    Assigned,
    Filtered,
}

/// View scopes granted to `role`, widest first.
pub fn view_scopes(role: Role) -> Vec<ViewScope> {
    [
        (Capability::ViewAll, ViewScope::All),
        (Capability::ViewOwn, ViewScope::Own),
        (Capability::ViewAssigned, ViewScope::Assigned),
        (Capability::ViewFiltered, ViewScope::Filtered),
    ]
    .into_iter()
    .filter(|(cap, _)| has_capability(role, *cap))
    .map(|(_, scope)| scope)
    .collect()
}

/// Builds the filter listing operations apply to case files.
///
/// A role holding several view capabilities sees the union of their scopes.
pub fn visibility_predicate<'a, T: ScopedRecord>(
    role: Role,
    context: &'a ActorContext,
) -> impl Fn(&T) -> bool + 'a {
    let scopes = view_scopes(role);
    move |record: &T| {
        scopes.iter().any(|scope| match scope {
            ViewScope::All => true,
            ViewScope::Own => record.emitter_id() == &context.actor_id,
            ViewScope::Assigned => match (
                record.assigned_organization_id(),
                context.organization_id.as_ref(),
            ) {
                (Some(assigned), Some(own)) => assigned == own,
                _ => false,
            },
            ViewScope::Filtered => record
                .territory()
                .is_some_and(|territory| context.territories.contains(territory)),
        })
    }
}

#[cfg(test)]
#[path = "tests/permissions_tests.rs"]
mod tests;
