//! Tests for the permission matrix and visibility scopes.

use super::*;

struct Record {
    emitter: ActorId,
    assigned: Option<OrganizationId>,
    territory: Option<Territory>,
}

impl ScopedRecord for Record {
    fn emitter_id(&self) -> &ActorId {
        &self.emitter
    }

    fn assigned_organization_id(&self) -> Option<&OrganizationId> {
        self.assigned.as_ref()
    }

    fn territory(&self) -> Option<&Territory> {
        self.territory.as_ref()
    }
}

fn record(emitter: &str, assigned: Option<&str>, territory: Option<&str>) -> Record {
    Record {
        emitter: emitter.into(),
        assigned: assigned.map(OrganizationId::from),
        territory: territory.map(Territory::from),
    }
}

#[test]
fn administrator_holds_every_capability() {
    for cap in Capability::ALL {
        assert!(has_capability(Role::Administrator, cap), "{}", cap);
    }
}

#[test]
fn partner_relations_cannot_close() {
    assert!(!has_capability(
        Role::PartnerRelations,
        Capability::OfficialValidation
    ));
    assert!(has_capability(Role::OversightBody, Capability::OfficialValidation));
}

#[test]
fn only_issuers_and_admins_create() {
    let creators: Vec<Role> = Role::ALL
        .into_iter()
        .filter(|r| has_capability(*r, Capability::Create))
        .collect();
    assert_eq!(creators, vec![Role::Administrator, Role::Issuer]);
}

#[test]
fn token_lookup_is_total() {
    assert!(has_capability_token("oversight_body", "official_validation"));
    assert!(!has_capability_token("partner_relations", "official_validation"));
    assert!(!has_capability_token("janitor", "official_validation"));
    assert!(!has_capability_token("administrator", "launch_rockets"));
    assert!(!has_capability_token("", ""));
}

#[test]
fn role_and_capability_names_round_trip() {
    for role in Role::ALL {
        assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
    }
    for cap in Capability::ALL {
        assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
    }
}

#[test]
fn require_reports_role_and_capability() {
    let actor = Actor::new("pr-1", Role::PartnerRelations);
    let err = actor.require(Capability::OfficialValidation).unwrap_err();
    assert_eq!(
        err,
        CoreError::forbidden("role partner_relations lacks capability official_validation")
    );
}

#[test]
fn issuer_sees_only_own_files() {
    let actor = Actor::new("issuer-1", Role::Issuer);
    let visible = visibility_predicate(actor.role, &actor.context);

    assert!(visible(&record("issuer-1", None, None)));
    assert!(!visible(&record("issuer-2", Some("evs-1"), Some("59"))));
}

#[test]
fn field_organization_sees_only_assigned_files() {
    let actor = Actor::new("evs-user", Role::FieldOrganization).with_organization("evs-1");
    let visible = visibility_predicate(actor.role, &actor.context);

    assert!(visible(&record("issuer-1", Some("evs-1"), None)));
    assert!(!visible(&record("issuer-1", Some("evs-2"), None)));
    assert!(!visible(&record("issuer-1", None, None)));
}

#[test]
fn field_organization_without_org_sees_nothing() {
    let actor = Actor::new("evs-user", Role::FieldOrganization);
    let visible = visibility_predicate(actor.role, &actor.context);

    assert!(!visible(&record("issuer-1", Some("evs-1"), None)));
}

#[test]
fn partner_relations_sees_its_territories() {
    let actor = Actor::new("pr-1", Role::PartnerRelations)
        .with_territory("59")
        .with_territory("62");
    let visible = visibility_predicate(actor.role, &actor.context);

    assert!(visible(&record("issuer-1", None, Some("62"))));
    assert!(!visible(&record("issuer-1", None, Some("75"))));
    assert!(!visible(&record("issuer-1", None, None)));
}

#[test]
fn oversight_roles_see_everything() {
    for role in [Role::Administrator, Role::ProjectOversight, Role::OversightBody] {
        let actor = Actor::new("someone", role);
        let visible = visibility_predicate(actor.role, &actor.context);
        assert!(visible(&record("issuer-9", None, None)), "{}", role);
    }
}

#[test]
fn administrator_view_scopes_are_the_union() {
    assert_eq!(
        view_scopes(Role::Administrator),
        vec![
            ViewScope::All,
            ViewScope::Own,
            ViewScope::Assigned,
            ViewScope::Filtered
        ]
    );
    assert_eq!(view_scopes(Role::Issuer), vec![ViewScope::Own]);
}
