//! Compiling a plan into SQL with the least-privileged role for each change

use crate::context::{PrivilegeGrant, Renderer, SessionContext};
use crate::error::{Error, Result};
use crate::identifiers::ResourceName;
use crate::kind::{Scope, is_system_role, system_role_rank};
use crate::planner::{Change, Plan};
use crate::registry::{KindSpec, Registry};
use crate::types::{Action, AttrMap};
use crate::urn::{Fqn, Urn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// First statement of every compiled plan
pub const SECONDARY_ROLES: &str = "USE SECONDARY ROLES ALL";

/// Account-level privileges system roles hold by default
const SYSTEM_ROLE_PRIVILEGES: &[(&str, &[&str])] = &[
    ("USERADMIN", &["CREATE ROLE", "CREATE USER"]),
    ("SECURITYADMIN", &["CREATE ROLE", "CREATE USER", "MANAGE GRANTS"]),
    (
        "SYSADMIN",
        &["CREATE DATABASE", "CREATE WAREHOUSE", "CREATE INTEGRATION"],
    ),
];

/// What a role must be able to do to execute a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Act as exactly this role (it owns, or will own, the object)
    Role(ResourceName),
    /// Hold a privilege on a target (`account` or `<kind>/<fqn>`)
    Privilege { privilege: String, on: String },
    /// Grant and revoke privileges on any object
    ManageGrants,
    /// Nothing beyond the session's own role
    Session,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role(role) => write!(f, "use role {}", role),
            Self::Privilege { privilege, on } => write!(f, "{} on {}", privilege, on),
            Self::ManageGrants => write!(f, "MANAGE GRANTS"),
            Self::Session => write!(f, "use the session role"),
        }
    }
}

/// Privilege target string for a container of `urn`
fn container_target(urn: &Urn) -> String {
    let fqn = &urn.fqn;
    match (urn.kind.scope(), &fqn.database, &fqn.schema) {
        (Scope::Schema, Some(db), Some(schema)) => {
            format!("schema/{}", Fqn::new(schema).in_database(db).path())
        }
        (Scope::Database, Some(db), _) => format!("database/{}", db),
        _ => "account".to_string(),
    }
}

/// Privilege target string for the object itself
fn object_target(urn: &Urn) -> String {
    format!("{}/{}", urn.kind.label(), urn.fqn.path())
}

fn owner_of(attrs: Option<&AttrMap>) -> Option<ResourceName> {
    attrs.and_then(|a| KindSpec::name_attr(a, "owner"))
}

/// Capability needed to execute a change
pub fn required_capability(change: &Change, registry: &Registry) -> Result<Capability> {
    let spec = registry.get(change.kind())?;
    if spec.grant_like && matches!(change.action, Action::Add | Action::Remove) {
        return Ok(Capability::ManageGrants);
    }

    let capability = match change.action {
        Action::Add => match owner_of(change.after.as_ref()) {
            Some(owner) if is_system_role(&owner) => Capability::Role(owner),
            Some(_) => match spec.create_privilege {
                Some(privilege) => Capability::Privilege {
                    privilege: privilege.to_string(),
                    on: container_target(&change.urn),
                },
                None => Capability::Session,
            },
            None => Capability::Session,
        },
        Action::Change | Action::Transfer | Action::Remove => {
            match owner_of(change.before.as_ref()) {
                Some(owner) => Capability::Role(owner),
                None if spec.grant_like => Capability::ManageGrants,
                None => Capability::Session,
            }
        }
    };
    Ok(capability)
}

/// Picks roles for capabilities and tracks privileges gained while the plan
/// runs (ownership of created containers)
#[derive(Debug)]
pub struct RoleSelector<'a> {
    session: &'a SessionContext,
    gained: BTreeMap<ResourceName, BTreeSet<PrivilegeGrant>>,
}

impl<'a> RoleSelector<'a> {
    pub fn new(session: &'a SessionContext) -> Self {
        Self {
            session,
            gained: BTreeMap::new(),
        }
    }

    /// Record that a role gained a privilege during the plan
    pub fn record(&mut self, role: &ResourceName, privilege: &str, on: &str) {
        self.gained
            .entry(role.clone())
            .or_default()
            .insert(PrivilegeGrant::new(privilege, on));
    }

    fn holds(&self, role: &ResourceName, privilege: &str, on: &str) -> bool {
        if role.matches("ACCOUNTADMIN") {
            return true;
        }
        let wanted = PrivilegeGrant::new(privilege, on);
        let ownership = PrivilegeGrant::new("OWNERSHIP", on);
        let granted = self
            .session
            .role_privileges
            .get(role)
            .into_iter()
            .flatten()
            .chain(self.gained.get(role).into_iter().flatten())
            .any(|g| *g == wanted || *g == ownership);
        granted
            || (on == "account"
                && SYSTEM_ROLE_PRIVILEGES
                    .iter()
                    .any(|(r, privs)| role.matches(r) && privs.contains(&wanted.privilege.as_str())))
    }

    /// Least-privileged usable role with the capability; custom roles sort
    /// before system roles
    pub fn select(&self, capability: &Capability) -> Option<ResourceName> {
        let candidates = self.session.usable_roles();
        match capability {
            Capability::Session => Some(self.session.role.clone()),
            Capability::Role(role) => self.session.can_use_role(role).then(|| role.clone()),
            Capability::ManageGrants => least_privileged(
                candidates
                    .into_iter()
                    .filter(|r| r.matches("SECURITYADMIN") || self.holds(r, "MANAGE GRANTS", "account")),
            ),
            Capability::Privilege { privilege, on } => {
                least_privileged(candidates.into_iter().filter(|r| self.holds(r, privilege, on)))
            }
        }
    }
}

fn least_privileged(roles: impl Iterator<Item = ResourceName>) -> Option<ResourceName> {
    roles.min_by_key(|r| (system_role_rank(r).map_or(0, |rank| rank + 1), r.clone()))
}

/// Compile a plan into statements
pub fn compile(
    plan: &Plan,
    registry: &Registry,
    session: &SessionContext,
    renderer: &dyn Renderer,
) -> Result<Vec<String>> {
    let mut selector = RoleSelector::new(session);
    let mut statements = vec![SECONDARY_ROLES.to_string()];
    let mut current_role = session.role.clone();

    for change in plan.changes() {
        let capability = required_capability(change, registry)?;
        let role = selector
            .select(&capability)
            .ok_or_else(|| Error::MissingPrivilege {
                urn: change.urn.to_string(),
                capability: capability.to_string(),
            })?;

        if role != current_role {
            statements.push(format!("USE ROLE {}", role));
            current_role = role.clone();
        }

        let before = change.before.clone().unwrap_or_default();
        let after = change.after.clone().unwrap_or_default();
        match change.action {
            Action::Add => {
                statements.push(renderer.create(&change.urn, &after));
                if let Some(owner) = owner_of(change.after.as_ref()) {
                    if owner != role {
                        statements.push(renderer.transfer(&change.urn, &owner));
                    }
                    selector.record(&owner, "OWNERSHIP", &object_target(&change.urn));
                }
            }
            Action::Change => statements.extend(renderer.alter(&change.urn, &before, &change.delta)),
            Action::Transfer => {
                let owner = owner_of(Some(&change.delta)).ok_or_else(|| Error::InvalidResource {
                    resource: change.urn.to_string(),
                    reason: "ownership transfer without an owner".to_string(),
                })?;
                statements.push(renderer.transfer(&change.urn, &owner));
                selector.record(&owner, "OWNERSHIP", &object_target(&change.urn));
            }
            Action::Remove => statements.push(renderer.drop(&change.urn, &before)),
        }
    }

    log::debug!("compiled {} statements", statements.len());
    Ok(statements)
}
