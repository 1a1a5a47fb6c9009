//! Test fixtures: a small registry, an in-memory account and a plain renderer

use crate::context::{DataProvider, PrivilegeGrant, Renderer, SessionContext};
use crate::error::{Error, ProviderError, Result};
use crate::identifiers::{ResourceName, join_identifier, parse_identifier};
use crate::kind::Kind;
use crate::registry::{FieldSpec, FieldType, KindSpec, RefTarget, Registry};
use crate::types::AttrMap;
use crate::urn::{Fqn, Urn};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

fn text(attrs: &AttrMap, key: &str) -> Result<String> {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidResource {
            resource: key.to_string(),
            reason: "missing".to_string(),
        })
}

fn grant_identity(_: Option<&Fqn>, attrs: &AttrMap) -> Result<Fqn> {
    let on = join_identifier(&parse_identifier(&text(attrs, "on")?)?);
    Ok(Fqn::new(text(attrs, "to")?.as_str())
        .with_param("priv", text(attrs, "priv")?.to_ascii_uppercase())
        .with_param("on", format!("{}/{}", text(attrs, "on_type")?.to_ascii_lowercase(), on)))
}

fn grant_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    let on_type: Kind = text(attrs, "on_type")?.parse()?;
    Ok(vec![
        RefTarget::parse(on_type, &text(attrs, "on")?)?,
        RefTarget::parse(Kind::Role, &text(attrs, "to")?)?,
    ])
}

fn role_grant_identity(_: Option<&Fqn>, attrs: &AttrMap) -> Result<Fqn> {
    let to = ResourceName::new(&text(attrs, "to_role")?);
    Ok(Fqn::new(text(attrs, "role")?.as_str()).with_param("role", to.to_string()))
}

fn role_grant_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    Ok(vec![
        RefTarget::parse(Kind::Role, &text(attrs, "role")?)?,
        RefTarget::parse(Kind::Role, &text(attrs, "to_role")?)?,
    ])
}

fn tag_reference_identity(_: Option<&Fqn>, attrs: &AttrMap) -> Result<Fqn> {
    let mut parts = parse_identifier(&text(attrs, "object_name")?)?;
    let name = parts.pop().ok_or_else(|| Error::InvalidName("object_name".into()))?;
    let mut fqn = Fqn::new(name);
    match parts.as_slice() {
        [db] => fqn = fqn.in_database(db),
        [db, schema] => fqn = fqn.in_database(db).in_schema(schema),
        _ => {}
    }
    Ok(fqn.with_param("domain", text(attrs, "object_domain")?))
}

fn tag_reference_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    let mut refs = Vec::new();
    if let Some(Value::Object(tags)) = attrs.get("tags") {
        for tag in tags.keys() {
            refs.push(RefTarget::parse(Kind::Tag, tag)?);
        }
    }
    Ok(refs)
}

pub(crate) fn fixture_registry() -> Registry {
    Registry::new()
        .with(
            KindSpec::new(Kind::Database)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE DATABASE")
                .field(FieldSpec::new("comment", FieldType::String))
                .field(FieldSpec::new("transient", FieldType::Bool).default_value(false).replaces()),
        )
        .with(
            KindSpec::new(Kind::Schema)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE SCHEMA")
                .field(FieldSpec::new("comment", FieldType::String)),
        )
        .with(
            KindSpec::new(Kind::Role)
                .named()
                .owned_by("USERADMIN")
                .created_with("CREATE ROLE")
                .field(FieldSpec::new("comment", FieldType::String)),
        )
        .with(
            KindSpec::new(Kind::User)
                .named()
                .owned_by("USERADMIN")
                .created_with("CREATE USER")
                .field(FieldSpec::new("login_name", FieldType::Name))
                .field(FieldSpec::new("password", FieldType::String).not_fetchable()),
        )
        .with(
            KindSpec::new(Kind::Warehouse)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE WAREHOUSE")
                .field(FieldSpec::new("warehouse_size", FieldType::String).default_value("XSMALL"))
                .field(FieldSpec::new("auto_suspend", FieldType::Int).default_value(600))
                .field(FieldSpec::new("comment", FieldType::String)),
        )
        .with(
            KindSpec::new(Kind::Table)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE TABLE")
                .field(FieldSpec::new("columns", FieldType::List))
                .field(FieldSpec::new("comment", FieldType::String)),
        )
        .with(
            KindSpec::new(Kind::Tag)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE TAG")
                .field(FieldSpec::new("allowed_values", FieldType::List)),
        )
        .with(
            KindSpec::new(Kind::Grant)
                .grant_like()
                .field(FieldSpec::new("priv", FieldType::Keyword))
                .field(FieldSpec::new("on_type", FieldType::Keyword))
                .field(FieldSpec::new("on", FieldType::Name))
                .field(FieldSpec::new("to", FieldType::Name))
                .field(FieldSpec::new("_privs", FieldType::List).forces_add())
                .identity(grant_identity)
                .refs(grant_refs),
        )
        .with(
            KindSpec::new(Kind::RoleGrant)
                .grant_like()
                .field(FieldSpec::new("role", FieldType::Name))
                .field(FieldSpec::new("to_role", FieldType::Name))
                .identity(role_grant_identity)
                .refs(role_grant_refs),
        )
        .with(
            KindSpec::new(Kind::TagReference)
                .unlisted()
                .field(FieldSpec::new("object_name", FieldType::String))
                .field(FieldSpec::new("object_domain", FieldType::String))
                .field(FieldSpec::new("tags", FieldType::Map))
                .identity(tag_reference_identity)
                .refs(tag_reference_refs),
        )
}

pub(crate) fn session() -> SessionContext {
    let mut session = SessionContext::new("ABC123", "ADMIN", "ACCOUNTADMIN");
    session.available_roles = ["ACCOUNTADMIN", "SECURITYADMIN", "SYSADMIN", "USERADMIN", "PUBLIC"]
        .iter()
        .map(|r| ResourceName::new(r))
        .collect();
    session
}

/// Session holding only SYSADMIN and a custom role with CREATE SCHEMA on DB
pub(crate) fn limited_session() -> SessionContext {
    let mut session = SessionContext::new("ABC123", "ADMIN", "SYSADMIN");
    session.available_roles = vec![ResourceName::new("SYSADMIN"), ResourceName::new("BUILDER")];
    session.role_privileges.insert(
        ResourceName::new("BUILDER"),
        vec![PrivilegeGrant::new("CREATE SCHEMA", "database/DB")],
    );
    session
}

pub(crate) fn urn(raw: &str) -> Urn {
    raw.parse().unwrap()
}

pub(crate) fn attrs(value: Value) -> AttrMap {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => AttrMap::new(),
    }
}

/// An in-memory account
pub(crate) struct MemoryProvider {
    pub session: SessionContext,
    pub state: Mutex<BTreeMap<Urn, AttrMap>>,
    pub executed: Mutex<Vec<String>>,
    pub failures: Mutex<HashMap<String, ProviderError>>,
}

impl MemoryProvider {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            state: Mutex::new(BTreeMap::new()),
            executed: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, urn: Urn, attrs: AttrMap) {
        self.state.lock().unwrap().insert(urn, attrs);
    }

    pub fn fail(&self, statement: &str, error: ProviderError) {
        self.failures
            .lock()
            .unwrap()
            .insert(statement.to_string(), error);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl DataProvider for MemoryProvider {
    fn fetch_session(&self) -> std::result::Result<SessionContext, ProviderError> {
        Ok(self.session.clone())
    }

    fn fetch_resource(&self, urn: &Urn) -> std::result::Result<Option<AttrMap>, ProviderError> {
        Ok(self.state.lock().unwrap().get(urn).cloned())
    }

    fn list_resource(&self, kind: Kind) -> std::result::Result<Vec<Fqn>, ProviderError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .keys()
            .filter(|urn| urn.kind == kind)
            .map(|urn| urn.fqn.clone())
            .collect())
    }

    fn execute(&self, statement: &str) -> std::result::Result<(), ProviderError> {
        self.executed.lock().unwrap().push(statement.to_string());
        match self.failures.lock().unwrap().get(statement) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Renders `VERB KIND fqn` without dialect details
pub(crate) struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn create(&self, urn: &Urn, _attrs: &AttrMap) -> String {
        format!("CREATE {} {}", urn.kind.sql_type(), urn.fqn)
    }

    fn alter(&self, urn: &Urn, _before: &AttrMap, delta: &AttrMap) -> Vec<String> {
        let keys: Vec<&str> = delta.keys().map(String::as_str).collect();
        vec![format!("ALTER {} {} SET {}", urn.kind.sql_type(), urn.fqn, keys.join(", "))]
    }

    fn drop(&self, urn: &Urn, _attrs: &AttrMap) -> String {
        format!("DROP {} {}", urn.kind.sql_type(), urn.fqn)
    }

    fn transfer(&self, urn: &Urn, to_role: &ResourceName) -> String {
        format!(
            "GRANT OWNERSHIP ON {} {} TO ROLE {} COPY CURRENT GRANTS",
            urn.kind.sql_type(),
            urn.fqn.path(),
            to_role
        )
    }
}
