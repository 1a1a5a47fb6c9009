//! Attribute schemas of the supported warehouse object kinds

use crate::privileges;
use declarative::identifiers::{join_identifier, parse_identifier};
use declarative::{
    AttrMap, Error, FieldSpec, FieldType, Fqn, IgnoreIf, Kind, KindSpec, RefTarget, Registry,
    ResourceName, Result,
};
use serde_json::Value;

fn text(attrs: &AttrMap, key: &str) -> Result<String> {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidResource {
            resource: key.to_string(),
            reason: format!("'{}' is required", key),
        })
}

fn optional_text(attrs: &AttrMap, key: &str) -> Option<String> {
    attrs.get(key).and_then(Value::as_str).map(str::to_string)
}

fn kind_attr(attrs: &AttrMap, key: &str) -> Result<Kind> {
    text(attrs, key)?.parse()
}

/// Canonical dotted path of a fully qualified target
fn qualified(kind: Kind, raw: &str) -> Result<String> {
    let parts = parse_identifier(raw)?;
    if parts.len() != *kind.fqn_parts().end() {
        return Err(Error::InvalidResource {
            resource: format!("{}/{}", kind, raw),
            reason: "grant targets must be fully qualified".to_string(),
        });
    }
    Ok(join_identifier(&parts))
}

fn grant_identity(_: Option<&Fqn>, attrs: &AttrMap) -> Result<Fqn> {
    let on_type = kind_attr(attrs, "on_type")?;
    let on = match on_type {
        Kind::Account => "account".to_string(),
        _ => format!("{}/{}", on_type, qualified(on_type, &text(attrs, "on")?)?),
    };
    Ok(Fqn::new(text(attrs, "to")?.as_str())
        .with_param("priv", text(attrs, "priv")?.to_ascii_uppercase())
        .with_param("on", on))
}

/// Providers report a grant by its privilege alone; `_privs` is what that
/// privilege amounts to on the target kind
fn grant_privileges(attrs: &mut AttrMap) {
    if attrs.get("_privs").is_some_and(|v| !v.is_null()) {
        return;
    }
    let (Some(privilege), Ok(on_type)) = (optional_text(attrs, "priv"), kind_attr(attrs, "on_type")) else {
        return;
    };
    let privs = privileges::expand(&privilege, on_type).unwrap_or_else(|_| vec![privileges::canonical(&privilege)]);
    attrs.insert("_privs".to_string(), Value::from(privs));
}

fn grant_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    let on_type = kind_attr(attrs, "on_type")?;
    let mut refs = vec![RefTarget::parse(Kind::Role, &text(attrs, "to")?)?];
    if on_type != Kind::Account {
        refs.push(RefTarget::parse(on_type, &text(attrs, "on")?)?);
    }
    Ok(refs)
}

/// `future_grant` and `grant_on_all` share one identity: the grantee plus
/// the container and object type, e.g. `on=schema/DB.SCH.<TABLE>`
fn bulk_grant_identity(_: Option<&Fqn>, attrs: &AttrMap) -> Result<Fqn> {
    let in_type = kind_attr(attrs, "in_type")?;
    let on_type = kind_attr(attrs, "on_type")?;
    let on = format!(
        "{}/{}.<{}>",
        in_type,
        qualified(in_type, &text(attrs, "in_name")?)?,
        on_type.sql_type()
    );
    Ok(Fqn::new(text(attrs, "to")?.as_str())
        .with_param("priv", text(attrs, "priv")?.to_ascii_uppercase())
        .with_param("on", on))
}

fn bulk_grant_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    Ok(vec![
        RefTarget::parse(kind_attr(attrs, "in_type")?, &text(attrs, "in_name")?)?,
        RefTarget::parse(Kind::Role, &text(attrs, "to")?)?,
    ])
}

fn role_grant_identity(_: Option<&Fqn>, attrs: &AttrMap) -> Result<Fqn> {
    let fqn = Fqn::new(text(attrs, "role")?.as_str());
    match (optional_text(attrs, "to_role"), optional_text(attrs, "to_user")) {
        (Some(role), None) => Ok(fqn.with_param("role", ResourceName::new(&role).to_string())),
        (None, Some(user)) => Ok(fqn.with_param("user", ResourceName::new(&user).to_string())),
        _ => Err(Error::InvalidResource {
            resource: format!("role_grant/{}", fqn.name),
            reason: "exactly one of 'to_role' and 'to_user' is required".to_string(),
        }),
    }
}

fn role_grant_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    let mut refs = vec![RefTarget::parse(Kind::Role, &text(attrs, "role")?)?];
    if let Some(role) = optional_text(attrs, "to_role") {
        refs.push(RefTarget::parse(Kind::Role, &role)?);
    }
    if let Some(user) = optional_text(attrs, "to_user") {
        refs.push(RefTarget::parse(Kind::User, &user)?);
    }
    Ok(refs)
}

fn tag_reference_identity(_: Option<&Fqn>, attrs: &AttrMap) -> Result<Fqn> {
    let raw = text(attrs, "object_name")?;
    let mut parts = parse_identifier(&raw)?;
    let name = parts.pop().ok_or(Error::InvalidName(raw))?;
    let fqn = match parts.as_slice() {
        [] => Fqn::new(name),
        [db] => Fqn::new(name).in_database(db),
        [db, schema] => Fqn::new(name).in_database(db).in_schema(schema),
        _ => return Err(Error::InvalidName(text(attrs, "object_name")?)),
    };
    Ok(fqn.with_param("domain", text(attrs, "object_domain")?.to_ascii_uppercase()))
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

/// Functions and procedures are identified by name and argument types
fn callable_identity(base: Option<&Fqn>, attrs: &AttrMap) -> Result<Fqn> {
    let base = base.cloned().ok_or_else(|| Error::InvalidResource {
        resource: "function".to_string(),
        reason: "functions need a name".to_string(),
    })?;
    let arg_types = match attrs.get("args") {
        Some(Value::Array(args)) => args
            .iter()
            .map(|arg| {
                arg.get("data_type")
                    .and_then(Value::as_str)
                    .map(|t| t.trim().to_ascii_uppercase())
                    .ok_or_else(|| Error::InvalidResource {
                        resource: base.path(),
                        reason: "every argument needs a data_type".to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };
    Ok(base.with_arg_types(arg_types))
}

/// A reference held in an optional attribute
fn optional_ref(attrs: &AttrMap, key: &str, kind: Kind) -> Result<Vec<RefTarget>> {
    optional_text(attrs, key)
        .map(|raw| RefTarget::parse(kind, &raw))
        .into_iter()
        .collect()
}

fn warehouse_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    optional_ref(attrs, "resource_monitor", Kind::ResourceMonitor)
}

fn stage_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    optional_ref(attrs, "storage_integration", Kind::StorageIntegration)
}

fn stream_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    optional_ref(attrs, "on_table", Kind::Table)
}

fn task_refs(attrs: &AttrMap) -> Result<Vec<RefTarget>> {
    optional_ref(attrs, "warehouse", Kind::Warehouse)
}

fn comment() -> FieldSpec {
    FieldSpec::new("comment", FieldType::String)
}

fn bulk_grant(kind: Kind) -> KindSpec {
    KindSpec::new(kind)
        .grant_like()
        .field(FieldSpec::new("priv", FieldType::Keyword))
        .field(FieldSpec::new("on_type", FieldType::Keyword))
        .field(FieldSpec::new("in_type", FieldType::Keyword))
        .field(FieldSpec::new("in_name", FieldType::Name))
        .field(FieldSpec::new("to", FieldType::Name))
        .field(FieldSpec::new("grant_option", FieldType::Bool).default_value(false).replaces())
        .identity(bulk_grant_identity)
        .refs(bulk_grant_refs)
}

/// Registry with every supported kind
pub fn registry() -> Registry {
    Registry::new()
        // Account objects
        .with(
            KindSpec::new(Kind::Database)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE DATABASE")
                .field(FieldSpec::new("transient", FieldType::Bool).default_value(false).replaces())
                .field(FieldSpec::new("data_retention_time_in_days", FieldType::Int).default_value(1))
                .field(FieldSpec::new("max_data_extension_time_in_days", FieldType::Int).default_value(14))
                .field(comment()),
        )
        .with(
            KindSpec::new(Kind::Role)
                .named()
                .owned_by("USERADMIN")
                .created_with("CREATE ROLE")
                .field(comment()),
        )
        .with(
            KindSpec::new(Kind::User)
                .named()
                .owned_by("USERADMIN")
                .created_with("CREATE USER")
                .field(FieldSpec::new("login_name", FieldType::Name).ignore_if(IgnoreIf::DesiredNull))
                .field(FieldSpec::new("display_name", FieldType::String).ignore_if(IgnoreIf::DesiredNull))
                .field(FieldSpec::new("email", FieldType::String))
                .field(FieldSpec::new("password", FieldType::String).not_fetchable())
                .field(FieldSpec::new("default_role", FieldType::Name))
                .field(FieldSpec::new("default_warehouse", FieldType::Name))
                .field(FieldSpec::new("must_change_password", FieldType::Bool).default_value(false))
                .field(FieldSpec::new("disabled", FieldType::Bool).default_value(false))
                .field(comment()),
        )
        .with(
            KindSpec::new(Kind::Warehouse)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE WAREHOUSE")
                .field(FieldSpec::new("warehouse_size", FieldType::String).default_value("XSMALL"))
                .field(FieldSpec::new("auto_suspend", FieldType::Int).default_value(600))
                .field(FieldSpec::new("auto_resume", FieldType::Bool).default_value(true))
                .field(FieldSpec::new("initially_suspended", FieldType::Bool).not_fetchable())
                .field(FieldSpec::new("min_cluster_count", FieldType::Int).default_value(1))
                .field(FieldSpec::new("max_cluster_count", FieldType::Int).default_value(1))
                .field(FieldSpec::new("resource_monitor", FieldType::Name))
                .field(comment())
                .refs(warehouse_refs),
        )
        .with(
            KindSpec::new(Kind::ResourceMonitor)
                .named()
                .owned_by("ACCOUNTADMIN")
                .field(FieldSpec::new("credit_quota", FieldType::Int))
                .field(FieldSpec::new("frequency", FieldType::String).default_value("MONTHLY"))
                .field(FieldSpec::new("notify_users", FieldType::NameList)),
        )
        .with(
            KindSpec::new(Kind::NetworkPolicy)
                .named()
                .owned_by("SECURITYADMIN")
                .created_with("CREATE NETWORK POLICY")
                .field(FieldSpec::new("allowed_ip_list", FieldType::List))
                .field(FieldSpec::new("blocked_ip_list", FieldType::List))
                .field(comment()),
        )
        .with(
            KindSpec::new(Kind::StorageIntegration)
                .named()
                .owned_by("ACCOUNTADMIN")
                .created_with("CREATE INTEGRATION")
                .field(FieldSpec::new("storage_provider", FieldType::String).replaces())
                .field(FieldSpec::new("storage_aws_role_arn", FieldType::String))
                .field(FieldSpec::new("storage_allowed_locations", FieldType::List))
                .field(FieldSpec::new("storage_blocked_locations", FieldType::List))
                .field(FieldSpec::new("enabled", FieldType::Bool).default_value(true))
                .field(comment()),
        )
        // Privileges
        .with(
            KindSpec::new(Kind::Grant)
                .grant_like()
                .field(FieldSpec::new("priv", FieldType::Keyword))
                .field(FieldSpec::new("on_type", FieldType::Keyword))
                .field(FieldSpec::new("on", FieldType::Name))
                .field(FieldSpec::new("to", FieldType::Name))
                .field(FieldSpec::new("grant_option", FieldType::Bool).default_value(false).replaces())
                .field(FieldSpec::new("_privs", FieldType::List).forces_add())
                .identity(grant_identity)
                .refs(grant_refs)
                .completed_by(grant_privileges),
        )
        .with(bulk_grant(Kind::FutureGrant))
        .with(bulk_grant(Kind::GrantOnAll).unlisted())
        .with(
            KindSpec::new(Kind::RoleGrant)
                .grant_like()
                .field(FieldSpec::new("role", FieldType::Name))
                .field(FieldSpec::new("to_role", FieldType::Name))
                .field(FieldSpec::new("to_user", FieldType::Name))
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
        // Database objects
        .with(
            KindSpec::new(Kind::Schema)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE SCHEMA")
                .field(FieldSpec::new("transient", FieldType::Bool).default_value(false).replaces())
                .field(FieldSpec::new("managed_access", FieldType::Bool).default_value(false))
                .field(FieldSpec::new("data_retention_time_in_days", FieldType::Int).default_value(1))
                .field(comment()),
        )
        .with(
            KindSpec::new(Kind::DatabaseRole)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE DATABASE ROLE")
                .field(comment()),
        )
        // Schema objects
        .with(
            KindSpec::new(Kind::Table)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE TABLE")
                .field(FieldSpec::new("columns", FieldType::List).replaces())
                .field(FieldSpec::new("cluster_by", FieldType::NameList))
                .field(comment()),
        )
        .with(
            KindSpec::new(Kind::View)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE VIEW")
                .field(FieldSpec::new("as_", FieldType::String).replaces())
                .field(FieldSpec::new("secure", FieldType::Bool).default_value(false))
                .field(comment()),
        )
        .with(
            KindSpec::new(Kind::Stage)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE STAGE")
                .field(FieldSpec::new("url", FieldType::String).replaces())
                .field(FieldSpec::new("storage_integration", FieldType::Name))
                .field(FieldSpec::new("directory", FieldType::Bool).default_value(false))
                .field(comment())
                .refs(stage_refs),
        )
        .with(
            KindSpec::new(Kind::FileFormat)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE FILE FORMAT")
                .field(FieldSpec::new("type", FieldType::String).default_value("CSV").replaces())
                .field(FieldSpec::new("field_delimiter", FieldType::String).default_value(","))
                .field(FieldSpec::new("skip_header", FieldType::Int).default_value(0))
                .field(comment()),
        )
        .with(
            KindSpec::new(Kind::Sequence)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE SEQUENCE")
                .field(FieldSpec::new("start", FieldType::Int).default_value(1).replaces())
                .field(FieldSpec::new("increment", FieldType::Int).default_value(1))
                .field(comment()),
        )
        .with(
            KindSpec::new(Kind::Stream)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE STREAM")
                .field(FieldSpec::new("on_table", FieldType::Name).replaces())
                .field(FieldSpec::new("append_only", FieldType::Bool).default_value(false).replaces())
                .field(comment())
                .refs(stream_refs),
        )
        .with(
            KindSpec::new(Kind::Task)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE TASK")
                .field(FieldSpec::new("warehouse", FieldType::Name))
                .field(FieldSpec::new("schedule", FieldType::String))
                .field(FieldSpec::new("as_", FieldType::String))
                .field(comment())
                .refs(task_refs),
        )
        .with(
            KindSpec::new(Kind::Pipe)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE PIPE")
                .field(FieldSpec::new("as_", FieldType::String).replaces())
                .field(FieldSpec::new("auto_ingest", FieldType::Bool).default_value(false).replaces())
                .field(comment()),
        )
        .with(callable(Kind::Function, "CREATE FUNCTION"))
        .with(callable(Kind::Procedure, "CREATE PROCEDURE"))
        .with(
            KindSpec::new(Kind::Tag)
                .named()
                .owned_by("SYSADMIN")
                .created_with("CREATE TAG")
                .field(FieldSpec::new("allowed_values", FieldType::List))
                .field(comment()),
        )
}

fn callable(kind: Kind, privilege: &'static str) -> KindSpec {
    KindSpec::new(kind)
        .named()
        .owned_by("SYSADMIN")
        .created_with(privilege)
        .field(FieldSpec::new("args", FieldType::Args).replaces())
        .field(FieldSpec::new("returns", FieldType::String).replaces())
        .field(FieldSpec::new("language", FieldType::String).default_value("SQL").replaces())
        .field(FieldSpec::new("as_", FieldType::String).replaces())
        .field(FieldSpec::new("secure", FieldType::Bool).default_value(false))
        .field(comment())
        .identity(callable_identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> AttrMap {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => AttrMap::new(),
        }
    }

    #[test]
    fn test_every_kind_but_account_is_registered() {
        let registry = registry();
        for kind in Kind::ALL.iter().filter(|k| **k != Kind::Account) {
            assert!(registry.contains(*kind), "{} is not registered", kind);
        }
    }

    #[test]
    fn test_grant_identity_requires_qualified_target() {
        let grant = attrs(json!({"priv": "select", "on_type": "table", "on": "db.sch.t", "to": "analyst"}));
        let fqn = grant_identity(None, &grant).unwrap();
        assert_eq!(fqn.to_string(), "ANALYST?priv=SELECT&on=table/DB.SCH.T");

        let partial = attrs(json!({"priv": "select", "on_type": "table", "on": "t", "to": "analyst"}));
        assert!(grant_identity(None, &partial).is_err());
    }

    #[test]
    fn test_fetched_grant_gains_its_privileges() {
        let spec = registry().get(Kind::Grant).unwrap().clone();
        let usage = spec.normalize(attrs(json!({"priv": "usage", "on_type": "DATABASE", "on": "DB", "to": "R"})));
        assert_eq!(usage["priv"], json!("USAGE"));
        assert_eq!(usage["on_type"], json!("DATABASE"));
        assert_eq!(usage["_privs"], json!(["USAGE"]));

        let all = spec.normalize(attrs(json!({"priv": "ALL", "on_type": "warehouse", "on": "WH", "to": "R"})));
        assert_eq!(all["_privs"], json!(["MODIFY", "MONITOR", "OPERATE", "USAGE"]));

        let reported = spec.normalize(attrs(json!({"priv": "ALL", "on_type": "warehouse", "_privs": ["USAGE"]})));
        assert_eq!(reported["_privs"], json!(["USAGE"]));
    }

    #[test]
    fn test_account_grant_has_no_target_reference() {
        let grant = attrs(json!({"priv": "CREATE DATABASE", "on_type": "account", "to": "R"}));
        assert_eq!(
            grant_identity(None, &grant).unwrap().to_string(),
            "R?priv=CREATE DATABASE&on=account"
        );
        assert_eq!(grant_refs(&grant).unwrap().len(), 1);
    }

    #[test]
    fn test_future_grant_identity() {
        let grant = attrs(json!({
            "priv": "SELECT", "on_type": "table", "in_type": "schema",
            "in_name": "DB.SCHEMA", "to": "SOMEROLE"
        }));
        assert_eq!(
            bulk_grant_identity(None, &grant).unwrap().to_string(),
            "SOMEROLE?priv=SELECT&on=schema/DB.SCHEMA.<TABLE>"
        );
    }

    #[test]
    fn test_role_grant_to_quoted_user() {
        let grant = attrs(json!({"role": "STATIC_ROLE", "to_user": "info@applytitan.com"}));
        assert_eq!(
            role_grant_identity(None, &grant).unwrap().to_string(),
            "STATIC_ROLE?user=\"info@applytitan.com\""
        );
        let both = attrs(json!({"role": "A", "to_role": "B", "to_user": "C"}));
        assert!(role_grant_identity(None, &both).is_err());
    }

    #[test]
    fn test_function_identity_includes_argument_types() {
        let base = Fqn::new("add").in_database("db").in_schema("util");
        let function = attrs(json!({"args": [{"name": "a", "data_type": "number"}, {"name": "b", "data_type": "Number"}]}));
        assert_eq!(
            callable_identity(Some(&base), &function).unwrap().to_string(),
            "DB.UTIL.ADD(NUMBER, NUMBER)"
        );
    }
}
