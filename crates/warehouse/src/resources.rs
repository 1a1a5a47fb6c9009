//! Constructors for grant-like resources
//!
//! Grants are identified by their attributes rather than a name, and a grant
//! of `ALL` carries the privileges it expands to in `_privs`.

use crate::error::Result;
use crate::privileges;
use declarative::identifiers::{join_identifier, parse_identifier};
use declarative::{Kind, Resource};
use serde_json::Value;

/// Dotted path in canonical form, so `db.sch` and `DB.SCH` compare equal
fn canonical(raw: &str) -> Result<String> {
    Ok(join_identifier(&parse_identifier(raw)?))
}

/// `GRANT <privilege> ON <on_type> <on> TO ROLE <to>`
///
/// `on` must be fully qualified for database and schema objects. It is
/// ignored for account grants.
pub fn grant(privilege: &str, on_type: Kind, on: &str, to: &str) -> Result<Resource> {
    let privs = privileges::expand(privilege, on_type)?;
    let on = match on_type {
        Kind::Account => "ACCOUNT".to_string(),
        _ => canonical(on)?,
    };
    Ok(Resource::unnamed(Kind::Grant)
        .with("priv", privileges::canonical(privilege))
        .with("on_type", on_type.label())
        .with("on", on)
        .with("to", to)
        .with("_privs", Value::from(privs)))
}

/// `GRANT <privilege> ON FUTURE <on_type>S IN <in_type> <in_name> TO ROLE <to>`
pub fn future_grant(privilege: &str, on_type: Kind, in_type: Kind, in_name: &str, to: &str) -> Result<Resource> {
    bulk_grant(Kind::FutureGrant, privilege, on_type, in_type, in_name, to)
}

/// `GRANT <privilege> ON ALL <on_type>S IN <in_type> <in_name> TO ROLE <to>`
pub fn grant_on_all(privilege: &str, on_type: Kind, in_type: Kind, in_name: &str, to: &str) -> Result<Resource> {
    bulk_grant(Kind::GrantOnAll, privilege, on_type, in_type, in_name, to)
}

fn bulk_grant(
    kind: Kind,
    privilege: &str,
    on_type: Kind,
    in_type: Kind,
    in_name: &str,
    to: &str,
) -> Result<Resource> {
    privileges::expand(privilege, on_type)?;
    Ok(Resource::unnamed(kind)
        .with("priv", privileges::canonical(privilege))
        .with("on_type", on_type.label())
        .with("in_type", in_type.label())
        .with("in_name", canonical(in_name)?)
        .with("to", to))
}

/// `GRANT ROLE <role> TO ROLE <to_role>`
pub fn role_grant(role: &str, to_role: &str) -> Resource {
    Resource::unnamed(Kind::RoleGrant)
        .with("role", role)
        .with("to_role", to_role)
}

/// `GRANT ROLE <role> TO USER <to_user>`
pub fn role_grant_to_user(role: &str, to_user: &str) -> Resource {
    Resource::unnamed(Kind::RoleGrant)
        .with("role", role)
        .with("to_user", to_user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_grant_all_lists_expanded_privileges() {
        let grant = grant("all", Kind::Warehouse, "wh", "r").unwrap();
        assert_eq!(grant.attrs()["priv"], json!("ALL"));
        assert_eq!(grant.attrs()["_privs"], json!(["MODIFY", "MONITOR", "OPERATE", "USAGE"]));
    }

    #[test]
    fn test_account_grant_targets_account() {
        let grant = grant("create database", Kind::Account, "", "r").unwrap();
        assert_eq!(grant.attrs()["on"], json!("ACCOUNT"));
        assert_eq!(grant.attrs()["_privs"], json!(["CREATE DATABASE"]));
    }

    #[test]
    fn test_targets_are_canonical() {
        let grant = future_grant("select", Kind::View, Kind::Schema, "some_db.my_schema", "r").unwrap();
        assert_eq!(grant.attrs()["in_name"], json!("SOME_DB.MY_SCHEMA"));
    }

    #[test]
    fn test_invalid_privilege_is_rejected() {
        assert!(future_grant("OPERATE", Kind::Table, Kind::Schema, "db.sch", "r").is_err());
    }
}
