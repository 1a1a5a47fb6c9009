//! Grantable privileges per object kind
//!
//! `ALL` is expanded into the full list for the target kind, so a grant of
//! `ALL` is only satisfied when every privilege is held.

use crate::error::{Error, Result};
use declarative::Kind;

const ACCOUNT: &[&str] = &[
    "APPLY MASKING POLICY",
    "APPLY TAG",
    "CREATE DATABASE",
    "CREATE INTEGRATION",
    "CREATE NETWORK POLICY",
    "CREATE ROLE",
    "CREATE USER",
    "CREATE WAREHOUSE",
    "EXECUTE MANAGED TASK",
    "EXECUTE TASK",
    "MANAGE GRANTS",
    "MONITOR EXECUTION",
    "MONITOR USAGE",
];

const DATABASE: &[&str] = &["CREATE DATABASE ROLE", "CREATE SCHEMA", "MODIFY", "MONITOR", "USAGE"];

const SCHEMA: &[&str] = &[
    "CREATE FILE FORMAT",
    "CREATE FUNCTION",
    "CREATE PIPE",
    "CREATE PROCEDURE",
    "CREATE SEQUENCE",
    "CREATE STAGE",
    "CREATE STREAM",
    "CREATE TABLE",
    "CREATE TAG",
    "CREATE TASK",
    "CREATE VIEW",
    "MODIFY",
    "MONITOR",
    "USAGE",
];

const WAREHOUSE: &[&str] = &["MODIFY", "MONITOR", "OPERATE", "USAGE"];
const TABLE: &[&str] = &["DELETE", "INSERT", "REFERENCES", "SELECT", "TRUNCATE", "UPDATE"];
const VIEW: &[&str] = &["REFERENCES", "SELECT"];
const STAGE: &[&str] = &["READ", "USAGE", "WRITE"];
const USAGE_ONLY: &[&str] = &["USAGE"];
const OPERABLE: &[&str] = &["MONITOR", "OPERATE"];

/// Every privilege that can be granted on objects of a kind
pub fn privileges_for(kind: Kind) -> &'static [&'static str] {
    match kind {
        Kind::Account => ACCOUNT,
        Kind::Database => DATABASE,
        Kind::Schema => SCHEMA,
        Kind::Warehouse => WAREHOUSE,
        Kind::Table => TABLE,
        Kind::View => VIEW,
        Kind::Stage => STAGE,
        Kind::Task | Kind::Pipe => OPERABLE,
        Kind::ResourceMonitor => &["MODIFY", "MONITOR"],
        Kind::Stream => &["SELECT"],
        Kind::Tag => &["APPLY"],
        Kind::User => &["MONITOR"],
        Kind::FileFormat
        | Kind::Sequence
        | Kind::Function
        | Kind::Procedure
        | Kind::StorageIntegration => USAGE_ONLY,
        _ => &[],
    }
}

fn normalize(privilege: &str) -> String {
    privilege.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase()
}

/// Whether a privilege is `ALL` (or `ALL PRIVILEGES`)
pub fn is_all(privilege: &str) -> bool {
    matches!(normalize(privilege).as_str(), "ALL" | "ALL PRIVILEGES")
}

/// Canonical spelling: uppercase, single spaces, `ALL PRIVILEGES` as `ALL`
pub fn canonical(privilege: &str) -> String {
    if is_all(privilege) {
        "ALL".to_string()
    } else {
        normalize(privilege)
    }
}

/// Privileges a grant of `privilege` on `kind` amounts to
pub fn expand(privilege: &str, kind: Kind) -> Result<Vec<String>> {
    let privilege = normalize(privilege);
    let known = privileges_for(kind);
    if is_all(&privilege) {
        return Ok(known.iter().map(|p| (*p).to_string()).collect());
    }
    if privilege == "OWNERSHIP" || known.contains(&privilege.as_str()) {
        return Ok(vec![privilege]);
    }
    Err(Error::InvalidPrivilege { privilege, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_expands_to_every_privilege() {
        let privs = expand("all", Kind::Database).unwrap();
        assert_eq!(privs, vec!["CREATE DATABASE ROLE", "CREATE SCHEMA", "MODIFY", "MONITOR", "USAGE"]);
        assert_eq!(expand("ALL PRIVILEGES", Kind::View).unwrap(), vec!["REFERENCES", "SELECT"]);
    }

    #[test]
    fn test_single_privilege_is_normalized() {
        assert_eq!(expand("create  schema", Kind::Database).unwrap(), vec!["CREATE SCHEMA"]);
        assert_eq!(expand("ownership", Kind::Table).unwrap(), vec!["OWNERSHIP"]);
    }

    #[test]
    fn test_canonical_spelling() {
        assert_eq!(canonical("all privileges"), "ALL");
        assert_eq!(canonical(" create   table "), "CREATE TABLE");
    }

    #[test]
    fn test_unknown_privilege_is_rejected() {
        assert!(matches!(
            expand("SELECT", Kind::Warehouse),
            Err(Error::InvalidPrivilege { .. })
        ));
    }
}
