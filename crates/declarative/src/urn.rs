//! Fully qualified names and URNs
//!
//! Wire format: `urn:<org>:<account_locator>:<kind_label>/<fqn>[?k=v&k=v]`,
//! e.g. `urn::ABC123:role_grant/CUSTOMROLE?role=SYSADMIN`.

use crate::error::{Error, Result};
use crate::identifiers::{ResourceName, join_identifier, parse_identifier};
use crate::kind::Kind;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Fully qualified name of a resource within an account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fqn {
    pub database: Option<ResourceName>,
    pub schema: Option<ResourceName>,
    pub name: ResourceName,
    /// Argument types for overloadable kinds (functions, procedures)
    pub arg_types: Option<Vec<String>>,
    /// Qualifier parameters, in insertion order
    pub params: Vec<(String, String)>,
}

impl Fqn {
    pub fn new(name: impl Into<ResourceName>) -> Self {
        Self {
            database: None,
            schema: None,
            name: name.into(),
            arg_types: None,
            params: Vec::new(),
        }
    }

    pub fn in_database(mut self, database: impl Into<ResourceName>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn in_schema(mut self, schema: impl Into<ResourceName>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_arg_types(mut self, arg_types: Vec<String>) -> Self {
        self.arg_types = Some(arg_types);
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    /// Look up a qualifier parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The dotted path (`db.schema.name`) without arguments or parameters
    pub fn path(&self) -> String {
        join_identifier(
            self.database
                .iter()
                .chain(self.schema.iter())
                .chain(std::iter::once(&self.name)),
        )
    }

    /// Parse the FQN part of a URN for a given kind
    pub fn parse(kind: Kind, raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUrn {
            urn: raw.to_string(),
            reason: reason.to_string(),
        };

        let (body, query) = match find_unquoted(raw, '?') {
            Some(idx) => (&raw[..idx], Some(&raw[idx + 1..])),
            None => (raw, None),
        };

        let (path, arg_types) = match find_unquoted(body, '(') {
            Some(idx) => {
                let args = body[idx + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("unterminated argument list"))?;
                let types = args
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                (&body[..idx], Some(types))
            }
            None => (body, None),
        };

        let parts = parse_identifier(path).map_err(|_| invalid("malformed identifier"))?;
        if !kind.fqn_parts().contains(&parts.len()) {
            return Err(invalid(&format!(
                "{} expects {:?} name segments, found {}",
                kind,
                kind.fqn_parts(),
                parts.len()
            )));
        }

        let mut parts = parts.into_iter();
        let mut fqn = match parts.len() {
            1 => Fqn::new(parts.next().ok_or_else(|| invalid("missing name"))?),
            2 => {
                let database = parts.next().ok_or_else(|| invalid("missing database"))?;
                let name = parts.next().ok_or_else(|| invalid("missing name"))?;
                Fqn::new(name).in_database(database)
            }
            _ => {
                let database = parts.next().ok_or_else(|| invalid("missing database"))?;
                let schema = parts.next().ok_or_else(|| invalid("missing schema"))?;
                let name = parts.next().ok_or_else(|| invalid("missing name"))?;
                Fqn::new(name).in_database(database).in_schema(schema)
            }
        };
        fqn.arg_types = arg_types;

        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| invalid("parameter without '='"))?;
                fqn.params.push((key.to_string(), value.to_string()));
            }
        }

        Ok(fqn)
    }
}

fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    for (idx, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == needle && !in_quotes {
            return Some(idx);
        }
    }
    None
}

impl fmt::Display for Fqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())?;
        if let Some(arg_types) = &self.arg_types {
            write!(f, "({})", arg_types.join(", "))?;
        }
        if !self.params.is_empty() {
            let query: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "?{}", query.join("&"))?;
        }
        Ok(())
    }
}

/// Unique identifier of a managed object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Urn {
    pub org: String,
    pub account_locator: String,
    pub kind: Kind,
    pub fqn: Fqn,
}

impl Urn {
    pub fn new(account_locator: impl Into<String>, kind: Kind, fqn: Fqn) -> Self {
        Self {
            org: String::new(),
            account_locator: account_locator.into(),
            kind,
            fqn,
        }
    }

    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = org.into();
        self
    }

    /// Same account and org, different object
    pub fn sibling(&self, kind: Kind, fqn: Fqn) -> Self {
        Self {
            org: self.org.clone(),
            account_locator: self.account_locator.clone(),
            kind,
            fqn,
        }
    }

    pub fn name(&self) -> &ResourceName {
        &self.fqn.name
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "urn:{}:{}:{}/{}",
            self.org,
            self.account_locator,
            self.kind.label(),
            self.fqn
        )
    }
}

impl FromStr for Urn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUrn {
            urn: s.to_string(),
            reason: reason.to_string(),
        };

        let rest = s
            .strip_prefix("urn:")
            .ok_or_else(|| invalid("missing 'urn:' prefix"))?;
        let mut sections = rest.splitn(3, ':');
        let org = sections.next().ok_or_else(|| invalid("missing org"))?;
        let account_locator = sections
            .next()
            .ok_or_else(|| invalid("missing account locator"))?;
        let resource = sections
            .next()
            .ok_or_else(|| invalid("missing resource section"))?;
        let (label, fqn) = resource
            .split_once('/')
            .ok_or_else(|| invalid("missing '/' between kind and name"))?;

        let kind: Kind = label
            .parse()
            .map_err(|_| invalid(&format!("unknown kind '{}'", label)))?;
        if kind.label() != label {
            return Err(invalid("kind label must be lowercase canonical"));
        }

        Ok(Self {
            org: org.to_string(),
            account_locator: account_locator.to_string(),
            kind,
            fqn: Fqn::parse(kind, fqn)?,
        })
    }
}

impl Serialize for Urn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Urn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
