//! Resource kinds, scopes and system roles

use crate::error::{Error, Result};
use crate::identifiers::ResourceName;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Containment level of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Organization,
    Account,
    Database,
    Schema,
}

impl Scope {
    /// The kind of container a resource of this scope lives in, if any
    pub fn container_kind(&self) -> Option<Kind> {
        match self {
            Self::Organization | Self::Account => None,
            Self::Database => Some(Kind::Database),
            Self::Schema => Some(Kind::Schema),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organization => write!(f, "organization"),
            Self::Account => write!(f, "account"),
            Self::Database => write!(f, "database"),
            Self::Schema => write!(f, "schema"),
        }
    }
}

macro_rules! kinds {
    ($($variant:ident => ($label:literal, $scope:ident)),+ $(,)?) => {
        /// Tag identifying a kind of warehouse object
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Kind {
            $($variant),+
        }

        impl Kind {
            /// Every kind known to the engine
            pub const ALL: &'static [Kind] = &[$(Kind::$variant),+];

            /// Lowercase canonical label used in URNs and config
            pub fn label(&self) -> &'static str {
                match self {
                    $(Kind::$variant => $label),+
                }
            }

            /// Containment level of this kind
            pub fn scope(&self) -> Scope {
                match self {
                    $(Kind::$variant => Scope::$scope),+
                }
            }
        }

        impl FromStr for Kind {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let label = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
                match label.as_str() {
                    $($label => Ok(Kind::$variant),)+
                    _ => Err(Error::UnknownKind(s.to_string())),
                }
            }
        }
    };
}

kinds! {
    Account => ("account", Organization),
    Database => ("database", Account),
    Role => ("role", Account),
    User => ("user", Account),
    Warehouse => ("warehouse", Account),
    ResourceMonitor => ("resource_monitor", Account),
    NetworkPolicy => ("network_policy", Account),
    StorageIntegration => ("storage_integration", Account),
    Grant => ("grant", Account),
    FutureGrant => ("future_grant", Account),
    GrantOnAll => ("grant_on_all", Account),
    RoleGrant => ("role_grant", Account),
    TagReference => ("tag_reference", Account),
    Schema => ("schema", Database),
    DatabaseRole => ("database_role", Database),
    Table => ("table", Schema),
    View => ("view", Schema),
    Stage => ("stage", Schema),
    FileFormat => ("file_format", Schema),
    Sequence => ("sequence", Schema),
    Stream => ("stream", Schema),
    Task => ("task", Schema),
    Pipe => ("pipe", Schema),
    Function => ("function", Schema),
    Procedure => ("procedure", Schema),
    Tag => ("tag", Schema),
}

impl Kind {
    /// Number of dotted name segments an FQN of this kind may have
    pub fn fqn_parts(&self) -> RangeInclusive<usize> {
        match (self, self.scope()) {
            (Kind::TagReference, _) => 1..=3,
            (_, Scope::Organization | Scope::Account) => 1..=1,
            (_, Scope::Database) => 2..=2,
            (_, Scope::Schema) => 3..=3,
        }
    }

    /// Uppercase object type as used in SQL (`FILE FORMAT`, `DATABASE ROLE`)
    pub fn sql_type(&self) -> String {
        self.label().replace('_', " ").to_ascii_uppercase()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Built-in administrative roles, least to most privileged
pub const SYSTEM_ROLES: &[&str] = &[
    "PUBLIC",
    "USERADMIN",
    "SYSADMIN",
    "SECURITYADMIN",
    "ACCOUNTADMIN",
    "ORGADMIN",
];

/// Whether a role is one of the built-in administrative roles
pub fn is_system_role(role: &ResourceName) -> bool {
    system_role_rank(role).is_some()
}

/// Privilege rank of a system role (`None` for custom roles)
pub fn system_role_rank(role: &ResourceName) -> Option<usize> {
    SYSTEM_ROLES.iter().position(|r| role.matches(r))
}
