//! Core types for planning and applying blueprints

use crate::context::CancelToken;
use crate::error::{Error, ProviderError, Result};
use crate::kind::Kind;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Attribute values keyed by field name, ordered for deterministic output
pub type AttrMap = BTreeMap<String, serde_json::Value>;

/// Policy governing which kinds of drift a run may correct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Create missing resources and update drifted ones; never remove
    #[default]
    CreateOrUpdate,
    /// Fully reconcile allowlisted kinds, excluding grants, roles, users and tables
    Sync,
    /// Fully reconcile allowlisted kinds
    SyncAll,
}

impl RunMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateOrUpdate => "CREATE-OR-UPDATE",
            Self::Sync => "SYNC",
            Self::SyncAll => "SYNC-ALL",
        }
    }

    /// Whether remote resources outside the blueprint are enumerated
    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync | Self::SyncAll)
    }
}

impl FromStr for RunMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "CREATE-OR-UPDATE" => Ok(Self::CreateOrUpdate),
            "SYNC" => Ok(Self::Sync),
            "SYNC-ALL" => Ok(Self::SyncAll),
            "FULLY-MANAGED" => {
                log::warn!("run mode FULLY-MANAGED is deprecated, use SYNC-ALL");
                Ok(Self::SyncAll)
            }
            _ => Err(Error::InvalidRunMode(s.to_string())),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for RunMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for RunMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Operation a change performs on its URN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Change,
    Remove,
    Transfer,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Change => write!(f, "change"),
            Self::Remove => write!(f, "remove"),
            Self::Transfer => write!(f, "transfer"),
        }
    }
}

/// Settings for a plan/apply run
#[derive(Debug, Clone)]
pub struct BlueprintConfig {
    pub run_mode: RunMode,
    /// Kinds this run may touch; required by the sync modes
    pub allowlist: Vec<Kind>,
    /// Never emit ownership transfers
    pub ignore_ownership: bool,
    /// Concurrent remote fetches
    pub workers: usize,
    /// Compile but do not execute
    pub dry_run: bool,
}

impl BlueprintConfig {
    pub fn allows(&self, kind: Kind) -> bool {
        self.allowlist.is_empty() || self.allowlist.contains(&kind)
    }
}

impl Default for BlueprintConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::CreateOrUpdate,
            allowlist: Vec::new(),
            ignore_ownership: false,
            workers: 8,
            dry_run: false,
        }
    }
}

/// Result of executing a single statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    /// Statement ran successfully
    Executed,
    /// Statement failed with an idempotent error and was skipped
    Skipped { error: ProviderError },
    /// Statement was not sent (dry run)
    DryRun,
}

impl StatementOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed)
    }
}

/// Summary of an apply run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub executed: usize,
    pub skipped: usize,
    pub dry_run: usize,
    /// Every statement sent to the warehouse, in order
    pub statements: Vec<String>,
}

impl ExecuteSummary {
    /// Total number of statements processed
    pub fn total(&self) -> usize {
        self.executed + self.skipped + self.dry_run
    }

    /// Whether nothing was run
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Record the outcome of a statement
    pub fn add_result(&mut self, statement: &str, outcome: &StatementOutcome) {
        match outcome {
            StatementOutcome::Executed => {
                self.executed += 1;
                self.statements.push(statement.to_string());
            }
            StatementOutcome::Skipped { .. } => {
                self.skipped += 1;
                self.statements.push(statement.to_string());
            }
            StatementOutcome::DryRun => self.dry_run += 1,
        }
    }
}

/// Options for the executor
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't send statements, just report them
    pub dry_run: bool,
    /// Treat `DOES_NOT_EXIST` as a no-op for every statement (destroy)
    pub tolerate_missing: bool,
    /// Checked before every statement
    pub cancel: CancelToken,
}
