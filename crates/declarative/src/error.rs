//! Error types for planning and applying blueprints
//!
//! Errors follow the pipeline: finalization (`OrphanResource`,
//! `DuplicateResource`), manifest generation (`InvalidOwner`), planning
//! (`MissingResource`, `MarkedForReplacement`, `NonConformingPlan`,
//! `CyclicDependency`), compilation (`MissingPrivilege`) and execution
//! (`Execution`, `Cancelled`). Idempotent warehouse errors are not errors at
//! all; the executor downgrades them to skipped statements.

use crate::kind::Kind;
use crate::types::RunMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum number of run-mode violations rendered in an error message
pub const MAX_REPORTED_VIOLATIONS: usize = 5;

/// Stable error codes reported by a data provider when a statement fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The object being created already exists
    AlreadyExists,
    /// The object being altered, dropped or revoked does not exist
    DoesNotExist,
    /// The grant is not valid for the target (e.g. privilege already implied)
    InvalidGrant,
    /// Any other server error, with its native code
    Other(String),
}

impl ErrorCode {
    /// Parse a code as reported by the adapter
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "ALREADY_EXISTS" => Self::AlreadyExists,
            "DOES_NOT_EXIST" => Self::DoesNotExist,
            "INVALID_GRANT" => Self::InvalidGrant,
            _ => Self::Other(code.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => write!(f, "ALREADY_EXISTS"),
            Self::DoesNotExist => write!(f, "DOES_NOT_EXIST"),
            Self::InvalidGrant => write!(f, "INVALID_GRANT"),
            Self::Other(code) => write!(f, "{}", code),
        }
    }
}

/// An error returned by a data provider
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct ProviderError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for a provider failure without a stable code
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Other("ERROR".into()), message)
    }
}

/// Errors that can occur while planning or applying a blueprint
#[derive(Debug, Error)]
pub enum Error {
    /// A URN string could not be parsed
    #[error("invalid URN '{urn}': {reason}")]
    InvalidUrn { urn: String, reason: String },

    /// An identifier could not be parsed
    #[error("invalid identifier '{0}'")]
    InvalidName(String),

    /// A kind label is not known to the engine
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// A kind has no entry in the registry
    #[error("resource kind {0} is not registered")]
    UnregisteredKind(Kind),

    /// A run mode label could not be parsed
    #[error("invalid run mode: {0}")]
    InvalidRunMode(String),

    /// A resource is structurally invalid (wrong container, implicit object declared, ...)
    #[error("invalid resource {resource}: {reason}")]
    InvalidResource { resource: String, reason: String },

    /// A database- or schema-scoped resource has no container and none can be inferred
    #[error("{kind} {name} has no database and none can be inferred")]
    OrphanResource { kind: Kind, name: String },

    /// Two concrete resources share a URN but disagree on attributes
    #[error("duplicate resource {urn} declared with conflicting attributes")]
    DuplicateResource { urn: String },

    /// A referenced resource is neither in the manifest nor in the account
    #[error("{referrer} depends on {urn}, which is not declared and does not exist")]
    MissingResource { urn: String, referrer: String },

    /// No available role can execute a change
    #[error("no available role can {capability} (needed for {urn})")]
    MissingPrivilege { urn: String, capability: String },

    /// A declared owner role is unknown to the blueprint and the session
    #[error("{urn} is owned by {owner}, which is not declared and not granted to the session")]
    InvalidOwner { urn: String, owner: String },

    /// A change touches attributes that can only be changed by recreating the resource
    #[error("{urn} would need to be replaced to change {}", .fields.join(", "))]
    MarkedForReplacement { urn: String, fields: Vec<String> },

    /// The plan contains changes forbidden by the run mode
    #[error("plan does not conform to {run_mode} mode:\n{}", format_violations(.violations))]
    NonConformingPlan {
        run_mode: RunMode,
        violations: Vec<String>,
    },

    /// The reference graph contains a cycle
    #[error("cyclic dependency between {}", .urns.join(", "))]
    CyclicDependency { urns: Vec<String> },

    /// The plan would drop the user running it
    #[error("plan drops the session user {user}")]
    DropsSessionUser { user: String },

    /// A statement failed with a non-idempotent error
    #[error("statement failed {error}: {statement}")]
    Execution {
        statement: String,
        #[source]
        error: ProviderError,
        /// Statements that completed before the failure
        executed: Vec<String>,
    },

    /// Execution or fetching stopped at a cancellation boundary
    #[error("cancelled after {} statements ({} remaining)", .executed.len(), .remaining.len())]
    Cancelled {
        executed: Vec<String>,
        remaining: Vec<String>,
    },

    /// The data provider failed outside of statement execution
    #[error("data provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The fetch worker pool could not be started
    #[error("failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_violations(violations: &[String]) -> String {
    let mut lines: Vec<String> = violations
        .iter()
        .take(MAX_REPORTED_VIOLATIONS)
        .map(|v| format!("  - {}", v))
        .collect();
    if violations.len() > MAX_REPORTED_VIOLATIONS {
        lines.push(format!(
            "  ... and {} more",
            violations.len() - MAX_REPORTED_VIOLATIONS
        ));
    }
    lines.join("\n")
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;
