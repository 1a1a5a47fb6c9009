//! Error types for the warehouse crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading snapshots or building resources
#[derive(Error, Debug)]
pub enum Error {
    /// Planning or finalization error
    #[error(transparent)]
    Declarative(#[from] declarative::Error),

    /// IO error on a snapshot file
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed snapshot
    #[error("invalid snapshot {}: {source}", .path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Privilege that cannot be granted on the target kind
    #[error("{privilege} cannot be granted on {kind}")]
    InvalidPrivilege {
        privilege: String,
        kind: declarative::Kind,
    },
}

/// Result type for warehouse operations
pub type Result<T> = std::result::Result<T, Error>;
