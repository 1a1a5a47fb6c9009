//! Warehouse object model for the declarative planner
//!
//! This crate supplies the concrete pieces the core planner is generic over:
//!
//! - [`registry()`]: every supported object kind with its fields, identity
//!   and references
//! - [`SqlRenderer`]: DDL and DCL statements for planned changes
//! - [`SnapshotProvider`]: account state read from a JSON snapshot
//! - [`resources`]: constructors for grants and role grants
//!
//! # Example
//!
//! ```ignore
//! use declarative::{AutoConfirm, Blueprint, BlueprintConfig, Engine, Kind, NoProgress, Resource};
//! use warehouse::{SnapshotProvider, SqlRenderer};
//!
//! let registry = warehouse::registry();
//! let renderer = SqlRenderer::new(&registry);
//! let provider = SnapshotProvider::load("account.json".as_ref())?;
//! let engine = Engine::new(&provider, &registry, &renderer, BlueprintConfig::default());
//!
//! let mut blueprint = Blueprint::new();
//! blueprint.add(Resource::new(Kind::Database, "analytics"))?;
//! engine.apply(blueprint, None, &mut NoProgress, &mut AutoConfirm)?;
//! ```

mod error;
pub mod privileges;
mod registry;
pub mod resources;
pub mod snapshot;
pub mod sql;

pub use error::{Error, Result};
pub use registry::registry;
pub use resources::{future_grant, grant, grant_on_all, role_grant, role_grant_to_user};
pub use snapshot::{Snapshot, SnapshotProvider};
pub use sql::SqlRenderer;
