//! # Declarative
//!
//! Declarative management of warehouse account objects.
//!
//! This crate models the desired objects of an account, compares them with
//! the live account and produces an ordered plan of statements that
//! converges the account to the declared state.
//!
//! ## Core Concepts
//!
//! - **Resource**: A declared object (database, role, grant...) with attributes
//! - **Blueprint**: The arena of declared resources and their containment tree
//! - **Manifest**: Desired state keyed by URN with dependency edges
//! - **Plan**: Ordered changes (add, change, transfer, remove)
//! - **Engine**: Runs plan, apply and destroy against a [`DataProvider`]
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Blueprint, BlueprintConfig, Engine, Kind, Resource};
//!
//! let mut blueprint = Blueprint::new();
//! blueprint.add(Resource::new(Kind::Database, "analytics"))?;
//! blueprint.add(Resource::new(Kind::Schema, "raw").in_database("analytics"))?;
//!
//! let engine = Engine::new(&provider, &registry, &renderer, BlueprintConfig::default());
//! let plan = engine.plan(blueprint)?;
//! println!("{}", plan.to_text());
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`DataProvider`]: Reads the session and objects, executes statements
//! - [`Renderer`]: Turns changes into statements for a SQL dialect
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! Object kinds are described as data in a [`Registry`], so the engine
//! holds no per-kind logic.

pub mod blueprint;
pub mod compiler;
pub mod context;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod identifiers;
pub mod kind;
pub mod manifest;
pub mod planner;
pub mod registry;
pub mod remote;
pub mod resource;
pub mod types;
pub mod urn;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use blueprint::{Blueprint, FinalizedBlueprint};
pub use compiler::{Capability, RoleSelector, compile};
pub use context::{
    AutoConfirm, AutoDecline, CancelToken, ConfirmCallback, DataProvider, NoProgress,
    PrivilegeGrant, ProgressCallback, Renderer, SessionContext,
};
pub use diff::{ResourceDiff, compute_diffs};
pub use engine::{Engine, destroy_plan};
pub use error::{Error, ErrorCode, ProviderError, Result};
pub use executor::{check_session_user, execute, execute_simple};
pub use identifiers::ResourceName;
pub use kind::{Kind, SYSTEM_ROLES, Scope, is_system_role};
pub use manifest::Manifest;
pub use planner::{Change, Plan, PlanSummary, plan_changes};
pub use registry::{CompleteFn, FieldSpec, FieldType, IgnoreIf, KindSpec, RefTarget, Registry};
pub use remote::{RemoteFetcher, RemoteState};
pub use resource::{Placement, Resource, ResourceId};
pub use types::{
    Action, AttrMap, BlueprintConfig, ExecuteOptions, ExecuteSummary, RunMode, StatementOutcome,
};
pub use urn::{Fqn, Urn};
