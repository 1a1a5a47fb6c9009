//! Session context and provider traits
//!
//! These traits let the engine run without depending on a particular
//! warehouse driver, SQL dialect or UI.

use crate::error::ProviderError;
use crate::identifiers::ResourceName;
use crate::kind::Kind;
use crate::types::{AttrMap, StatementOutcome};
use crate::urn::{Fqn, Urn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A privilege held by a role: `(privilege, on)` where `on` is `account`
/// or `<kind_label>/<fqn>` (e.g. `database/ANALYTICS`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrivilegeGrant {
    pub privilege: String,
    pub on: String,
}

impl PrivilegeGrant {
    pub fn new(privilege: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            privilege: privilege.into().to_ascii_uppercase(),
            on: on.into(),
        }
    }
}

/// Who and where the engine is running, as probed from the warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub account: String,
    pub account_locator: String,
    pub user: ResourceName,
    pub role: ResourceName,
    /// Current database, used to place resources declared without one
    #[serde(default)]
    pub database: Option<ResourceName>,
    #[serde(default)]
    pub available_roles: Vec<ResourceName>,
    #[serde(default)]
    pub role_privileges: BTreeMap<ResourceName, Vec<PrivilegeGrant>>,
}

impl SessionContext {
    pub fn new(
        account_locator: impl Into<String>,
        user: impl Into<ResourceName>,
        role: impl Into<ResourceName>,
    ) -> Self {
        let role = role.into();
        Self {
            org: String::new(),
            account: String::new(),
            account_locator: account_locator.into(),
            user: user.into(),
            available_roles: vec![role.clone()],
            role,
            database: None,
            role_privileges: BTreeMap::new(),
        }
    }

    /// Whether the session can `USE ROLE` the given role
    pub fn can_use_role(&self, role: &ResourceName) -> bool {
        self.role == *role || self.available_roles.contains(role)
    }

    /// Roles the session can switch to, current role included
    pub fn usable_roles(&self) -> Vec<ResourceName> {
        let mut roles = self.available_roles.clone();
        if !roles.contains(&self.role) {
            roles.push(self.role.clone());
        }
        roles.sort();
        roles
    }

    /// URN for an object in this session's account
    pub fn urn(&self, kind: Kind, fqn: Fqn) -> Urn {
        Urn::new(self.account_locator.clone(), kind, fqn).with_org(self.org.clone())
    }
}

/// Adapter that reads from and writes to a warehouse account
pub trait DataProvider: Send + Sync {
    /// Probe the current session: account, user, role and role privileges
    fn fetch_session(&self) -> Result<SessionContext, ProviderError>;

    /// Fetch attributes of one object, `None` if it does not exist
    ///
    /// Unknown keys are dropped and missing ones defaulted by the registry.
    /// Attributes a kind derives with [`KindSpec::completed_by`] (such as the
    /// `_privs` of a grant) may be left out.
    ///
    /// [`KindSpec::completed_by`]: crate::registry::KindSpec::completed_by
    fn fetch_resource(&self, urn: &Urn) -> Result<Option<AttrMap>, ProviderError>;

    /// Enumerate every live object of a kind
    fn list_resource(&self, kind: Kind) -> Result<Vec<Fqn>, ProviderError>;

    /// Run one statement
    fn execute(&self, statement: &str) -> Result<(), ProviderError>;
}

/// Emits DDL text for changes. Implementations own the SQL dialect.
pub trait Renderer {
    /// `CREATE ...` (or `GRANT ...` for grant-like kinds)
    fn create(&self, urn: &Urn, attrs: &AttrMap) -> String;

    /// `ALTER ...` statements applying a sparse delta
    ///
    /// A null in the delta clears the attribute. Renames, set values and
    /// cleared values may each need their own statement; every key of the
    /// delta must be covered by one of them.
    fn alter(&self, urn: &Urn, before: &AttrMap, delta: &AttrMap) -> Vec<String>;

    /// `DROP ... IF EXISTS` (or `REVOKE ...` for grant-like kinds)
    fn drop(&self, urn: &Urn, attrs: &AttrMap) -> String;

    /// `GRANT OWNERSHIP ON ... TO ROLE ...`
    fn transfer(&self, urn: &Urn, to_role: &ResourceName) -> String;
}

/// Cooperative cancellation flag shared between caller and engine
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next statement or fetch
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callback for execution
///
/// Implement this trait to receive progress updates while statements run.
pub trait ProgressCallback: Send {
    /// Called once before the first statement
    fn on_start(&mut self, total: usize);

    /// Called before a statement is sent
    fn on_statement_start(&mut self, index: usize, statement: &str);

    /// Called after a statement finishes
    fn on_statement_complete(&mut self, statement: &str, outcome: &StatementOutcome);

    /// Called once after the last statement
    fn on_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    fn confirm(&mut self, prompt: &str) -> Result<bool, ProviderError>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_start(&mut self, _total: usize) {}
    fn on_statement_start(&mut self, _index: usize, _statement: &str) {}
    fn on_statement_complete(&mut self, _statement: &str, _outcome: &StatementOutcome) {}
    fn on_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool, ProviderError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_usable_roles_include_current() {
        let mut session = SessionContext::new("ABC123", "ME", "SYSADMIN");
        session.available_roles = vec![ResourceName::new("USERADMIN")];
        let roles = session.usable_roles();
        assert_eq!(roles.len(), 2);
        assert!(session.can_use_role(&ResourceName::new("sysadmin")));
        assert!(!session.can_use_role(&ResourceName::new("ACCOUNTADMIN")));
    }

    #[test]
    fn test_session_deserializes_with_defaults() {
        let session: SessionContext = serde_json::from_str(
            r#"{"account_locator": "ABC123", "user": "me", "role": "SYSADMIN",
                "role_privileges": {"analyst": [{"privilege": "usage", "on": "database/DB"}]}}"#,
        )
        .unwrap();
        assert_eq!(session.user, ResourceName::new("ME"));
        assert!(session.available_roles.is_empty());
        assert_eq!(
            session.role_privileges[&ResourceName::new("ANALYST")][0].privilege,
            "usage"
        );
    }
}
