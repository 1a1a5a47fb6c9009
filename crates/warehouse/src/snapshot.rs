//! Offline account state stored as JSON
//!
//! A snapshot holds the session probe and the attributes of every object,
//! keyed by URN. [`SnapshotProvider`] serves it through the data provider
//! contract so plans can be computed without a live connection. Executed
//! statements are recorded, not interpreted; [`SnapshotProvider::apply_plan`]
//! writes a plan's effects back into the snapshot.

use crate::error::{Error, Result};
use declarative::{
    Action, AttrMap, DataProvider, Fqn, Kind, Plan, ProviderError, SessionContext, Urn,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Account state at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub session: SessionContext,
    #[serde(default)]
    pub objects: BTreeMap<Urn, AttrMap>,
}

impl Snapshot {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            objects: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot = serde_json::from_str(&content).map_err(|source| Error::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded snapshot from {}", path.display());
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|source| Error::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Saved snapshot to {}", path.display());
        Ok(())
    }

    /// Add or replace an object
    pub fn insert(&mut self, urn: Urn, attrs: AttrMap) {
        self.objects.insert(urn, attrs);
    }

    /// Record the effect of every change in a plan
    pub fn apply_plan(&mut self, plan: &Plan) {
        for change in plan.changes() {
            match change.action {
                Action::Add => {
                    let attrs = change.after.clone().unwrap_or_else(|| change.delta.clone());
                    self.objects.insert(change.urn.clone(), attrs);
                }
                Action::Change | Action::Transfer => {
                    let entry = self.objects.entry(change.urn.clone()).or_default();
                    for (key, value) in &change.delta {
                        entry.insert(key.clone(), value.clone());
                    }
                }
                Action::Remove => {
                    if change.urn.kind == Kind::Grant && grant_priv(&change.urn) == Some("ALL") {
                        self.objects.retain(|urn, _| !same_grantee(urn, &change.urn));
                    }
                    self.objects.remove(&change.urn);
                }
            }
        }
    }

    /// Attributes of a grant of `ALL`, assembled from the individual
    /// privileges held by the same grantee on the same target
    fn aggregate_grant(&self, urn: &Urn) -> Option<AttrMap> {
        let held: Vec<&AttrMap> = self
            .objects
            .iter()
            .filter(|(other, _)| same_grantee(other, urn))
            .map(|(_, attrs)| attrs)
            .collect();
        let mut attrs = (*held.first()?).clone();

        let privs: BTreeSet<String> = held.iter().flat_map(|attrs| privileges_of(attrs)).collect();
        attrs.insert("priv".to_string(), Value::from("ALL"));
        attrs.insert(
            "_privs".to_string(),
            Value::from(privs.into_iter().collect::<Vec<_>>()),
        );
        Some(attrs)
    }
}

fn grant_priv(urn: &Urn) -> Option<&str> {
    urn.fqn.param("priv")
}

fn same_grantee(a: &Urn, b: &Urn) -> bool {
    a.kind == Kind::Grant && b.kind == Kind::Grant && a.fqn.name == b.fqn.name && a.fqn.param("on") == b.fqn.param("on")
}

fn privileges_of(attrs: &AttrMap) -> Vec<String> {
    match attrs.get("_privs") {
        Some(Value::Array(privs)) => privs
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => attrs
            .get("priv")
            .and_then(Value::as_str)
            .map(|p| vec![p.to_string()])
            .unwrap_or_default(),
    }
}

/// Data provider over a [`Snapshot`]
#[derive(Debug)]
pub struct SnapshotProvider {
    snapshot: Mutex<Snapshot>,
    executed: Mutex<Vec<String>>,
}

impl SnapshotProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(Snapshot::load(path)?))
    }

    fn state(&self) -> MutexGuard<'_, Snapshot> {
        match self.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.state().clone()
    }

    /// Record the effect of an applied plan
    pub fn apply_plan(&self, plan: &Plan) {
        self.state().apply_plan(plan);
    }

    /// Statements received so far
    pub fn executed(&self) -> Vec<String> {
        match self.executed.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DataProvider for SnapshotProvider {
    fn fetch_session(&self) -> std::result::Result<SessionContext, ProviderError> {
        Ok(self.state().session.clone())
    }

    fn fetch_resource(&self, urn: &Urn) -> std::result::Result<Option<AttrMap>, ProviderError> {
        let state = self.state();
        Ok(match state.objects.get(urn) {
            Some(attrs) => Some(attrs.clone()),
            None if urn.kind == Kind::Grant && grant_priv(urn) == Some("ALL") => state.aggregate_grant(urn),
            None => None,
        })
    }

    fn list_resource(&self, kind: Kind) -> std::result::Result<Vec<Fqn>, ProviderError> {
        Ok(self
            .state()
            .objects
            .keys()
            .filter(|urn| urn.kind == kind)
            .map(|urn| urn.fqn.clone())
            .collect())
    }

    fn execute(&self, statement: &str) -> std::result::Result<(), ProviderError> {
        log::debug!("snapshot: {}", statement);
        match self.executed.lock() {
            Ok(mut guard) => guard.push(statement.to_string()),
            Err(poisoned) => poisoned.into_inner().push(statement.to_string()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Change;
    use serde_json::json;

    fn urn(raw: &str) -> Urn {
        raw.parse().unwrap()
    }

    fn attrs(value: Value) -> AttrMap {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => AttrMap::new(),
        }
    }

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new(SessionContext::new("ABC123", "ADMIN", "ACCOUNTADMIN"));
        snapshot.insert(
            urn("urn::ABC123:grant/R?priv=USAGE&on=database/DB"),
            attrs(json!({"priv": "USAGE", "on_type": "database", "on": "DB", "to": "R"})),
        );
        snapshot.insert(
            urn("urn::ABC123:grant/R?priv=MONITOR&on=database/DB"),
            attrs(json!({"priv": "MONITOR", "on_type": "database", "on": "DB", "to": "R"})),
        );
        snapshot.insert(urn("urn::ABC123:role/R"), attrs(json!({"name": "R"})));
        snapshot
    }

    #[test]
    fn test_grant_of_all_is_aggregated() {
        let provider = SnapshotProvider::new(snapshot());
        let all = provider
            .fetch_resource(&urn("urn::ABC123:grant/R?priv=ALL&on=database/DB"))
            .unwrap()
            .unwrap();
        assert_eq!(all["priv"], json!("ALL"));
        assert_eq!(all["_privs"], json!(["MONITOR", "USAGE"]));

        let single = provider
            .fetch_resource(&urn("urn::ABC123:grant/R?priv=USAGE&on=database/DB"))
            .unwrap()
            .unwrap();
        assert!(!single.contains_key("_privs"));
        assert!(
            provider
                .fetch_resource(&urn("urn::ABC123:grant/OTHER?priv=ALL&on=database/DB"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_list_by_kind() {
        let provider = SnapshotProvider::new(snapshot());
        assert_eq!(provider.list_resource(Kind::Grant).unwrap().len(), 2);
        assert_eq!(provider.list_resource(Kind::Role).unwrap(), vec![Fqn::new("R")]);
    }

    #[test]
    fn test_apply_plan() {
        let mut snapshot = snapshot();
        let role = urn("urn::ABC123:role/R");
        snapshot.apply_plan(&Plan::new(vec![
            Change {
                action: Action::Change,
                urn: role.clone(),
                before: None,
                after: None,
                delta: attrs(json!({"comment": "new"})),
            },
            Change {
                action: Action::Remove,
                urn: urn("urn::ABC123:grant/R?priv=ALL&on=database/DB"),
                before: None,
                after: None,
                delta: AttrMap::new(),
            },
        ]));
        assert_eq!(snapshot.objects[&role]["comment"], json!("new"));
        assert_eq!(snapshot.objects.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.json");
        snapshot().save(&path).unwrap();
        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.objects.len(), 3);
        assert_eq!(loaded.session.account_locator, "ABC123");
    }

    #[test]
    fn test_executed_statements_are_recorded() {
        let provider = SnapshotProvider::new(snapshot());
        provider.execute("CREATE ROLE X").unwrap();
        assert_eq!(provider.executed(), vec!["CREATE ROLE X"]);
        assert!(provider.fetch_resource(&urn("urn::ABC123:role/X")).unwrap().is_none());
    }
}
