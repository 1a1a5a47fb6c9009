//! Plan construction: delta filtering, ordering and run-mode gates

use crate::diff::{DiffKind, ResourceDiff, compute_diffs};
use crate::error::{Error, Result};
use crate::kind::{Kind, Scope};
use crate::manifest::Manifest;
use crate::registry::Registry;
use crate::remote::RemoteState;
use crate::types::{Action, AttrMap, BlueprintConfig, RunMode};
use crate::urn::{Fqn, Urn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::fmt::Write as _;

/// Kinds that may not be reconciled in SYNC mode
const SYNC_EXCLUDED_KINDS: &[Kind] = &[
    Kind::Grant,
    Kind::FutureGrant,
    Kind::GrantOnAll,
    Kind::Role,
    Kind::User,
    Kind::Table,
];

/// One planned operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub action: Action,
    pub urn: Urn,
    pub before: Option<AttrMap>,
    pub after: Option<AttrMap>,
    pub delta: AttrMap,
}

impl Change {
    pub fn kind(&self) -> Kind {
        self.urn.kind
    }
}

/// Ordered list of changes that moves the account to the blueprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    changes: Vec<Change>,
}

/// Counts per action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub additions: usize,
    pub changes: usize,
    pub transfers: usize,
    pub removals: usize,
}

impl PlanSummary {
    pub fn total(&self) -> usize {
        self.additions + self.changes + self.transfers + self.removals
    }
}

impl Plan {
    pub fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for change in &self.changes {
            match change.action {
                Action::Add => summary.additions += 1,
                Action::Change => summary.changes += 1,
                Action::Transfer => summary.transfers += 1,
                Action::Remove => summary.removals += 1,
            }
        }
        summary
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Human-readable dump of every change
    pub fn to_text(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "» Plan: {} to add, {} to change, {} to destroy.",
            summary.additions,
            summary.changes + summary.transfers,
            summary.removals
        );

        for change in &self.changes {
            out.push('\n');
            let (header, rows): (String, Vec<(String, String)>) = match change.action {
                Action::Add => (
                    format!("+ {}", change.urn),
                    change
                        .delta
                        .iter()
                        .map(|(k, v)| (k.clone(), render_value(v)))
                        .collect(),
                ),
                Action::Remove => (
                    format!("- {}", change.urn),
                    change
                        .before
                        .iter()
                        .flatten()
                        .map(|(k, v)| (k.clone(), render_value(v)))
                        .collect(),
                ),
                Action::Change | Action::Transfer => {
                    let header = if change.action == Action::Transfer {
                        format!("~ {} (transfer)", change.urn)
                    } else {
                        format!("~ {}", change.urn)
                    };
                    let rows = change
                        .delta
                        .iter()
                        .map(|(k, v)| {
                            let old = change
                                .before
                                .as_ref()
                                .and_then(|b| b.get(k))
                                .unwrap_or(&Value::Null);
                            (k.clone(), format!("{} → {}", render_value(old), render_value(v)))
                        })
                        .collect();
                    (header, rows)
                }
            };

            let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            let _ = writeln!(out, "{} {{", header);
            for (key, value) in rows {
                let _ = writeln!(out, "  {:width$} = {}", key, value, width = width);
            }
            let _ = writeln!(out, "}}");
        }
        out
    }
}

fn render_value(value: &Value) -> String {
    value.to_string()
}

/// Build a plan from desired and remote state
pub fn plan_changes(
    manifest: &Manifest,
    remote: &RemoteState,
    registry: &Registry,
    config: &BlueprintConfig,
) -> Result<Plan> {
    let diffs = compute_diffs(manifest, remote, registry)?;

    let mut changes = Vec::new();
    for diff in diffs {
        changes.extend(filter_diff(diff, registry, config)?);
    }

    let order = dependency_order(manifest, remote)?;
    let changes = order_changes(changes, &order);

    let violations = check_run_mode(&changes, config);
    if !violations.is_empty() {
        return Err(Error::NonConformingPlan {
            run_mode: config.run_mode,
            violations,
        });
    }

    log::info!("planned {} changes", changes.len());
    Ok(Plan::new(changes))
}

/// Every URN the plan may touch, sorted so dependencies come first
///
/// Reference endpoints that are neither declared nor fetched (implicit
/// `PUBLIC` schemas, pointers to existing objects) stay in the graph so
/// ordering through them is kept.
fn dependency_order(manifest: &Manifest, remote: &RemoteState) -> Result<Vec<Urn>> {
    let mut nodes: BTreeSet<Urn> = manifest
        .resources
        .keys()
        .chain(remote.keys())
        .cloned()
        .collect();
    for (from, to) in &manifest.refs {
        nodes.insert(from.clone());
        nodes.insert(to.clone());
    }
    let mut edges = manifest.refs.clone();
    edges.extend(containment_edges(&nodes));
    topological_sort(&nodes, &edges)
}

/// Turn a raw diff into zero, one or two changes
fn filter_diff(diff: ResourceDiff, registry: &Registry, config: &BlueprintConfig) -> Result<Vec<Change>> {
    let ResourceDiff {
        urn,
        kind,
        before,
        after,
        mut delta,
    } = diff;

    match kind {
        DiffKind::Add => {
            return Ok(vec![Change {
                action: Action::Add,
                urn,
                before,
                after,
                delta,
            }]);
        }
        DiffKind::Remove => {
            return Ok(vec![Change {
                action: Action::Remove,
                urn,
                before,
                after,
                delta,
            }]);
        }
        DiffKind::Change => {}
    }

    let spec = registry.get(urn.kind)?;

    let replaced: Vec<String> = delta
        .keys()
        .filter(|k| spec.get_field(k).is_some_and(|f| f.triggers_replacement))
        .cloned()
        .collect();
    if !replaced.is_empty() {
        return Err(Error::MarkedForReplacement {
            urn: urn.to_string(),
            fields: replaced,
        });
    }

    let forced = delta
        .keys()
        .any(|k| spec.get_field(k).is_some_and(|f| f.forces_add));

    let owner = delta.remove("owner");
    delta.retain(|key, value| match spec.get_field(key) {
        Some(field) => field.fetchable && !field.is_ignored(value),
        None => false,
    });

    // Grants cannot be altered; any remaining difference is granted again
    if forced || (spec.grant_like && !delta.is_empty()) {
        let delta = after.clone().unwrap_or_default();
        return Ok(vec![Change {
            action: Action::Add,
            urn,
            before,
            after,
            delta,
        }]);
    }

    let mut changes = Vec::new();
    if !delta.is_empty() {
        changes.push(Change {
            action: Action::Change,
            urn: urn.clone(),
            before: before.clone(),
            after: after.clone(),
            delta,
        });
    }
    if let Some(owner) = owner
        && !config.ignore_ownership
    {
        let mut delta = AttrMap::new();
        delta.insert("owner".to_string(), owner);
        changes.push(Change {
            action: Action::Transfer,
            urn,
            before,
            after,
            delta,
        });
    }
    Ok(changes)
}

/// Edges from every object to its database or schema, so remote-only
/// objects are also removed before their containers
fn containment_edges(nodes: &BTreeSet<Urn>) -> Vec<(Urn, Urn)> {
    let mut edges = Vec::new();
    for urn in nodes {
        let Some(database) = &urn.fqn.database else {
            continue;
        };
        let container = match &urn.fqn.schema {
            Some(schema) if urn.kind.scope() == Scope::Schema => {
                urn.sibling(Kind::Schema, Fqn::new(schema).in_database(database))
            }
            _ if urn.kind.scope() == Scope::Database => urn.sibling(Kind::Database, Fqn::new(database)),
            _ => continue,
        };
        edges.push((urn.clone(), container));
    }
    edges
}

/// Kahn's algorithm with ties broken by URN text, so output is deterministic.
/// An edge `(a, b)` means `a` depends on `b`; `b` sorts first. Edges to URNs
/// outside `nodes` are ignored.
pub fn topological_sort(nodes: &BTreeSet<Urn>, edges: &BTreeSet<(Urn, Urn)>) -> Result<Vec<Urn>> {
    let keys: Vec<(String, &Urn)> = nodes.iter().map(|u| (u.to_string(), u)).collect();
    let index: HashMap<&Urn, usize> = keys.iter().enumerate().map(|(i, (_, u))| (*u, i)).collect();

    let mut in_degree = vec![0usize; keys.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];
    for (from, to) in edges {
        let (Some(&from), Some(&to)) = (index.get(from), index.get(to)) else {
            continue;
        };
        if from == to {
            continue;
        }
        dependents[to].push(from);
        in_degree[from] += 1;
    }

    let mut ready: BinaryHeap<Reverse<(&str, usize)>> = keys
        .iter()
        .enumerate()
        .filter(|(i, _)| in_degree[*i] == 0)
        .map(|(i, (key, _))| Reverse((key.as_str(), i)))
        .collect();

    let mut sorted = Vec::with_capacity(keys.len());
    while let Some(Reverse((_, i))) = ready.pop() {
        sorted.push(keys[i].1.clone());
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse((keys[dependent].0.as_str(), dependent)));
            }
        }
    }

    if sorted.len() != keys.len() {
        let urns = keys
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, (key, _))| key.clone())
            .collect();
        return Err(Error::CyclicDependency { urns });
    }
    Ok(sorted)
}

/// Creates, changes and transfers in dependency order, then removals in
/// reverse dependency order
fn order_changes(changes: Vec<Change>, order: &[Urn]) -> Vec<Change> {
    let position: HashMap<&Urn, usize> = order.iter().enumerate().map(|(i, u)| (u, i)).collect();
    let rank = |change: &Change| position.get(&change.urn).copied().unwrap_or(usize::MAX);

    let (mut removals, mut others): (Vec<Change>, Vec<Change>) = changes
        .into_iter()
        .partition(|c| c.action == Action::Remove);

    others.sort_by_key(|c| (rank(c), c.action == Action::Transfer));
    removals.sort_by_key(|c| Reverse(rank(c)));
    others.extend(removals);
    others
}

/// Violations of the run mode and allowlist, in plan order
fn check_run_mode(changes: &[Change], config: &BlueprintConfig) -> Vec<String> {
    let mut violations = Vec::new();

    match config.run_mode {
        RunMode::CreateOrUpdate => {
            for change in changes {
                match change.action {
                    Action::Remove => violations.push(format!(
                        "create-or-update mode does not allow removing resources (ref: {})",
                        change.urn
                    )),
                    Action::Transfer => violations.push(format!(
                        "create-or-update mode does not allow changing ownership (ref: {})",
                        change.urn
                    )),
                    Action::Change if change.delta.contains_key("name") => violations.push(format!(
                        "create-or-update mode does not allow renaming resources (ref: {})",
                        change.urn
                    )),
                    _ => {}
                }
            }
        }
        RunMode::Sync => {
            if config.allowlist.is_empty() {
                violations.push("sync mode requires an allowlist".to_string());
            }
            for kind in &config.allowlist {
                if SYNC_EXCLUDED_KINDS.contains(kind) {
                    violations.push(format!("sync mode does not support {} in the allowlist", kind));
                }
            }
        }
        RunMode::SyncAll => {
            if config.allowlist.is_empty() {
                violations.push("sync-all mode requires an allowlist".to_string());
            }
            for change in changes {
                if change.action == Action::Remove
                    && change.urn.kind == Kind::Schema
                    && change.urn.name().matches("INFORMATION_SCHEMA")
                {
                    violations.push(format!(
                        "sync-all mode does not allow removing INFORMATION_SCHEMA (ref: {})",
                        change.urn
                    ));
                }
            }
        }
    }

    for change in changes {
        if !config.allows(change.kind()) {
            violations.push(format!(
                "{} is not in the allowlist (ref: {})",
                change.kind(),
                change.urn
            ));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;
    use crate::testing::{attrs, fixture_registry, urn};
    use serde_json::json;

    fn manifest_of(registry: &Registry, entries: &[(&str, Value)]) -> Manifest {
        let mut manifest = Manifest::default();
        for (raw, value) in entries {
            let urn = urn(raw);
            let spec = registry.get(urn.kind).unwrap();
            manifest.urns.push(urn.clone());
            manifest.resources.insert(
                urn.clone(),
                ManifestEntry {
                    kind: urn.kind,
                    attrs: spec.normalize(attrs(value.clone())),
                    implicit: false,
                },
            );
        }
        manifest
    }

    fn remote_of(registry: &Registry, entries: &[(&str, Value)]) -> RemoteState {
        entries
            .iter()
            .map(|(raw, value)| {
                let urn = urn(raw);
                let spec = registry.get(urn.kind).unwrap();
                (urn, spec.normalize(attrs(value.clone())))
            })
            .collect()
    }

    #[test]
    fn test_topological_sort_breaks_ties_by_urn() {
        let nodes: BTreeSet<Urn> = [
            "urn::A:role/B",
            "urn::A:role/A",
            "urn::A:database/DB",
            "urn::A:schema/DB.S",
        ]
        .iter()
        .map(|u| urn(u))
        .collect();
        let edges: BTreeSet<(Urn, Urn)> =
            [(urn("urn::A:schema/DB.S"), urn("urn::A:database/DB"))].into_iter().collect();

        let sorted: Vec<String> = topological_sort(&nodes, &edges)
            .unwrap()
            .iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            sorted,
            vec!["urn::A:database/DB", "urn::A:role/A", "urn::A:role/B", "urn::A:schema/DB.S"]
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let a = urn("urn::A:role/A");
        let b = urn("urn::A:role/B");
        let nodes: BTreeSet<Urn> = [a.clone(), b.clone()].into_iter().collect();
        let edges: BTreeSet<(Urn, Urn)> = [(a.clone(), b.clone()), (b, a)].into_iter().collect();
        match topological_sort(&nodes, &edges) {
            Err(Error::CyclicDependency { urns }) => assert_eq!(urns.len(), 2),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_creates_follow_dependencies_and_drops_reverse() {
        let registry = fixture_registry();
        let mut manifest = manifest_of(
            &registry,
            &[
                ("urn::ABC123:schema/DB.RAW", json!({"name": "RAW"})),
                ("urn::ABC123:database/DB", json!({"name": "DB"})),
            ],
        );
        manifest.refs.insert((urn("urn::ABC123:schema/DB.RAW"), urn("urn::ABC123:database/DB")));
        let remote = remote_of(
            &registry,
            &[
                ("urn::ABC123:database/OLD", json!({"name": "OLD"})),
                ("urn::ABC123:schema/OLD.STALE", json!({"name": "STALE"})),
            ],
        );
        let config = BlueprintConfig {
            run_mode: RunMode::SyncAll,
            allowlist: vec![Kind::Database, Kind::Schema],
            ..Default::default()
        };

        let plan = plan_changes(&manifest, &remote, &registry, &config).unwrap();
        let order: Vec<(Action, String)> = plan
            .changes()
            .iter()
            .map(|c| (c.action, c.urn.to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Action::Add, "urn::ABC123:database/DB".to_string()),
                (Action::Add, "urn::ABC123:schema/DB.RAW".to_string()),
                (Action::Remove, "urn::ABC123:schema/OLD.STALE".to_string()),
                (Action::Remove, "urn::ABC123:database/OLD".to_string()),
            ]
        );
    }

    #[test]
    fn test_order_follows_refs_through_undeclared_nodes() {
        let registry = fixture_registry();
        let mut manifest = manifest_of(
            &registry,
            &[
                ("urn::ABC123:role/A_READER", json!({"name": "A_READER"})),
                ("urn::ABC123:role/Z_OWNER", json!({"name": "Z_OWNER"})),
            ],
        );
        let public = urn("urn::ABC123:schema/DB.PUBLIC");
        manifest.refs.insert((urn("urn::ABC123:role/A_READER"), public.clone()));
        manifest.refs.insert((public, urn("urn::ABC123:role/Z_OWNER")));

        let plan = plan_changes(&manifest, &RemoteState::new(), &registry, &BlueprintConfig::default()).unwrap();
        let order: Vec<String> = plan.changes().iter().map(|c| c.urn.to_string()).collect();
        assert_eq!(order, vec!["urn::ABC123:role/Z_OWNER", "urn::ABC123:role/A_READER"]);
    }

    #[test]
    fn test_objects_in_implicit_schema_follow_their_database() {
        let registry = fixture_registry();
        let mut manifest = manifest_of(
            &registry,
            &[
                ("urn::ABC123:table/DB.PUBLIC.EVENTS", json!({"name": "EVENTS"})),
                ("urn::ABC123:database/DB", json!({"name": "DB"})),
            ],
        );
        let public = urn("urn::ABC123:schema/DB.PUBLIC");
        manifest.refs.insert((urn("urn::ABC123:table/DB.PUBLIC.EVENTS"), public));

        let order: Vec<String> = dependency_order(&manifest, &RemoteState::new())
            .unwrap()
            .iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "urn::ABC123:database/DB",
                "urn::ABC123:schema/DB.PUBLIC",
                "urn::ABC123:table/DB.PUBLIC.EVENTS",
            ]
        );
    }

    #[test]
    fn test_owner_change_becomes_transfer_after_change() {
        let registry = fixture_registry();
        let manifest = manifest_of(
            &registry,
            &[("urn::ABC123:role/R", json!({"name": "R", "owner": "SECURITYADMIN", "comment": "new"}))],
        );
        let remote = remote_of(
            &registry,
            &[("urn::ABC123:role/R", json!({"name": "R", "owner": "USERADMIN"}))],
        );
        let config = BlueprintConfig {
            run_mode: RunMode::SyncAll,
            allowlist: vec![Kind::Role],
            ..Default::default()
        };

        let plan = plan_changes(&manifest, &remote, &registry, &config).unwrap();
        let actions: Vec<Action> = plan.changes().iter().map(|c| c.action).collect();
        assert_eq!(actions, vec![Action::Change, Action::Transfer]);
        assert_eq!(plan.changes()[0].delta, attrs(json!({"comment": "new"})));
        assert_eq!(plan.changes()[1].delta, attrs(json!({"owner": "SECURITYADMIN"})));

        let ignoring = BlueprintConfig {
            ignore_ownership: true,
            ..config
        };
        let plan = plan_changes(&manifest, &remote, &registry, &ignoring).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_create_or_update_rejects_transfer_and_remove() {
        let registry = fixture_registry();
        let manifest = manifest_of(
            &registry,
            &[("urn::ABC123:role/R", json!({"name": "R", "owner": "SECURITYADMIN"}))],
        );
        let remote = remote_of(
            &registry,
            &[
                ("urn::ABC123:role/R", json!({"name": "R", "owner": "USERADMIN"})),
                ("urn::ABC123:role/EXTRA", json!({"name": "EXTRA"})),
            ],
        );
        match plan_changes(&manifest, &remote, &registry, &BlueprintConfig::default()) {
            Err(Error::NonConformingPlan { violations, .. }) => {
                assert_eq!(violations.len(), 2);
                assert!(violations[0].contains("urn::ABC123:role/R"));
                assert!(violations[1].contains("urn::ABC123:role/EXTRA"));
            }
            other => panic!("expected a non-conforming plan, got {other:?}"),
        }
    }

    #[test]
    fn test_sync_rejects_excluded_kinds() {
        let registry = fixture_registry();
        let config = BlueprintConfig {
            run_mode: RunMode::Sync,
            allowlist: vec![Kind::Role],
            ..Default::default()
        };
        let err = plan_changes(&Manifest::default(), &RemoteState::new(), &registry, &config)
            .unwrap_err();
        assert!(err.to_string().contains("sync mode does not support role"));

        let config = BlueprintConfig {
            run_mode: RunMode::SyncAll,
            ..Default::default()
        };
        assert!(plan_changes(&Manifest::default(), &RemoteState::new(), &registry, &config).is_err());
    }

    #[test]
    fn test_allowlist_rejects_other_kinds() {
        let registry = fixture_registry();
        let manifest = manifest_of(&registry, &[("urn::ABC123:role/R", json!({"name": "R"}))]);
        let config = BlueprintConfig {
            allowlist: vec![Kind::Database],
            ..Default::default()
        };
        let err = plan_changes(&manifest, &RemoteState::new(), &registry, &config).unwrap_err();
        assert!(err.to_string().contains("role is not in the allowlist"));
    }

    #[test]
    fn test_replacement_fields_fail() {
        let registry = fixture_registry();
        let manifest = manifest_of(
            &registry,
            &[("urn::ABC123:database/DB", json!({"name": "DB", "transient": true}))],
        );
        let remote = remote_of(&registry, &[("urn::ABC123:database/DB", json!({"name": "DB"}))]);
        match plan_changes(&manifest, &remote, &registry, &BlueprintConfig::default()) {
            Err(Error::MarkedForReplacement { fields, .. }) => assert_eq!(fields, vec!["transient"]),
            other => panic!("expected replacement error, got {other:?}"),
        }
    }

    #[test]
    fn test_forces_add_field() {
        let registry = fixture_registry();
        let grant = "urn::ABC123:grant/R?priv=ALL&on=database/DB";
        let desired = json!({"priv": "ALL", "on_type": "DATABASE", "on": "DB", "to": "R", "_privs": ["CREATE SCHEMA", "USAGE"]});
        let current = json!({"priv": "ALL", "on_type": "DATABASE", "on": "DB", "to": "R", "_privs": ["USAGE"]});
        let manifest = manifest_of(&registry, &[(grant, desired)]);
        let remote = remote_of(&registry, &[(grant, current)]);

        let plan = plan_changes(&manifest, &remote, &registry, &BlueprintConfig::default()).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.changes()[0].action, Action::Add);
        assert_eq!(plan.changes()[0].delta["priv"], json!("ALL"));
    }

    #[test]
    fn test_grant_difference_is_granted_again() {
        let registry = fixture_registry();
        let grant = "urn::ABC123:grant/R?priv=USAGE&on=database/DB";
        let manifest = manifest_of(
            &registry,
            &[(grant, json!({"priv": "USAGE", "on_type": "database", "on": "DB", "to": "R", "_privs": ["USAGE"]}))],
        );

        let same_but_case = remote_of(
            &registry,
            &[(grant, json!({"priv": "usage", "on_type": "DATABASE", "on": "db", "to": "r", "_privs": ["USAGE"]}))],
        );
        let plan = plan_changes(&manifest, &same_but_case, &registry, &BlueprintConfig::default()).unwrap();
        assert!(plan.is_empty());

        let elsewhere = remote_of(
            &registry,
            &[(grant, json!({"priv": "USAGE", "on_type": "DATABASE", "on": "OTHER", "to": "R", "_privs": ["USAGE"]}))],
        );
        let plan = plan_changes(&manifest, &elsewhere, &registry, &BlueprintConfig::default()).unwrap();
        let actions: Vec<Action> = plan.changes().iter().map(|c| c.action).collect();
        assert_eq!(actions, vec![Action::Add]);
    }

    #[test]
    fn test_unfetchable_fields_are_not_diffed() {
        let registry = fixture_registry();
        let manifest = manifest_of(
            &registry,
            &[("urn::ABC123:user/U", json!({"name": "U", "password": "hunter2"}))],
        );
        let remote = remote_of(&registry, &[("urn::ABC123:user/U", json!({"name": "U"}))]);
        let plan = plan_changes(&manifest, &remote, &registry, &BlueprintConfig::default()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_text_dump() {
        let plan = Plan::new(vec![
            Change {
                action: Action::Add,
                urn: urn("urn::ABC123:role/R"),
                before: None,
                after: Some(attrs(json!({"name": "R", "comment": null}))),
                delta: attrs(json!({"name": "R", "comment": null})),
            },
            Change {
                action: Action::Transfer,
                urn: urn("urn::ABC123:warehouse/WH"),
                before: Some(attrs(json!({"owner": "SYSADMIN"}))),
                after: Some(attrs(json!({"owner": "R"}))),
                delta: attrs(json!({"owner": "R"})),
            },
        ]);
        let text = plan.to_text();
        assert!(text.starts_with("» Plan: 1 to add, 1 to change, 0 to destroy."));
        assert!(text.contains("+ urn::ABC123:role/R {\n  comment = null\n  name    = \"R\"\n}"));
        assert!(text.contains("~ urn::ABC123:warehouse/WH (transfer) {\n  owner = \"SYSADMIN\" → \"R\"\n}"));
    }

    #[test]
    fn test_json_round_trip() {
        let plan = Plan::new(vec![Change {
            action: Action::Remove,
            urn: urn("urn::ABC123:role/R"),
            before: Some(attrs(json!({"name": "R"}))),
            after: None,
            delta: AttrMap::new(),
        }]);
        let json = plan.to_json().unwrap();
        assert!(json.contains("\"action\": \"remove\""));
        assert!(json.contains("\"after\": null"));
        assert_eq!(Plan::from_json(&json).unwrap(), plan);
        assert_eq!(plan.summary().removals, 1);
    }
}
