//! Desired state derived from a finalized blueprint

use crate::blueprint::FinalizedBlueprint;
use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::identifiers::parse_identifier;
use crate::kind::{Kind, is_system_role};
use crate::registry::Registry;
use crate::resource::ResourceId;
use crate::types::{AttrMap, BlueprintConfig, RunMode};
use crate::urn::{Fqn, Urn};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Desired attributes of one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub kind: Kind,
    pub attrs: AttrMap,
    /// Created with its container rather than declared
    pub implicit: bool,
}

/// Desired state of every managed resource, with its dependency edges
#[derive(Debug, Clone, Default, Serialize)]
pub struct Manifest {
    pub resources: BTreeMap<Urn, ManifestEntry>,
    /// `(from, to)`: `from` depends on `to`
    pub refs: BTreeSet<(Urn, Urn)>,
    /// URNs in declaration order
    pub urns: Vec<Urn>,
}

impl Manifest {
    /// Collect concrete resources, fill defaults and derive reference edges
    pub fn build(
        tree: &FinalizedBlueprint,
        registry: &Registry,
        session: &SessionContext,
        config: &BlueprintConfig,
    ) -> Result<Self> {
        let included: Vec<(ResourceId, Urn)> = tree
            .ids()
            .filter(|id| !tree.is_pointer(*id))
            .filter(|id| {
                !tree.is_implicit(*id)
                    || (config.run_mode == RunMode::SyncAll
                        && config.allowlist.contains(&tree.kind(*id)))
            })
            .map(|id| Ok((id, tree.urn(id, registry, session)?)))
            .collect::<Result<_>>()?;

        let managed_roles: BTreeSet<&Urn> = included
            .iter()
            .map(|(_, urn)| urn)
            .filter(|urn| matches!(urn.kind, Kind::Role | Kind::DatabaseRole))
            .collect();

        let mut manifest = Manifest::default();
        for (id, urn) in &included {
            let spec = registry.get(urn.kind)?;
            let mut attrs = tree.attrs(*id).clone();
            spec.check_fields(&urn.to_string(), &attrs)?;
            if spec.get_field("name").is_some()
                && let Some(name) = tree.name(*id)
            {
                attrs.insert("name".to_string(), Value::String(name.to_string()));
            }
            let attrs = spec.normalize(attrs);

            if let Some(existing) = manifest.resources.get(urn) {
                if existing.attrs != attrs {
                    return Err(Error::DuplicateResource {
                        urn: urn.to_string(),
                    });
                }
                continue;
            }

            if let Some(owner) = attrs.get("owner").and_then(Value::as_str) {
                let owner_urn = owner_urn(owner, session)?;
                if managed_roles.contains(&owner_urn) {
                    manifest.refs.insert((urn.clone(), owner_urn));
                } else if owner_urn.kind == Kind::DatabaseRole
                    || (!is_system_role(owner_urn.name()) && !session.can_use_role(owner_urn.name()))
                {
                    return Err(Error::InvalidOwner {
                        urn: urn.to_string(),
                        owner: owner.to_string(),
                    });
                }
            }

            for target in tree.refs(*id, registry, session)? {
                manifest.refs.insert((urn.clone(), target));
            }

            manifest.resources.insert(
                urn.clone(),
                ManifestEntry {
                    kind: urn.kind,
                    attrs,
                    implicit: tree.is_implicit(*id),
                },
            );
            manifest.urns.push(urn.clone());
        }

        log::debug!(
            "manifest has {} resources and {} references",
            manifest.resources.len(),
            manifest.refs.len()
        );
        Ok(manifest)
    }

    pub fn contains(&self, urn: &Urn) -> bool {
        self.resources.contains_key(urn)
    }

    pub fn get(&self, urn: &Urn) -> Option<&ManifestEntry> {
        self.resources.get(urn)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// URNs this resource depends on
    pub fn dependencies<'a>(&'a self, urn: &'a Urn) -> impl Iterator<Item = &'a Urn> + 'a {
        self.refs
            .iter()
            .filter(move |(from, _)| from == urn)
            .map(|(_, to)| to)
    }
}

/// `owner` is a role name or, for database roles, `DB.ROLE`
fn owner_urn(owner: &str, session: &SessionContext) -> Result<Urn> {
    let mut parts = parse_identifier(owner)?;
    let name = parts
        .pop()
        .ok_or_else(|| Error::InvalidName(owner.to_string()))?;
    match parts.as_slice() {
        [] => Ok(session.urn(Kind::Role, Fqn::new(name))),
        [database] => Ok(session.urn(Kind::DatabaseRole, Fqn::new(name).in_database(database))),
        _ => Err(Error::InvalidName(owner.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::Blueprint;
    use crate::resource::Resource;
    use crate::testing::{fixture_registry, session, urn};
    use serde_json::json;

    fn build(blueprint: Blueprint, config: &BlueprintConfig) -> Result<Manifest> {
        let registry = fixture_registry();
        let session = session();
        let tree = blueprint.finalize(&registry, &session)?;
        Manifest::build(&tree, &registry, &session, config)
    }

    #[test]
    fn test_defaults_are_filled() {
        let mut blueprint = Blueprint::new();
        blueprint.add(Resource::new(Kind::Warehouse, "wh")).unwrap();
        let manifest = build(blueprint, &BlueprintConfig::default()).unwrap();

        let entry = manifest.get(&urn("urn::ABC123:warehouse/WH")).unwrap();
        assert_eq!(entry.attrs["owner"], json!("SYSADMIN"));
        assert_eq!(entry.attrs["warehouse_size"], json!("XSMALL"));
        assert_eq!(entry.attrs["name"], json!("WH"));
        assert_eq!(entry.attrs["comment"], Value::Null);
    }

    #[test]
    fn test_implicit_schema_only_in_sync_all_with_allowlist() {
        let blueprint = || {
            let mut blueprint = Blueprint::new();
            blueprint.add(Resource::new(Kind::Database, "db")).unwrap();
            blueprint
        };
        let public = urn("urn::ABC123:schema/DB.PUBLIC");

        let manifest = build(blueprint(), &BlueprintConfig::default()).unwrap();
        assert!(!manifest.contains(&public));
        assert!(manifest.contains(&urn("urn::ABC123:database/DB")));

        let config = BlueprintConfig {
            run_mode: RunMode::SyncAll,
            allowlist: vec![Kind::Database, Kind::Schema],
            ..Default::default()
        };
        let manifest = build(blueprint(), &config).unwrap();
        assert!(manifest.get(&public).unwrap().implicit);
    }

    #[test]
    fn test_owner_edge_to_managed_role() {
        let mut blueprint = Blueprint::new();
        blueprint.add(Resource::new(Kind::Role, "loader")).unwrap();
        blueprint
            .add(Resource::new(Kind::Warehouse, "wh").with("owner", "loader"))
            .unwrap();
        let manifest = build(blueprint, &BlueprintConfig::default()).unwrap();

        let wh = urn("urn::ABC123:warehouse/WH");
        let deps: Vec<&Urn> = manifest.dependencies(&wh).collect();
        assert_eq!(deps, vec![&urn("urn::ABC123:role/LOADER")]);
    }

    #[test]
    fn test_unknown_owner_is_rejected() {
        let mut blueprint = Blueprint::new();
        blueprint
            .add(Resource::new(Kind::Warehouse, "wh").with("owner", "ghost"))
            .unwrap();
        assert!(matches!(
            build(blueprint, &BlueprintConfig::default()),
            Err(Error::InvalidOwner { .. })
        ));
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let mut blueprint = Blueprint::new();
        blueprint
            .add(Resource::new(Kind::Role, "r").with("colour", "blue"))
            .unwrap();
        assert!(matches!(
            build(blueprint, &BlueprintConfig::default()),
            Err(Error::InvalidResource { .. })
        ));
    }

    #[test]
    fn test_pointers_are_not_managed() {
        let mut blueprint = Blueprint::new();
        blueprint.pointer(Kind::Role, "existing").unwrap();
        let manifest = build(blueprint, &BlueprintConfig::default()).unwrap();
        assert!(manifest.is_empty());
    }
}
