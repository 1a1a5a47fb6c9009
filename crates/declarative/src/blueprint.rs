//! Blueprint staging and finalization
//!
//! Resources are staged into an arena. Containers and references are stored
//! as [`ResourceId`] indices, so merging a pointer into its concrete twin is
//! a matter of re-parenting children and marking the pointer as merged.
//!
//! Finalization runs in a fixed order:
//! 1. every kind is registered and every container has the right kind
//! 2. database- and schema-scoped resources without a container are placed
//!    in the inferred database (and its `PUBLIC` schema)
//! 3. nodes with the same identity are merged, level by level
//! 4. each concrete database gets its implicit `PUBLIC` schema
//! 5. tags are turned into `tag_reference` resources

use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::identifiers::{ResourceName, parse_identifier};
use crate::kind::{Kind, Scope};
use crate::registry::{RefTarget, Registry};
use crate::resource::{Placement, Resource, ResourceId};
use crate::types::AttrMap;
use crate::urn::{Fqn, Urn};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

const PUBLIC: &str = "PUBLIC";

#[derive(Debug, Clone)]
pub(crate) struct Node {
    kind: Kind,
    name: Option<ResourceName>,
    attrs: AttrMap,
    tags: BTreeMap<String, String>,
    container: Option<ResourceId>,
    children: Vec<ResourceId>,
    requires: Vec<ResourceId>,
    pointer: bool,
    implicit: bool,
    merged_into: Option<ResourceId>,
}

impl Node {
    fn new(kind: Kind, name: Option<ResourceName>) -> Self {
        Self {
            kind,
            name,
            attrs: AttrMap::new(),
            tags: BTreeMap::new(),
            container: None,
            children: Vec::new(),
            requires: Vec::new(),
            pointer: false,
            implicit: false,
            merged_into: None,
        }
    }

    fn pointer(kind: Kind, name: ResourceName) -> Self {
        Self {
            pointer: true,
            ..Self::new(kind, Some(name))
        }
    }

    fn is_live(&self) -> bool {
        self.merged_into.is_none()
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{}/{}", self.kind, name),
            None => format!("{}/<unnamed>", self.kind),
        }
    }
}

/// Resolve a node's FQN from its containers and, when the kind has one,
/// its identity function
fn node_fqn(nodes: &[Node], id: ResourceId, registry: &Registry) -> Result<Fqn> {
    let node = &nodes[id.0];
    let spec = registry.get(node.kind)?;

    let mut path = Vec::new();
    let mut cursor = node.container;
    while let Some(parent) = cursor {
        let parent = &nodes[parent.0];
        path.push(parent.name.clone().ok_or_else(|| Error::InvalidResource {
            resource: parent.label(),
            reason: "containers must be named".to_string(),
        })?);
        cursor = parent.container;
    }
    path.reverse();

    let base = match &node.name {
        Some(name) => {
            let fqn = Fqn::new(name);
            let fqn = match (node.kind.scope(), path.as_slice()) {
                (Scope::Organization | Scope::Account, []) => fqn,
                (Scope::Database, [db]) => fqn.in_database(db),
                (Scope::Schema, [db, schema]) => fqn.in_database(db).in_schema(schema),
                _ => {
                    return Err(Error::InvalidResource {
                        resource: node.label(),
                        reason: format!("resource is not placed in a {}", node.kind.scope()),
                    });
                }
            };
            Some(fqn)
        }
        None => None,
    };

    match (spec.identity, base) {
        (Some(identity), base) => identity(base.as_ref(), &node.attrs),
        (None, Some(base)) => Ok(base),
        (None, None) => Err(Error::InvalidResource {
            resource: node.label(),
            reason: "resource needs a name".to_string(),
        }),
    }
}

/// Database and schema a resource's unqualified references resolve against
fn reference_location(
    kind: Kind,
    fqn: &Fqn,
    default_database: Option<&ResourceName>,
) -> (Option<ResourceName>, Option<ResourceName>) {
    match kind.scope() {
        Scope::Schema => (fqn.database.clone(), fqn.schema.clone()),
        Scope::Database if kind == Kind::Schema => (fqn.database.clone(), Some(fqn.name.clone())),
        Scope::Database => (fqn.database.clone(), None),
        _ if kind == Kind::Database => (Some(fqn.name.clone()), None),
        _ => (default_database.cloned(), None),
    }
}

/// A set of staged resources
#[derive(Debug, Default)]
pub struct Blueprint {
    nodes: Vec<Node>,
}

impl Blueprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged nodes, pointers included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stage a resource
    pub fn add(&mut self, resource: Resource) -> Result<ResourceId> {
        let Resource {
            kind,
            name,
            attrs,
            placement,
            tags,
            requires,
        } = resource;

        let mut node = Node::new(kind, name);
        node.attrs = attrs;
        node.tags = tags;
        let id = self.push(node);

        if let Some(placement) = placement {
            let container = match placement {
                Placement::Database(raw) => {
                    let mut parts = parse_identifier(&raw)?;
                    match (parts.pop(), parts.is_empty()) {
                        (Some(db), true) => self.database_pointer(db),
                        _ => return Err(Error::InvalidName(raw)),
                    }
                }
                Placement::Schema(raw) => self.pointer_path(Kind::Schema, &raw)?,
            };
            self.attach(id, container);
        }

        for (kind, raw) in requires {
            let target = self.pointer_path(kind, &raw)?;
            self.nodes[id.0].requires.push(target);
        }

        Ok(id)
    }

    /// Stage a resource inside an already staged container
    pub fn add_to(&mut self, container: ResourceId, resource: Resource) -> Result<ResourceId> {
        self.check_id(container)?;
        if resource.placement.is_some() {
            return Err(Error::InvalidResource {
                resource: resource.label(),
                reason: "resource is already placed by name".to_string(),
            });
        }
        let id = self.add(resource)?;
        self.attach(id, container);
        Ok(id)
    }

    /// Reference an object that is assumed to exist but is not managed
    pub fn pointer(&mut self, kind: Kind, name: &str) -> Result<ResourceId> {
        self.pointer_path(kind, name)
    }

    /// Declare that `resource` must be created after `dependency`
    pub fn requires(&mut self, resource: ResourceId, dependency: ResourceId) -> Result<()> {
        self.check_id(resource)?;
        self.check_id(dependency)?;
        if resource != dependency && !self.nodes[resource.0].requires.contains(&dependency) {
            self.nodes[resource.0].requires.push(dependency);
        }
        Ok(())
    }

    fn check_id(&self, id: ResourceId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::InvalidResource {
                resource: id.to_string(),
                reason: "not part of this blueprint".to_string(),
            })
        }
    }

    fn push(&mut self, node: Node) -> ResourceId {
        self.nodes.push(node);
        ResourceId(self.nodes.len() - 1)
    }

    fn attach(&mut self, child: ResourceId, container: ResourceId) {
        if let Some(previous) = self.nodes[child.0].container {
            self.nodes[previous.0].children.retain(|c| *c != child);
        }
        self.nodes[child.0].container = Some(container);
        self.nodes[container.0].children.push(child);
    }

    fn database_pointer(&mut self, name: ResourceName) -> ResourceId {
        self.push(Node::pointer(Kind::Database, name))
    }

    fn schema_pointer(&mut self, database: Option<ResourceName>, name: ResourceName) -> ResourceId {
        let schema = self.push(Node::pointer(Kind::Schema, name));
        if let Some(database) = database {
            let db = self.database_pointer(database);
            self.attach(schema, db);
        }
        schema
    }

    fn pointer_path(&mut self, kind: Kind, raw: &str) -> Result<ResourceId> {
        let target = RefTarget::parse(kind, raw)?;
        let container = match (kind.scope(), target.schema) {
            (Scope::Schema, Some(schema)) => Some(self.schema_pointer(target.database, schema)),
            (Scope::Database, _) => target.database.map(|db| self.database_pointer(db)),
            _ => None,
        };
        let id = self.push(Node::pointer(kind, target.name));
        if let Some(container) = container {
            self.attach(id, container);
        }
        Ok(id)
    }

    fn live_ids(&self) -> Vec<ResourceId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_live())
            .map(|(i, _)| ResourceId(i))
            .collect()
    }

    /// Resolve containers, merge duplicates and synthesize implicit resources
    pub fn finalize(mut self, registry: &Registry, session: &SessionContext) -> Result<FinalizedBlueprint> {
        self.check_kinds(registry)?;
        self.check_containers()?;
        let default_database = self.infer_containers(session)?;
        self.merge(registry)?;
        self.add_implicit_schemas()?;
        self.synthesize_tag_references(registry, default_database.as_ref())?;

        log::debug!(
            "finalized blueprint with {} resources",
            self.nodes.iter().filter(|n| n.is_live()).count()
        );

        Ok(FinalizedBlueprint {
            nodes: self.nodes,
            default_database,
        })
    }

    fn check_kinds(&self, registry: &Registry) -> Result<()> {
        for node in &self.nodes {
            let spec = registry.get(node.kind)?;
            if node.name.is_none() && spec.identity.is_none() {
                return Err(Error::InvalidResource {
                    resource: node.label(),
                    reason: "resource needs a name".to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_containers(&self) -> Result<()> {
        for node in &self.nodes {
            let Some(container) = node.container else {
                continue;
            };
            let container = &self.nodes[container.0];
            match node.kind.scope().container_kind() {
                None => {
                    return Err(Error::InvalidResource {
                        resource: node.label(),
                        reason: format!("{}-level resources cannot be placed in a container", node.kind.scope()),
                    });
                }
                Some(expected) if expected != container.kind => {
                    return Err(Error::InvalidResource {
                        resource: node.label(),
                        reason: format!("a {} cannot be placed in a {}", node.kind, container.kind),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Place orphans in the sole declared database, or the session's
    fn infer_containers(&mut self, session: &SessionContext) -> Result<Option<ResourceName>> {
        let declared: BTreeSet<ResourceName> = self
            .nodes
            .iter()
            .filter(|n| n.kind == Kind::Database && !n.pointer)
            .filter_map(|n| n.name.clone())
            .collect();
        let default_database = if declared.len() == 1 {
            declared.into_iter().next()
        } else {
            session.database.clone()
        };

        let orphan = |node: &Node| Error::OrphanResource {
            kind: node.kind,
            name: node
                .name
                .as_ref()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "<unnamed>".to_string()),
        };

        let schema_orphans: Vec<ResourceId> = self
            .live_ids()
            .into_iter()
            .filter(|id| {
                let node = &self.nodes[id.0];
                node.kind.scope() == Scope::Schema && node.container.is_none()
            })
            .collect();
        let mut public_schema = None;
        for id in schema_orphans {
            let database = default_database
                .clone()
                .ok_or_else(|| orphan(&self.nodes[id.0]))?;
            let schema = match public_schema {
                Some(schema) => schema,
                None => {
                    let schema = self.schema_pointer(Some(database), ResourceName::new(PUBLIC));
                    public_schema = Some(schema);
                    schema
                }
            };
            self.attach(id, schema);
        }

        let database_orphans: Vec<ResourceId> = self
            .live_ids()
            .into_iter()
            .filter(|id| {
                let node = &self.nodes[id.0];
                node.kind.scope() == Scope::Database && node.container.is_none()
            })
            .collect();
        let mut database_pointer = None;
        for id in database_orphans {
            let database = default_database
                .clone()
                .ok_or_else(|| orphan(&self.nodes[id.0]))?;
            let db = match database_pointer {
                Some(db) => db,
                None => {
                    let db = self.database_pointer(database);
                    database_pointer = Some(db);
                    db
                }
            };
            self.attach(id, db);
        }

        Ok(default_database)
    }

    /// Merge nodes sharing an identity, containers before contents
    fn merge(&mut self, registry: &Registry) -> Result<()> {
        for level in [Scope::Account, Scope::Database, Scope::Schema] {
            let mut groups: BTreeMap<(Kind, Option<ResourceId>, String), Vec<ResourceId>> =
                BTreeMap::new();
            for id in self.live_ids() {
                let node = &self.nodes[id.0];
                let scope = match node.kind.scope() {
                    Scope::Organization => Scope::Account,
                    scope => scope,
                };
                if scope != level {
                    continue;
                }
                let identity = node_fqn(&self.nodes, id, registry)?.to_string();
                groups
                    .entry((node.kind, node.container, identity))
                    .or_default()
                    .push(id);
            }

            for ((kind, _, identity), ids) in groups {
                if ids.len() > 1 {
                    self.merge_group(kind, &identity, &ids)?;
                }
            }
        }
        Ok(())
    }

    fn merge_group(&mut self, kind: Kind, identity: &str, ids: &[ResourceId]) -> Result<()> {
        let concretes: Vec<ResourceId> = ids
            .iter()
            .copied()
            .filter(|id| !self.nodes[id.0].pointer)
            .collect();
        let canonical = concretes.first().copied().unwrap_or(ids[0]);

        for other in concretes.iter().skip(1) {
            let (a, b) = (&self.nodes[canonical.0], &self.nodes[other.0]);
            if a.attrs != b.attrs || a.tags != b.tags {
                return Err(Error::DuplicateResource {
                    urn: format!("{}/{}", kind, identity),
                });
            }
        }

        for &id in ids {
            if id != canonical {
                self.absorb(canonical, id);
            }
        }
        Ok(())
    }

    fn absorb(&mut self, target: ResourceId, source: ResourceId) {
        let children = std::mem::take(&mut self.nodes[source.0].children);
        for child in children {
            self.nodes[child.0].container = Some(target);
            self.nodes[target.0].children.push(child);
        }

        let requires = std::mem::take(&mut self.nodes[source.0].requires);
        for dependency in requires {
            if dependency != target && !self.nodes[target.0].requires.contains(&dependency) {
                self.nodes[target.0].requires.push(dependency);
            }
        }

        if let Some(parent) = self.nodes[source.0].container {
            self.nodes[parent.0].children.retain(|c| *c != source);
        }
        self.nodes[source.0].merged_into = Some(target);
    }

    fn add_implicit_schemas(&mut self) -> Result<()> {
        let databases: Vec<ResourceId> = self
            .live_ids()
            .into_iter()
            .filter(|id| {
                let node = &self.nodes[id.0];
                node.kind == Kind::Database && !node.pointer
            })
            .collect();

        for db in databases {
            let public = self.nodes[db.0].children.iter().copied().find(|c| {
                let child = &self.nodes[c.0];
                child.kind == Kind::Schema
                    && child.name.as_ref().is_some_and(|n| n.matches(PUBLIC))
            });

            match public {
                Some(schema) if !self.nodes[schema.0].pointer => {
                    return Err(Error::InvalidResource {
                        resource: format!("{}.{}", self.nodes[db.0].label(), PUBLIC),
                        reason: "the PUBLIC schema is created with its database and cannot be declared"
                            .to_string(),
                    });
                }
                Some(schema) => {
                    let node = &mut self.nodes[schema.0];
                    node.pointer = false;
                    node.implicit = true;
                }
                None => {
                    let mut node = Node::new(Kind::Schema, Some(ResourceName::new(PUBLIC)));
                    node.implicit = true;
                    let schema = self.push(node);
                    self.attach(schema, db);
                }
            }
        }
        Ok(())
    }

    fn synthesize_tag_references(
        &mut self,
        registry: &Registry,
        default_database: Option<&ResourceName>,
    ) -> Result<()> {
        let tagged: Vec<ResourceId> = self
            .live_ids()
            .into_iter()
            .filter(|id| {
                let node = &self.nodes[id.0];
                !node.pointer && !node.tags.is_empty()
            })
            .collect();

        for id in tagged {
            let fqn = node_fqn(&self.nodes, id, registry)?;
            let kind = self.nodes[id.0].kind;
            let (database, schema) = reference_location(kind, &fqn, default_database);

            let mut tags = Map::new();
            for (tag, value) in &self.nodes[id.0].tags {
                let tag = RefTarget::parse(Kind::Tag, tag)?.qualify(database.as_ref(), schema.as_ref())?;
                tags.insert(tag.path(), Value::String(value.clone()));
            }

            let mut node = Node::new(Kind::TagReference, None);
            node.attrs.insert("object_name".to_string(), Value::String(fqn.path()));
            node.attrs.insert("object_domain".to_string(), Value::String(kind.sql_type()));
            node.attrs.insert("tags".to_string(), Value::Object(tags));
            node.requires.push(id);
            self.push(node);
        }
        Ok(())
    }
}

/// A blueprint whose containers, identities and implicit resources are resolved
#[derive(Debug)]
pub struct FinalizedBlueprint {
    nodes: Vec<Node>,
    default_database: Option<ResourceName>,
}

impl FinalizedBlueprint {
    /// Live resources in staging order, pointers included
    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_live())
            .map(|(i, _)| ResourceId(i))
    }

    /// Follow merges to the surviving node
    pub fn resolve(&self, mut id: ResourceId) -> ResourceId {
        while let Some(target) = self.nodes[id.0].merged_into {
            id = target;
        }
        id
    }

    pub fn kind(&self, id: ResourceId) -> Kind {
        self.nodes[self.resolve(id).0].kind
    }

    pub fn name(&self, id: ResourceId) -> Option<&ResourceName> {
        self.nodes[self.resolve(id).0].name.as_ref()
    }

    pub fn attrs(&self, id: ResourceId) -> &AttrMap {
        &self.nodes[self.resolve(id).0].attrs
    }

    pub fn is_pointer(&self, id: ResourceId) -> bool {
        self.nodes[self.resolve(id).0].pointer
    }

    pub fn is_implicit(&self, id: ResourceId) -> bool {
        self.nodes[self.resolve(id).0].implicit
    }

    pub fn container(&self, id: ResourceId) -> Option<ResourceId> {
        self.nodes[self.resolve(id).0].container
    }

    pub fn children(&self, id: ResourceId) -> &[ResourceId] {
        &self.nodes[self.resolve(id).0].children
    }

    /// Database used for resources declared without one
    pub fn default_database(&self) -> Option<&ResourceName> {
        self.default_database.as_ref()
    }

    pub fn fqn(&self, id: ResourceId, registry: &Registry) -> Result<Fqn> {
        node_fqn(&self.nodes, self.resolve(id), registry)
    }

    pub fn urn(&self, id: ResourceId, registry: &Registry, session: &SessionContext) -> Result<Urn> {
        Ok(session.urn(self.kind(id), self.fqn(id, registry)?))
    }

    /// URNs this resource depends on: its container, explicit requirements
    /// and references found in its attributes. Owner edges are added by the
    /// manifest, which knows which roles it manages.
    pub fn refs(&self, id: ResourceId, registry: &Registry, session: &SessionContext) -> Result<Vec<Urn>> {
        let id = self.resolve(id);
        let node = &self.nodes[id.0];
        let mut refs = Vec::new();

        if let Some(container) = node.container {
            refs.push(self.urn(container, registry, session)?);
        }
        for dependency in &node.requires {
            let dependency = self.resolve(*dependency);
            if dependency != id {
                refs.push(self.urn(dependency, registry, session)?);
            }
        }

        if let Some(extract) = registry.get(node.kind)?.refs {
            let fqn = self.fqn(id, registry)?;
            let (database, schema) =
                reference_location(node.kind, &fqn, self.default_database.as_ref());
            for target in extract(&node.attrs)? {
                let kind = target.kind;
                let fqn = target.qualify(database.as_ref(), schema.as_ref())?;
                refs.push(session.urn(kind, fqn));
            }
        }

        let own = self.urn(id, registry, session)?;
        let mut seen = BTreeSet::new();
        refs.retain(|urn| *urn != own && seen.insert(urn.clone()));
        Ok(refs)
    }

    /// Find a live resource by kind and dotted path
    pub fn find(&self, kind: Kind, path: &str, registry: &Registry) -> Option<ResourceId> {
        let wanted = parse_identifier(path).ok()?;
        self.ids().find(|id| {
            self.kind(*id) == kind
                && self
                    .fqn(*id, registry)
                    .map(|fqn| {
                        fqn.database
                            .iter()
                            .chain(fqn.schema.iter())
                            .chain(std::iter::once(&fqn.name))
                            .eq(wanted.iter())
                    })
                    .unwrap_or(false)
        })
    }
}
