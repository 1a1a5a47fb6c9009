//! Resource declarations
//!
//! A [`Resource`] is what a user stages into a blueprint: a kind, a name,
//! attributes and an optional placement. It is plain data until the
//! blueprint resolves its container and identity.
//!
//! # Example
//!
//! ```ignore
//! use declarative::{Blueprint, Kind, Resource};
//!
//! let mut blueprint = Blueprint::new();
//! let db = blueprint.add(Resource::new(Kind::Database, "analytics"))?;
//! blueprint.add(
//!     Resource::new(Kind::Table, "events")
//!         .in_schema("analytics.raw")
//!         .with("columns", serde_json::json!([{"name": "ID", "data_type": "NUMBER"}]))
//!         .tagged("governance.pii", "none"),
//! )?;
//! ```

use crate::identifiers::ResourceName;
use crate::kind::Kind;
use crate::types::AttrMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Handle to a resource inside a blueprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) usize);

impl ResourceId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a resource was declared to live, by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// `in_database("db")`
    Database(String),
    /// `in_schema("schema")` or `in_schema("db.schema")`
    Schema(String),
}

/// A resource declaration
#[derive(Debug, Clone)]
pub struct Resource {
    pub(crate) kind: Kind,
    pub(crate) name: Option<ResourceName>,
    pub(crate) attrs: AttrMap,
    pub(crate) placement: Option<Placement>,
    pub(crate) tags: BTreeMap<String, String>,
    pub(crate) requires: Vec<(Kind, String)>,
}

impl Resource {
    /// A named resource
    pub fn new(kind: Kind, name: impl Into<ResourceName>) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            attrs: AttrMap::new(),
            placement: None,
            tags: BTreeMap::new(),
            requires: Vec::new(),
        }
    }

    /// A resource identified by its attributes (grants, role grants)
    pub fn unnamed(kind: Kind) -> Self {
        Self {
            kind,
            name: None,
            attrs: AttrMap::new(),
            placement: None,
            tags: BTreeMap::new(),
            requires: Vec::new(),
        }
    }

    /// Set an attribute
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Set several attributes at once
    pub fn with_attrs(mut self, attrs: AttrMap) -> Self {
        self.attrs.extend(attrs);
        self
    }

    pub fn in_database(mut self, database: &str) -> Self {
        self.placement = Some(Placement::Database(database.to_string()));
        self
    }

    pub fn in_schema(mut self, schema: &str) -> Self {
        self.placement = Some(Placement::Schema(schema.to_string()));
        self
    }

    /// Attach a tag value; the tag name may be partially qualified
    pub fn tagged(mut self, tag: &str, value: &str) -> Self {
        self.tags.insert(tag.to_string(), value.to_string());
        self
    }

    /// Depend on another resource by name
    pub fn requires(mut self, kind: Kind, name: &str) -> Self {
        self.requires.push((kind, name.to_string()));
        self
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn name(&self) -> Option<&ResourceName> {
        self.name.as_ref()
    }

    pub fn attrs(&self) -> &AttrMap {
        &self.attrs
    }

    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    /// Short label for messages (`database/ANALYTICS`, `grant/<unnamed>`)
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{}/{}", self.kind, name),
            None => format!("{}/<unnamed>", self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let table = Resource::new(Kind::Table, "events")
            .in_schema("analytics.raw")
            .with("comment", "raw events")
            .tagged("pii", "none")
            .requires(Kind::Role, "loader");

        assert_eq!(table.kind(), Kind::Table);
        assert_eq!(table.name(), Some(&ResourceName::new("EVENTS")));
        assert_eq!(table.attrs()["comment"], json!("raw events"));
        assert_eq!(
            table.placement(),
            Some(&Placement::Schema("analytics.raw".to_string()))
        );
        assert_eq!(table.tags["pii"], "none");
        assert_eq!(table.requires, vec![(Kind::Role, "loader".to_string())]);
        assert_eq!(table.label(), "table/EVENTS");
    }

    #[test]
    fn test_unnamed() {
        let grant = Resource::unnamed(Kind::Grant).with("priv", "USAGE");
        assert!(grant.name().is_none());
        assert_eq!(grant.label(), "grant/<unnamed>");
    }
}
