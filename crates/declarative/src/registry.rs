//! Per-kind metadata: fields, defaults, privileges and reference extraction
//!
//! The engine never hard-codes knowledge of individual kinds. Everything it
//! needs to know about `database` or `grant` comes from a [`KindSpec`]
//! registered in a [`Registry`].

use crate::error::{Error, Result};
use crate::identifiers::{ResourceName, parse_identifier};
use crate::kind::{Kind, Scope};
use crate::types::AttrMap;
use crate::urn::Fqn;
use serde_json::Value;
use std::collections::HashMap;

/// How a field's values are compared and normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// An identifier, compared case-aware
    Name,
    String,
    /// A case-insensitive token such as a privilege or object type, kept
    /// uppercase with single spaces
    Keyword,
    Bool,
    Int,
    Float,
    /// A list of scalars
    List,
    /// A list of identifiers
    NameList,
    /// Function arguments (`[{name, data_type, default}]`); defaults ignored
    Args,
    Map,
    Any,
}

/// When a difference in a field is not acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IgnoreIf {
    #[default]
    Never,
    /// The blueprint left the field unset
    DesiredNull,
}

/// One attribute of a kind
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub default: Value,
    /// Whether the warehouse reports this field back
    pub fetchable: bool,
    /// A change forces drop-and-recreate
    pub triggers_replacement: bool,
    /// A change is applied by re-adding the resource
    pub forces_add: bool,
    pub ignore_if: IgnoreIf,
}

impl FieldSpec {
    pub fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            default: Value::Null,
            fetchable: true,
            triggers_replacement: false,
            forces_add: false,
            ignore_if: IgnoreIf::Never,
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    pub fn not_fetchable(mut self) -> Self {
        self.fetchable = false;
        self
    }

    pub fn replaces(mut self) -> Self {
        self.triggers_replacement = true;
        self
    }

    pub fn forces_add(mut self) -> Self {
        self.forces_add = true;
        self
    }

    pub fn ignore_if(mut self, rule: IgnoreIf) -> Self {
        self.ignore_if = rule;
        self
    }

    /// Whether a delta on this field should be dropped
    pub fn is_ignored(&self, desired: &Value) -> bool {
        match self.ignore_if {
            IgnoreIf::Never => false,
            IgnoreIf::DesiredNull => desired.is_null(),
        }
    }
}

/// A reference from a resource's attributes to another resource, possibly
/// only partially qualified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefTarget {
    pub kind: Kind,
    pub database: Option<ResourceName>,
    pub schema: Option<ResourceName>,
    pub name: ResourceName,
}

impl RefTarget {
    /// Parse a dotted name; trailing segments fill name, schema, database.
    /// Account-level names are a single identifier and may contain dots
    /// (`info@example.com`).
    pub fn parse(kind: Kind, raw: &str) -> Result<Self> {
        if matches!(kind.scope(), Scope::Organization | Scope::Account) {
            return Ok(Self {
                kind,
                database: None,
                schema: None,
                name: ResourceName::parse(raw)?,
            });
        }
        let mut parts = parse_identifier(raw)?;
        if parts.len() > 3 {
            return Err(Error::InvalidName(raw.to_string()));
        }
        let name = parts.pop().ok_or_else(|| Error::InvalidName(raw.to_string()))?;
        let (database, schema) = match (kind.scope(), parts.len()) {
            (Scope::Schema, 2) => (parts.first().cloned(), parts.get(1).cloned()),
            (Scope::Schema, 1) => (None, parts.first().cloned()),
            (Scope::Database, 1) => (parts.first().cloned(), None),
            (_, 0) => (None, None),
            _ => return Err(Error::InvalidName(raw.to_string())),
        };
        Ok(Self {
            kind,
            database,
            schema,
            name,
        })
    }

    /// Fill missing qualifiers from the referring resource's location
    pub fn qualify(
        self,
        database: Option<&ResourceName>,
        schema: Option<&ResourceName>,
    ) -> Result<Fqn> {
        let unqualified = || Error::InvalidResource {
            resource: format!("{}/{}", self.kind, self.name),
            reason: "reference needs a database to be fully qualified".to_string(),
        };
        let fqn = Fqn::new(&self.name);
        match self.kind.scope() {
            Scope::Organization | Scope::Account => Ok(fqn),
            Scope::Database => {
                let db = self.database.as_ref().or(database).ok_or_else(unqualified)?;
                Ok(fqn.in_database(db))
            }
            Scope::Schema => {
                let db = self.database.as_ref().or(database).ok_or_else(unqualified)?;
                let schema = self
                    .schema
                    .clone()
                    .or_else(|| schema.cloned())
                    .unwrap_or_else(|| ResourceName::new("PUBLIC"));
                Ok(fqn.in_database(db).in_schema(schema))
            }
        }
    }
}

/// Derives the URN FQN of a resource whose identity is not just its name
/// (grants, tag references, overloaded functions). Receives the FQN built
/// from containment, if the resource is named, and its attributes.
pub type IdentityFn = fn(Option<&Fqn>, &AttrMap) -> Result<Fqn>;

/// Extracts references to other resources from attributes
pub type RefsFn = fn(&AttrMap) -> Result<Vec<RefTarget>>;

/// Fills attributes a provider may leave out, derived from the ones it
/// reports. Runs on desired and fetched attributes before defaults apply.
pub type CompleteFn = fn(&mut AttrMap);

/// Everything the engine knows about one kind
#[derive(Debug, Clone)]
pub struct KindSpec {
    pub kind: Kind,
    pub fields: Vec<FieldSpec>,
    /// Privilege a custom role needs on the container to create this kind
    pub create_privilege: Option<&'static str>,
    /// Grant-like kinds are created and removed by privileged roles
    pub grant_like: bool,
    /// Whether the kind can be enumerated for sync modes
    pub listable: bool,
    pub identity: Option<IdentityFn>,
    pub refs: Option<RefsFn>,
    pub complete: Option<CompleteFn>,
}

impl KindSpec {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
            create_privilege: None,
            grant_like: false,
            listable: true,
            identity: None,
            refs: None,
            complete: None,
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Add the `name` field
    pub fn named(self) -> Self {
        self.field(FieldSpec::new("name", FieldType::Name))
    }

    /// Add an `owner` field defaulting to the given role
    pub fn owned_by(self, role: &'static str) -> Self {
        self.field(FieldSpec::new("owner", FieldType::Name).default_value(role))
    }

    pub fn created_with(mut self, privilege: &'static str) -> Self {
        self.create_privilege = Some(privilege);
        self
    }

    pub fn grant_like(mut self) -> Self {
        self.grant_like = true;
        self
    }

    pub fn unlisted(mut self) -> Self {
        self.listable = false;
        self
    }

    pub fn identity(mut self, identity: IdentityFn) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn refs(mut self, refs: RefsFn) -> Self {
        self.refs = Some(refs);
        self
    }

    pub fn completed_by(mut self, complete: CompleteFn) -> Self {
        self.complete = Some(complete);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_owner(&self) -> bool {
        self.get_field("owner").is_some()
    }

    /// Default owner role, if the kind has an owner
    pub fn default_owner(&self) -> Option<ResourceName> {
        self.get_field("owner")
            .and_then(|f| f.default.as_str())
            .map(ResourceName::new)
    }

    /// Keep only known fields and fill the missing ones with defaults
    pub fn normalize(&self, mut attrs: AttrMap) -> AttrMap {
        if let Some(complete) = self.complete {
            complete(&mut attrs);
        }
        self.fields
            .iter()
            .map(|field| {
                let value = attrs
                    .remove(field.name)
                    .filter(|v| !v.is_null())
                    .unwrap_or_else(|| field.default.clone());
                let value = match (field.ty, value) {
                    (FieldType::Keyword, Value::String(raw)) => Value::String(keyword(&raw)),
                    (_, value) => value,
                };
                (field.name.to_string(), value)
            })
            .collect()
    }

    /// Reject attributes that are not fields of this kind
    pub fn check_fields(&self, resource: &str, attrs: &AttrMap) -> Result<()> {
        match attrs.keys().find(|k| self.get_field(k).is_none()) {
            Some(unknown) => Err(Error::InvalidResource {
                resource: resource.to_string(),
                reason: format!("unknown attribute '{}' for {}", unknown, self.kind),
            }),
            None => Ok(()),
        }
    }

    /// Read an identifier attribute
    pub fn name_attr(attrs: &AttrMap, key: &str) -> Option<ResourceName> {
        attrs.get(key).and_then(Value::as_str).map(ResourceName::new)
    }
}

/// Canonical spelling of a keyword: uppercase, single spaces
pub fn keyword(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase()
}

/// Lookup table of kind specs
#[derive(Debug, Default)]
pub struct Registry {
    specs: HashMap<Kind, KindSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spec, replacing any previous one for the kind
    pub fn register(&mut self, spec: KindSpec) {
        self.specs.insert(spec.kind, spec);
    }

    pub fn with(mut self, spec: KindSpec) -> Self {
        self.register(spec);
        self
    }

    pub fn get(&self, kind: Kind) -> Result<&KindSpec> {
        self.specs.get(&kind).ok_or(Error::UnregisteredKind(kind))
    }

    pub fn contains(&self, kind: Kind) -> bool {
        self.specs.contains_key(&kind)
    }

    /// Registered kinds in declaration order
    pub fn kinds(&self) -> Vec<Kind> {
        Kind::ALL
            .iter()
            .copied()
            .filter(|k| self.specs.contains_key(k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn warehouse_spec() -> KindSpec {
        KindSpec::new(Kind::Warehouse)
            .named()
            .owned_by("SYSADMIN")
            .field(FieldSpec::new("warehouse_size", FieldType::String).default_value("XSMALL"))
            .field(FieldSpec::new("initially_suspended", FieldType::Bool).not_fetchable())
    }

    #[test]
    fn test_normalize_fills_defaults_and_drops_extras() {
        let spec = warehouse_spec();
        let mut attrs = AttrMap::new();
        attrs.insert("name".into(), json!("WH"));
        attrs.insert("created_on".into(), json!("yesterday"));
        attrs.insert("owner".into(), Value::Null);

        let normalized = spec.normalize(attrs);
        assert_eq!(normalized["owner"], json!("SYSADMIN"));
        assert_eq!(normalized["warehouse_size"], json!("XSMALL"));
        assert_eq!(normalized["initially_suspended"], Value::Null);
        assert!(!normalized.contains_key("created_on"));
    }

    #[test]
    fn test_normalize_canonicalizes_keywords_and_completes() {
        fn fill_privs(attrs: &mut AttrMap) {
            if !attrs.contains_key("_privs")
                && let Some(privilege) = attrs.get("priv").cloned()
            {
                attrs.insert("_privs".into(), json!([privilege]));
            }
        }
        let spec = KindSpec::new(Kind::Grant)
            .field(FieldSpec::new("priv", FieldType::Keyword))
            .field(FieldSpec::new("on_type", FieldType::Keyword))
            .field(FieldSpec::new("_privs", FieldType::List))
            .completed_by(fill_privs);
        let mut attrs = AttrMap::new();
        attrs.insert("priv".into(), json!("create  schema"));
        attrs.insert("on_type".into(), json!("database"));

        let normalized = spec.normalize(attrs);
        assert_eq!(normalized["priv"], json!("CREATE SCHEMA"));
        assert_eq!(normalized["on_type"], json!("DATABASE"));
        assert_eq!(normalized["_privs"], json!(["create  schema"]));
    }

    #[test]
    fn test_check_fields_rejects_unknown() {
        let spec = warehouse_spec();
        let mut attrs = AttrMap::new();
        attrs.insert("warehouse_sise".into(), json!("LARGE"));
        let err = spec.check_fields("warehouse/WH", &attrs).unwrap_err();
        assert!(err.to_string().contains("warehouse_sise"));
    }

    #[test]
    fn test_default_owner() {
        assert_eq!(
            warehouse_spec().default_owner(),
            Some(ResourceName::new("SYSADMIN"))
        );
        assert_eq!(KindSpec::new(Kind::Grant).default_owner(), None);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = Registry::new().with(warehouse_spec());
        assert!(registry.get(Kind::Warehouse).is_ok());
        assert!(matches!(
            registry.get(Kind::Pipe),
            Err(Error::UnregisteredKind(Kind::Pipe))
        ));
        assert_eq!(registry.kinds(), vec![Kind::Warehouse]);
    }

    #[test]
    fn test_ref_target_qualification() {
        let db = ResourceName::new("DB");
        let sch = ResourceName::new("SCH");

        let table = RefTarget::parse(Kind::Table, "tbl").unwrap();
        assert_eq!(table.qualify(Some(&db), Some(&sch)).unwrap().path(), "DB.SCH.TBL");

        let table = RefTarget::parse(Kind::Table, "other.tbl").unwrap();
        assert_eq!(table.qualify(Some(&db), None).unwrap().path(), "DB.OTHER.TBL");

        let table = RefTarget::parse(Kind::Table, "tbl").unwrap();
        assert_eq!(table.qualify(Some(&db), None).unwrap().path(), "DB.PUBLIC.TBL");

        let schema = RefTarget::parse(Kind::Schema, "sch").unwrap();
        assert!(schema.qualify(None, None).is_err());

        let role = RefTarget::parse(Kind::Role, "analyst").unwrap();
        assert_eq!(role.qualify(Some(&db), None).unwrap().path(), "ANALYST");

        let user = RefTarget::parse(Kind::User, "info@applytitan.com").unwrap();
        assert_eq!(user.name.as_str(), "info@applytitan.com");
        assert!(RefTarget::parse(Kind::Table, "a.b.c.d").is_err());
    }
}
