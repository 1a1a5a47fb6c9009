//! Blueprint files
//!
//! A blueprint is a TOML document with run settings at the top level and one
//! `[[resources]]` table per declared object:
//!
//! ```toml
//! run_mode = "sync-all"
//! allowlist = ["role", "database"]
//!
//! [[resources]]
//! kind = "database"
//! name = "analytics"
//! attrs = { comment = "marts", data_retention_time_in_days = 7 }
//!
//! [[resources]]
//! kind = "grant"
//! priv = "usage"
//! on_type = "database"
//! on = "analytics"
//! to = "analyst"
//! ```

use anyhow::{Context, Result, bail};
use declarative::{AttrMap, Blueprint, BlueprintConfig, Kind, Resource, RunMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A blueprint file as written on disk
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlueprintFile {
    #[serde(default)]
    pub run_mode: Option<String>,
    #[serde(default)]
    pub allowlist: Vec<String>,
    #[serde(default)]
    pub ignore_ownership: bool,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

/// One `[[resources]]` table
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    /// `schema` or `db.schema`
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub attrs: toml::Table,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// `kind/name` of resources this one must follow
    #[serde(default)]
    pub requires: Vec<String>,

    // Grants and role grants
    #[serde(default, rename = "priv")]
    pub privilege: Option<String>,
    #[serde(default)]
    pub on_type: Option<String>,
    #[serde(default)]
    pub on: Option<String>,
    #[serde(default)]
    pub in_type: Option<String>,
    #[serde(default)]
    pub in_name: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub to_role: Option<String>,
    #[serde(default)]
    pub to_user: Option<String>,
}

impl BlueprintFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read blueprint {}", path.display()))?;
        let file = Self::parse(&content)
            .with_context(|| format!("Invalid blueprint {}", path.display()))?;
        log::debug!(
            "Loaded {} resources from {}",
            file.resources.len(),
            path.display()
        );
        Ok(file)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Run settings declared in the file
    pub fn config(&self) -> Result<BlueprintConfig> {
        let mut config = BlueprintConfig {
            ignore_ownership: self.ignore_ownership,
            ..Default::default()
        };
        if let Some(mode) = &self.run_mode {
            config.run_mode = mode.parse::<RunMode>()?;
        }
        config.allowlist = self
            .allowlist
            .iter()
            .map(|k| k.parse::<Kind>())
            .collect::<declarative::Result<_>>()?;
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        Ok(config)
    }

    /// Build a fresh blueprint from the declared resources
    pub fn blueprint(&self) -> Result<Blueprint> {
        let mut blueprint = Blueprint::new();
        for (index, entry) in self.resources.iter().enumerate() {
            let resource = entry
                .to_resource()
                .with_context(|| format!("resources[{}] ({})", index, entry.kind))?;
            blueprint
                .add(resource)
                .with_context(|| format!("resources[{}] ({})", index, entry.kind))?;
        }
        Ok(blueprint)
    }
}

fn required<'a>(value: Option<&'a String>, field: &str) -> Result<&'a str> {
    match value {
        Some(value) => Ok(value.as_str()),
        None => bail!("'{}' is required", field),
    }
}

impl ResourceEntry {
    fn attrs(&self) -> Result<AttrMap> {
        let mut attrs = AttrMap::new();
        for (key, value) in &self.attrs {
            attrs.insert(key.clone(), serde_json::to_value(value)?);
        }
        Ok(attrs)
    }

    fn to_resource(&self) -> Result<Resource> {
        let kind: Kind = self.kind.parse()?;
        let privilege = self.privilege.as_ref();

        let resource = match kind {
            Kind::Grant => warehouse::grant(
                required(privilege, "priv")?,
                required(self.on_type.as_ref(), "on_type")?.parse()?,
                self.on.as_deref().unwrap_or_default(),
                required(self.to.as_ref(), "to")?,
            )?,
            Kind::FutureGrant | Kind::GrantOnAll => {
                type BulkGrant = fn(&str, Kind, Kind, &str, &str) -> warehouse::Result<Resource>;
                let build: BulkGrant = if kind == Kind::FutureGrant {
                    warehouse::future_grant
                } else {
                    warehouse::grant_on_all
                };
                build(
                    required(privilege, "priv")?,
                    required(self.on_type.as_ref(), "on_type")?.parse()?,
                    required(self.in_type.as_ref(), "in_type")?.parse()?,
                    required(self.in_name.as_ref(), "in_name")?,
                    required(self.to.as_ref(), "to")?,
                )?
            }
            Kind::RoleGrant => {
                let role = required(self.role.as_ref(), "role")?;
                match (&self.to_role, &self.to_user) {
                    (Some(to_role), None) => warehouse::role_grant(role, to_role),
                    (None, Some(to_user)) => warehouse::role_grant_to_user(role, to_user),
                    _ => bail!("exactly one of 'to_role' and 'to_user' is required"),
                }
            }
            _ => Resource::new(kind, required(self.name.as_ref(), "name")?),
        };

        let mut resource = resource.with_attrs(self.attrs()?);
        match (&self.database, &self.schema) {
            (Some(database), Some(schema)) => {
                resource = resource.in_schema(&format!("{}.{}", database, schema));
            }
            (Some(database), None) => resource = resource.in_database(database),
            (None, Some(schema)) => resource = resource.in_schema(schema),
            (None, None) => {}
        }
        for (tag, value) in &self.tags {
            resource = resource.tagged(tag, value);
        }
        for dependency in &self.requires {
            let Some((kind, name)) = dependency.split_once('/') else {
                bail!("requires entry '{}' must be 'kind/name'", dependency);
            };
            resource = resource.requires(kind.parse()?, name);
        }
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BLUEPRINT: &str = r#"
run_mode = "sync-all"
allowlist = ["role", "database", "schema"]
workers = 2

[[resources]]
kind = "role"
name = "analyst"

[[resources]]
kind = "database"
name = "analytics"
attrs = { comment = "marts", data_retention_time_in_days = 7 }

[[resources]]
kind = "schema"
name = "marts"
database = "analytics"
tags = { "governance.pii" = "none" }

[[resources]]
kind = "grant"
priv = "usage"
on_type = "database"
on = "analytics"
to = "analyst"

[[resources]]
kind = "role_grant"
role = "analyst"
to_role = "SYSADMIN"
"#;

    #[test]
    fn test_parse_settings() {
        let file = BlueprintFile::parse(BLUEPRINT).unwrap();
        let config = file.config().unwrap();
        assert_eq!(config.run_mode, RunMode::SyncAll);
        assert_eq!(config.allowlist, vec![Kind::Role, Kind::Database, Kind::Schema]);
        assert_eq!(config.workers, 2);
        assert!(!config.ignore_ownership);
    }

    #[test]
    fn test_resources_become_blueprint() {
        let file = BlueprintFile::parse(BLUEPRINT).unwrap();
        assert_eq!(file.resources.len(), 5);
        assert_eq!(file.resources[3].privilege.as_deref(), Some("usage"));

        // the schema's placement stages a pointer to its database
        let blueprint = file.blueprint().unwrap();
        assert_eq!(blueprint.len(), 6);
    }

    #[test]
    fn test_entry_attrs_are_converted() {
        let file = BlueprintFile::parse(BLUEPRINT).unwrap();
        let attrs = file.resources[1].attrs().unwrap();
        assert_eq!(attrs["comment"], serde_json::json!("marts"));
        assert_eq!(attrs["data_retention_time_in_days"], serde_json::json!(7));
    }

    #[test]
    fn test_role_grant_needs_one_grantee() {
        let entry = ResourceEntry {
            kind: "role_grant".to_string(),
            role: Some("a".to_string()),
            ..Default::default()
        };
        assert!(entry.to_resource().is_err());
    }

    #[test]
    fn test_named_kind_needs_name() {
        let entry = ResourceEntry {
            kind: "warehouse".to_string(),
            ..Default::default()
        };
        let err = entry.to_resource().unwrap_err();
        assert!(err.to_string().contains("'name' is required"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(BlueprintFile::parse("[[resources]]\nkind = \"role\"\nnmae = \"x\"\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BLUEPRINT.as_bytes()).unwrap();
        let loaded = BlueprintFile::load(file.path()).unwrap();
        assert_eq!(loaded.resources.len(), 5);
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = BlueprintFile::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.toml"));
    }
}
