//! Diff computation between desired and remote state

use crate::error::Result;
use crate::identifiers::ResourceName;
use crate::kind::Kind;
use crate::manifest::Manifest;
use crate::registry::{FieldType, Registry, keyword};
use crate::remote::RemoteState;
use crate::types::AttrMap;
use crate::urn::Urn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// What a diff does to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Add,
    Remove,
    Change,
}

/// A difference between desired and remote state of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub urn: Urn,
    pub kind: DiffKind,
    /// Remote attributes
    pub before: Option<AttrMap>,
    /// Desired attributes
    pub after: Option<AttrMap>,
    /// Fields whose desired value differs, with the desired value
    pub delta: AttrMap,
}

impl ResourceDiff {
    pub fn is_addition(&self) -> bool {
        self.kind == DiffKind::Add
    }

    pub fn is_removal(&self) -> bool {
        self.kind == DiffKind::Remove
    }

    pub fn is_modification(&self) -> bool {
        self.kind == DiffKind::Change
    }
}

/// Compare desired and remote state over the union of their URNs
///
/// Only fields declared in the registry are compared.
pub fn compute_diffs(
    manifest: &Manifest,
    remote: &RemoteState,
    registry: &Registry,
) -> Result<Vec<ResourceDiff>> {
    let urns: BTreeSet<&Urn> = manifest.resources.keys().chain(remote.keys()).collect();
    let mut diffs = Vec::new();

    for urn in urns {
        let desired = manifest.get(urn).map(|entry| &entry.attrs);
        let current = remote.get(urn);
        match (desired, current) {
            (Some(desired), None) => diffs.push(ResourceDiff {
                urn: urn.clone(),
                kind: DiffKind::Add,
                before: None,
                after: Some(desired.clone()),
                delta: desired.clone(),
            }),
            (None, Some(current)) => diffs.push(ResourceDiff {
                urn: urn.clone(),
                kind: DiffKind::Remove,
                before: Some(current.clone()),
                after: None,
                delta: AttrMap::new(),
            }),
            (Some(desired), Some(current)) => {
                let delta = diff_attrs(urn.kind, desired, current, registry)?;
                if !delta.is_empty() {
                    diffs.push(ResourceDiff {
                        urn: urn.clone(),
                        kind: DiffKind::Change,
                        before: Some(current.clone()),
                        after: Some(desired.clone()),
                        delta,
                    });
                }
            }
            (None, None) => {}
        }
    }

    Ok(diffs)
}

/// Sparse map of fields whose desired value differs from the current one
pub fn diff_attrs(kind: Kind, desired: &AttrMap, current: &AttrMap, registry: &Registry) -> Result<AttrMap> {
    let spec = registry.get(kind)?;
    let mut delta = AttrMap::new();
    for field in &spec.fields {
        let want = desired.get(field.name).unwrap_or(&Value::Null);
        let have = current.get(field.name).unwrap_or(&Value::Null);
        if !field_eq(field.ty, want, have, spec.grant_like) {
            delta.insert(field.name.to_string(), want.clone());
        }
    }
    Ok(delta)
}

/// Type-aware equality. Lists of grant-like kinds compare as multisets.
pub fn field_eq(ty: FieldType, a: &Value, b: &Value, unordered: bool) -> bool {
    if a == b {
        return true;
    }
    match (ty, a, b) {
        (_, Value::Null, _) | (_, _, Value::Null) => false,
        (FieldType::Name, Value::String(a), Value::String(b)) => {
            ResourceName::new(a) == ResourceName::new(b)
        }
        (FieldType::Keyword, Value::String(a), Value::String(b)) => keyword(a) == keyword(b),
        (FieldType::Int | FieldType::Float, a, b) => match (as_f64(a), as_f64(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (FieldType::Bool, a, b) => match (as_bool(a), as_bool(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (FieldType::NameList, Value::Array(a), Value::Array(b)) => {
            let names = |items: &[Value]| -> Option<Vec<ResourceName>> {
                items
                    .iter()
                    .map(|v| v.as_str().map(ResourceName::new))
                    .collect()
            };
            match (names(a), names(b)) {
                (Some(mut a), Some(mut b)) => {
                    if unordered {
                        a.sort();
                        b.sort();
                    }
                    a == b
                }
                _ => false,
            }
        }
        (FieldType::Args, Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| arg_eq(a, b))
        }
        (FieldType::List, Value::Array(a), Value::Array(b)) if unordered => {
            a.len() == b.len() && multiset(a) == multiset(b)
        }
        _ => false,
    }
}

/// Arguments match on name and type; defaults are not reported back
fn arg_eq(a: &Value, b: &Value) -> bool {
    let name = |v: &Value| v.get("name").and_then(Value::as_str).map(ResourceName::new);
    let data_type = |v: &Value| {
        v.get("data_type")
            .and_then(Value::as_str)
            .map(|t| t.trim().to_ascii_uppercase())
    };
    name(a) == name(b) && data_type(a) == data_type(b)
}

fn multiset(items: &[Value]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item.to_string()).or_insert(0) += 1;
    }
    counts
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
