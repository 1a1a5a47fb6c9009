//! Case-aware identifiers
//!
//! Warehouse identifiers are case-insensitive unless double-quoted. A
//! [`ResourceName`] stores the normalized form (uppercase for unquoted
//! identifiers, verbatim for quoted ones) as an interned symbol, so equality
//! and hashing are a single integer comparison.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, RwLock};

#[derive(Default)]
struct Interner {
    ids: HashMap<Arc<str>, u32>,
}

fn interner() -> &'static RwLock<Interner> {
    static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| RwLock::new(Interner::default()))
}

/// Intern a normalized identifier, returning its symbol and shared text
fn intern(key: &str) -> (u32, Arc<str>) {
    {
        let guard = match interner().read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((text, id)) = guard.ids.get_key_value(key) {
            return (*id, Arc::clone(text));
        }
    }

    let mut guard = match interner().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some((text, id)) = guard.ids.get_key_value(key) {
        return (*id, Arc::clone(text));
    }
    let id = guard.ids.len() as u32;
    let text: Arc<str> = Arc::from(key);
    guard.ids.insert(Arc::clone(&text), id);
    (id, text)
}

/// A warehouse identifier with case-insensitive equality unless quoted
#[derive(Clone)]
pub struct ResourceName {
    symbol: u32,
    key: Arc<str>,
}

impl ResourceName {
    /// Create a name from user input.
    ///
    /// `"..."` is a quoted identifier (with `""` as an escaped quote). A plain
    /// identifier (`[A-Za-z_][A-Za-z0-9_$]*`) is folded to uppercase. Anything
    /// else, e.g. `info@example.com`, needs quoting and keeps its case.
    pub fn new(raw: &str) -> Self {
        let key = if let Some(inner) = strip_quotes(raw) {
            inner.replace("\"\"", "\"")
        } else if is_plain_identifier(raw) {
            raw.to_ascii_uppercase()
        } else {
            raw.to_string()
        };
        let (symbol, key) = intern(&key);
        Self { symbol, key }
    }

    /// Parse a single identifier, rejecting empty input
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "\"\"" {
            return Err(Error::InvalidName(raw.to_string()));
        }
        Ok(Self::new(trimmed))
    }

    /// The normalized identifier text, without quotes
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Whether this name must be quoted when rendered
    pub fn is_quoted(&self) -> bool {
        !is_canonical_unquoted(&self.key)
    }

    /// Case-aware comparison against raw user input
    pub fn matches(&self, raw: &str) -> bool {
        *self == ResourceName::new(raw)
    }
}

fn strip_quotes(raw: &str) -> Option<&str> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn is_canonical_unquoted(s: &str) -> bool {
    is_plain_identifier(s) && !s.chars().any(|c| c.is_ascii_lowercase())
}

impl PartialEq for ResourceName {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }
}

impl Eq for ResourceName {}

impl Hash for ResourceName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
    }
}

impl PartialOrd for ResourceName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceName {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.symbol == other.symbol {
            return Ordering::Equal;
        }
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_quoted() {
            write!(f, "\"{}\"", self.key.replace('"', "\"\""))
        } else {
            write!(f, "{}", self.key)
        }
    }
}

impl fmt::Debug for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceName({})", self)
    }
}

impl From<&str> for ResourceName {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ResourceName {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&ResourceName> for ResourceName {
    fn from(name: &ResourceName) -> Self {
        name.clone()
    }
}

impl Serialize for ResourceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ResourceName::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Split a dotted identifier (`db.schema."my.table"`) on dots outside quotes
pub fn parse_identifier(raw: &str) -> Result<Vec<ResourceName>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push_str("\"\"");
                chars.next();
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '.' if !in_quotes => {
                parts.push(ResourceName::parse(&current)?);
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err(Error::InvalidName(raw.to_string()));
    }
    parts.push(ResourceName::parse(&current)?);
    Ok(parts)
}

/// Join names into a dotted identifier
pub fn join_identifier<'a>(names: impl IntoIterator<Item = &'a ResourceName>) -> String {
    names
        .into_iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
