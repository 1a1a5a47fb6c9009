//! SQL rendering of changes
//!
//! Generic kinds become `CREATE <TYPE> <name> KEY = value ...`. Grants,
//! role grants and tag references have their own statement shapes, as do
//! kinds with a body (views, functions, tasks, pipes) or columns (tables).

use declarative::{AttrMap, FieldType, Fqn, Kind, Registry, Renderer, ResourceName, Urn};
use serde_json::Value;

/// Attributes rendered by dedicated clauses, never as `KEY = value`
const STRUCTURAL: &[&str] = &[
    "name", "owner", "columns", "as_", "args", "returns", "language", "on_table", "directory", "secure",
    "transient", "cluster_by", "_privs",
];

/// Renders DDL using the field types of a registry
pub struct SqlRenderer<'a> {
    registry: &'a Registry,
}

impl<'a> SqlRenderer<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    fn field_type(&self, kind: Kind, key: &str) -> FieldType {
        self.registry
            .get(kind)
            .ok()
            .and_then(|spec| spec.get_field(key))
            .map_or(FieldType::Any, |field| field.ty)
    }

    /// `KEY = value` clauses for every set, non-structural attribute
    fn properties(&self, kind: Kind, attrs: &AttrMap) -> Vec<String> {
        attrs
            .iter()
            .filter(|(key, value)| !value.is_null() && !STRUCTURAL.contains(&key.as_str()))
            .map(|(key, value)| {
                format!(
                    "{} = {}",
                    key.to_ascii_uppercase(),
                    literal(self.field_type(kind, key), value)
                )
            })
            .collect()
    }

    fn comment_clause(attrs: &AttrMap) -> Option<String> {
        attrs
            .get("comment")
            .and_then(Value::as_str)
            .map(|c| format!("COMMENT = {}", quote(c)))
    }
}

fn quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

fn identifier(raw: &str) -> String {
    ResourceName::new(raw).to_string()
}

/// SQL literal for a value of the given field type
fn literal(ty: FieldType, value: &Value) -> String {
    match (ty, value) {
        (_, Value::Null) => "NULL".to_string(),
        (_, Value::Bool(true)) => "TRUE".to_string(),
        (_, Value::Bool(false)) => "FALSE".to_string(),
        (_, Value::Number(n)) => n.to_string(),
        (FieldType::Name, Value::String(s)) => identifier(s),
        (_, Value::String(s)) => quote(s),
        (FieldType::NameList, Value::Array(items)) => {
            let names: Vec<String> = items
                .iter()
                .map(|item| item.as_str().map_or_else(|| item.to_string(), identifier))
                .collect();
            format!("({})", names.join(", "))
        }
        (_, Value::Array(items)) => {
            let items: Vec<String> = items.iter().map(|item| literal(FieldType::Any, item)).collect();
            format!("({})", items.join(", "))
        }
        (_, Value::Object(_)) => quote(&value.to_string()),
    }
}

fn text<'v>(attrs: &'v AttrMap, key: &str) -> &'v str {
    attrs.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn flag(attrs: &AttrMap, key: &str) -> bool {
    attrs.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Object name with argument types, without URN parameters
fn object_name(urn: &Urn) -> String {
    qualified_name(&urn.fqn)
}

fn qualified_name(fqn: &Fqn) -> String {
    match &fqn.arg_types {
        Some(types) => format!("{}({})", fqn.path(), types.join(", ")),
        None => fqn.path(),
    }
}

fn plural(kind: Kind) -> String {
    format!("{}S", kind.sql_type())
}

fn kind_attr(attrs: &AttrMap, key: &str) -> Option<Kind> {
    text(attrs, key).parse().ok()
}

/// `<priv> ON <target>` for plain grants
fn grant_target(attrs: &AttrMap) -> String {
    match kind_attr(attrs, "on_type") {
        Some(Kind::Account) | None => format!("{} ON ACCOUNT", text(attrs, "priv")),
        Some(kind) => format!("{} ON {} {}", text(attrs, "priv"), kind.sql_type(), text(attrs, "on")),
    }
}

/// `<priv> ON FUTURE|ALL <TYPE>S IN <container>` for bulk grants
fn bulk_grant_target(scope: &str, attrs: &AttrMap) -> String {
    let on = kind_attr(attrs, "on_type").map(plural).unwrap_or_default();
    let in_type = kind_attr(attrs, "in_type").map(|k| k.sql_type()).unwrap_or_default();
    format!(
        "{} ON {} {} IN {} {}",
        text(attrs, "priv"),
        scope,
        on,
        in_type,
        text(attrs, "in_name")
    )
}

fn role_grant_target(attrs: &AttrMap) -> (String, String) {
    let grantee = match attrs.get("to_user").and_then(Value::as_str) {
        Some(user) => format!("USER {}", identifier(user)),
        None => format!("ROLE {}", identifier(text(attrs, "to_role"))),
    };
    (format!("ROLE {}", identifier(text(attrs, "role"))), grantee)
}

fn tag_assignments(attrs: &AttrMap) -> Vec<(String, String)> {
    match attrs.get("tags") {
        Some(Value::Object(tags)) => tags
            .iter()
            .map(|(tag, value)| (tag.clone(), value.as_str().unwrap_or_default().to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn column(value: &Value) -> String {
    match value {
        Value::Object(col) => {
            let mut parts = vec![
                identifier(col.get("name").and_then(Value::as_str).unwrap_or_default()),
                col.get("data_type")
                    .and_then(Value::as_str)
                    .unwrap_or("VARCHAR")
                    .to_ascii_uppercase(),
            ];
            if col.get("not_null").and_then(Value::as_bool).unwrap_or(false) {
                parts.push("NOT NULL".to_string());
            }
            if let Some(comment) = col.get("comment").and_then(Value::as_str) {
                parts.push(format!("COMMENT {}", quote(comment)));
            }
            parts.join(" ")
        }
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn argument(value: &Value) -> String {
    let name = value.get("name").and_then(Value::as_str).unwrap_or_default();
    let data_type = value.get("data_type").and_then(Value::as_str).unwrap_or_default();
    format!("{} {}", identifier(name), data_type.to_ascii_uppercase())
}

fn join(parts: Vec<String>) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Renderer for SqlRenderer<'_> {
    fn create(&self, urn: &Urn, attrs: &AttrMap) -> String {
        let name = object_name(urn);
        let secure = if flag(attrs, "secure") { "SECURE " } else { "" };
        let transient = if flag(attrs, "transient") { "TRANSIENT " } else { "" };
        let comment = Self::comment_clause(attrs).unwrap_or_default();

        match urn.kind {
            Kind::Grant => {
                let option = if flag(attrs, "grant_option") { "WITH GRANT OPTION" } else { "" };
                join(vec![
                    format!("GRANT {} TO ROLE {}", grant_target(attrs), identifier(text(attrs, "to"))),
                    option.to_string(),
                ])
            }
            Kind::FutureGrant | Kind::GrantOnAll => {
                let scope = if urn.kind == Kind::FutureGrant { "FUTURE" } else { "ALL" };
                let option = if flag(attrs, "grant_option") { "WITH GRANT OPTION" } else { "" };
                join(vec![
                    format!(
                        "GRANT {} TO ROLE {}",
                        bulk_grant_target(scope, attrs),
                        identifier(text(attrs, "to"))
                    ),
                    option.to_string(),
                ])
            }
            Kind::RoleGrant => {
                let (role, grantee) = role_grant_target(attrs);
                format!("GRANT {} TO {}", role, grantee)
            }
            Kind::TagReference => {
                let assignments: Vec<String> = tag_assignments(attrs)
                    .into_iter()
                    .map(|(tag, value)| format!("{} = {}", tag, quote(&value)))
                    .collect();
                format!(
                    "ALTER {} {} SET TAG {}",
                    text(attrs, "object_domain"),
                    text(attrs, "object_name"),
                    assignments.join(", ")
                )
            }
            Kind::Table => {
                let columns: Vec<String> = match attrs.get("columns") {
                    Some(Value::Array(cols)) => cols.iter().map(column).collect(),
                    _ => Vec::new(),
                };
                let mut parts = vec![format!("CREATE TABLE {} ({})", name, columns.join(", "))];
                if let Some(Value::Array(keys)) = attrs.get("cluster_by") {
                    let keys: Vec<String> = keys.iter().filter_map(Value::as_str).map(identifier).collect();
                    parts.push(format!("CLUSTER BY ({})", keys.join(", ")));
                }
                parts.extend(self.properties(urn.kind, attrs));
                join(parts)
            }
            Kind::View => join(vec![
                format!("CREATE {}VIEW {}", secure, name),
                comment,
                format!("AS {}", text(attrs, "as_")),
            ]),
            Kind::Function | Kind::Procedure => {
                let args: Vec<String> = match attrs.get("args") {
                    Some(Value::Array(args)) => args.iter().map(argument).collect(),
                    _ => Vec::new(),
                };
                join(vec![
                    format!(
                        "CREATE {}{} {}({})",
                        secure,
                        urn.kind.sql_type(),
                        urn.fqn.path(),
                        args.join(", ")
                    ),
                    format!("RETURNS {}", text(attrs, "returns")),
                    format!("LANGUAGE {}", text(attrs, "language")),
                    comment,
                    format!("AS $${}$$", text(attrs, "as_")),
                ])
            }
            Kind::Stream => {
                let mut parts = vec![format!(
                    "CREATE STREAM {} ON TABLE {}",
                    name,
                    identifier(text(attrs, "on_table"))
                )];
                parts.extend(self.properties(urn.kind, attrs));
                join(parts)
            }
            Kind::Task | Kind::Pipe => {
                let mut parts = vec![format!("CREATE {} {}", urn.kind.sql_type(), name)];
                parts.extend(
                    self.properties(urn.kind, attrs)
                        .into_iter()
                        .filter(|p| !p.starts_with("COMMENT")),
                );
                parts.push(comment);
                parts.push(format!("AS {}", text(attrs, "as_")));
                join(parts)
            }
            Kind::Stage => {
                let mut parts = vec![format!("CREATE STAGE {}", name)];
                parts.extend(self.properties(urn.kind, attrs));
                if flag(attrs, "directory") {
                    parts.push("DIRECTORY = (ENABLE = TRUE)".to_string());
                }
                join(parts)
            }
            kind => {
                let mut parts = vec![format!("CREATE {}{} {}", transient, kind.sql_type(), name)];
                parts.extend(self.properties(kind, attrs));
                join(parts)
            }
        }
    }

    fn alter(&self, urn: &Urn, before: &AttrMap, delta: &AttrMap) -> Vec<String> {
        let sql_type = urn.kind.sql_type();

        if urn.kind == Kind::TagReference {
            let merged: AttrMap = before
                .iter()
                .chain(delta.iter())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            return vec![self.create(urn, &merged)];
        }
        if self.registry.get(urn.kind).is_ok_and(|spec| spec.grant_like) {
            log::warn!("{}: grants are replaced, not altered; ignoring {:?}", urn, delta.keys());
            return Vec::new();
        }

        let mut statements = Vec::new();
        let mut name = object_name(urn);
        if let Some(new_name) = delta.get("name").and_then(Value::as_str) {
            let renamed = Fqn {
                name: ResourceName::new(new_name),
                ..urn.fqn.clone()
            };
            statements.push(format!("ALTER {} {} RENAME TO {}", sql_type, name, renamed.path()));
            name = qualified_name(&renamed);
        }

        let (unset, set): (Vec<(&String, &Value)>, Vec<(&String, &Value)>) = delta
            .iter()
            .filter(|(key, _)| key.as_str() != "name")
            .partition(|(_, value)| value.is_null());

        if !set.is_empty() {
            let clauses: Vec<String> = set
                .into_iter()
                .map(|(key, value)| match key.as_str() {
                    "secure" => format!("SECURE = {}", literal(FieldType::Bool, value)),
                    _ => format!(
                        "{} = {}",
                        key.to_ascii_uppercase(),
                        literal(self.field_type(urn.kind, key), value)
                    ),
                })
                .collect();
            statements.push(format!("ALTER {} {} SET {}", sql_type, name, clauses.join(", ")));
        }
        if !unset.is_empty() {
            let keys: Vec<String> = unset.iter().map(|(k, _)| k.to_ascii_uppercase()).collect();
            statements.push(format!("ALTER {} {} UNSET {}", sql_type, name, keys.join(", ")));
        }
        statements
    }

    fn drop(&self, urn: &Urn, attrs: &AttrMap) -> String {
        match urn.kind {
            Kind::Grant => format!(
                "REVOKE {} FROM ROLE {}",
                grant_target(attrs),
                identifier(text(attrs, "to"))
            ),
            Kind::FutureGrant | Kind::GrantOnAll => {
                let scope = if urn.kind == Kind::FutureGrant { "FUTURE" } else { "ALL" };
                format!(
                    "REVOKE {} FROM ROLE {}",
                    bulk_grant_target(scope, attrs),
                    identifier(text(attrs, "to"))
                )
            }
            Kind::RoleGrant => {
                let (role, grantee) = role_grant_target(attrs);
                format!("REVOKE {} FROM {}", role, grantee)
            }
            Kind::TagReference => {
                let tags: Vec<String> = tag_assignments(attrs).into_iter().map(|(tag, _)| tag).collect();
                format!(
                    "ALTER {} {} UNSET TAG {}",
                    text(attrs, "object_domain"),
                    text(attrs, "object_name"),
                    tags.join(", ")
                )
            }
            kind => format!("DROP {} IF EXISTS {}", kind.sql_type(), object_name(urn)),
        }
    }

    fn transfer(&self, urn: &Urn, to_role: &ResourceName) -> String {
        format!(
            "GRANT OWNERSHIP ON {} {} TO ROLE {} COPY CURRENT GRANTS",
            urn.kind.sql_type(),
            object_name(urn),
            to_role
        )
    }
}
