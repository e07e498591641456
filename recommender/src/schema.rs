//! Schema text outlines and the schema-source seam
//!
//! The cluster hands back schemas in whatever shape it has: OpenAPI JSON from
//! the discovery endpoint, a CRD manifest in YAML, or `kubectl explain`
//! output. Everything downstream works on a flat [`SchemaOutline`], which is
//! extracted here without ever failing. An unrecognized shape yields an empty
//! outline.

use crate::errors::Result;
use crate::types::ResourceTypeRef;
use async_trait::async_trait;
use serde_json::Value;

/// Source of raw schema text for cluster resource types.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Raw schema text for `resource`
    ///
    /// Fails with `SchemaUnavailable` when the cluster cannot describe the type.
    async fn get_resource_schema(&self, resource: &ResourceTypeRef) -> Result<String>;

    /// Every resource type the cluster currently serves
    async fn list_known_resource_types(&self) -> Result<Vec<ResourceTypeRef>>;
}

/// Shape the outline was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    OpenApiJson,
    OpenApiYaml,
    ExplainText,
    Unrecognized,
}

/// One field of a schema, flattened
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    /// Dotted path from the schema root, e.g. `spec.forProvider.resourceGroupNameRef`
    pub path: String,
    /// Last path segment
    pub name: String,
    /// Declared type (`string`, `object`, `Object`, `[]string`...)
    pub type_hint: Option<String>,
    pub description: String,
    /// Listed in the parent's `required:` declaration
    pub required: bool,
    pub has_default: bool,
}

impl SchemaField {
    /// Fields describing live state rather than desired configuration
    pub fn is_status(&self) -> bool {
        self.path == "status" || self.path.starts_with("status.")
    }

    /// Kubernetes object envelope (`apiVersion`, `kind`, `metadata`)
    pub fn is_envelope(&self) -> bool {
        matches!(self.path.as_str(), "apiVersion" | "kind" | "metadata")
            || self.path.starts_with("metadata.")
    }
}

/// Flat view of a resource schema
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaOutline {
    pub format: SchemaFormat,
    /// Top-level description of the resource type
    pub description: String,
    pub fields: Vec<SchemaField>,
}

impl SchemaOutline {
    fn empty() -> Self {
        Self {
            format: SchemaFormat::Unrecognized,
            description: String::new(),
            fields: Vec::new(),
        }
    }

    /// Parse schema text, trying JSON, then YAML, then `kubectl explain` text
    pub fn parse(text: &str) -> Self {
        if let Ok(value) = serde_json::from_str::<Value>(text)
            && let Some(outline) = Self::from_openapi(&value, SchemaFormat::OpenApiJson)
        {
            return outline;
        }

        if let Ok(value) = serde_yaml::from_str::<Value>(text)
            && let Some(outline) = Self::from_openapi(&value, SchemaFormat::OpenApiYaml)
        {
            return outline;
        }

        let outline = parse_explain(text);
        if outline.fields.is_empty() && outline.description.is_empty() {
            tracing::debug!("schema text not recognized; using empty outline");
            return Self::empty();
        }
        outline
    }

    fn from_openapi(value: &Value, format: SchemaFormat) -> Option<Self> {
        let root = find_schema_root(value, 0)?;
        let mut fields = Vec::new();
        walk_properties(root, "", 0, true, &mut fields);
        let description = root
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        Some(Self {
            format,
            description,
            fields,
        })
    }

    /// Fields that describe configuration (no envelope, no status)
    pub fn config_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields
            .iter()
            .filter(|f| !f.is_status() && !f.is_envelope())
    }

    /// Count of required configuration fields with no default
    pub fn required_without_default(&self) -> usize {
        self.config_fields()
            .filter(|f| f.required && !f.has_default && !is_structural_container(f))
            .count()
    }

    pub fn field(&self, path: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.path == path)
    }
}

/// `spec` and `spec.forProvider` are required wrappers, not user decisions
fn is_structural_container(field: &SchemaField) -> bool {
    matches!(field.path.as_str(), "spec" | "spec.forProvider" | "spec.initProvider")
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAPI walk
// ─────────────────────────────────────────────────────────────────────────────

const MAX_SEARCH_DEPTH: usize = 8;
const MAX_FIELD_DEPTH: usize = 16;

/// Locate the object schema: a node with `properties`, an `openAPIV3Schema`
/// wrapper, or a CRD's first served version.
fn find_schema_root(value: &Value, depth: usize) -> Option<&Value> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get("openAPIV3Schema") {
                return find_schema_root(inner, depth + 1).or(Some(inner));
            }
            if map.get("properties").is_some_and(Value::is_object) {
                return Some(value);
            }
            // Deterministic: check well-known wrappers before generic children.
            for key in ["spec", "versions", "schema", "definitions", "components"] {
                if let Some(child) = map.get(key)
                    && let Some(found) = find_schema_root(child, depth + 1)
                {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| find_schema_root(item, depth + 1)),
        _ => None,
    }
}

/// `chain` holds when every ancestor of `node` is itself required. A field
/// counts as required only when its parent lists it and `chain` holds; array
/// items break the chain.
fn walk_properties(
    node: &Value,
    prefix: &str,
    depth: usize,
    chain: bool,
    out: &mut Vec<SchemaField>,
) {
    if depth > MAX_FIELD_DEPTH {
        return;
    }
    let Some(properties) = node.get("properties").and_then(Value::as_object) else {
        return;
    };
    let required: Vec<&str> = node
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for (name, prop) in properties {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        let is_required = chain && required.contains(&name.as_str());
        out.push(SchemaField {
            path: path.clone(),
            name: name.clone(),
            type_hint: prop.get("type").and_then(Value::as_str).map(str::to_string),
            description: prop
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            required: is_required,
            has_default: prop.get("default").is_some(),
        });

        let child_chain = is_required || opens_required_chain(prefix, name);
        walk_properties(prop, &path, depth + 1, child_chain, out);
        if let Some(items) = prop.get("items") {
            walk_properties(items, &path, depth + 1, false, out);
        }
    }
}

/// Top-level `spec` is the resource body even when the root omits `required`.
fn opens_required_chain(prefix: &str, name: &str) -> bool {
    prefix.is_empty() && name == "spec"
}

// ─────────────────────────────────────────────────────────────────────────────
// kubectl explain
// ─────────────────────────────────────────────────────────────────────────────

/// Parse `kubectl explain [--recursive]` output.
///
/// Field lines look like `   name\t<type> -required-`; nesting follows
/// indentation. Indented prose after a field line is that field's description.
fn parse_explain(text: &str) -> SchemaOutline {
    let mut description = String::new();
    let mut fields: Vec<SchemaField> = Vec::new();
    // (indent, path, chain) of open ancestors
    let mut stack: Vec<(usize, String, bool)> = Vec::new();
    let mut section = "";

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let indent = line.len() - line.trim_start().len();

        if indent == 0 {
            if let Some((header, _)) = trimmed.split_once(':')
                && header.chars().all(|c| c.is_ascii_uppercase())
            {
                section = match header {
                    "DESCRIPTION" => "description",
                    "FIELDS" => "fields",
                    _ => "",
                };
            }
            continue;
        }

        match section {
            "description" => {
                if !description.is_empty() {
                    description.push(' ');
                }
                description.push_str(trimmed);
            }
            "fields" => {
                if let Some((name, type_hint, required)) = parse_explain_field(trimmed) {
                    while stack.last().is_some_and(|(i, _, _)| *i >= indent) {
                        stack.pop();
                    }
                    let (path, prefix, chain) = match stack.last() {
                        Some((_, parent, chain)) => {
                            (format!("{parent}.{name}"), parent.as_str(), *chain)
                        }
                        None => (name.to_string(), "", true),
                    };
                    let required = required && chain;
                    let child_chain = !type_hint.starts_with("[]")
                        && (required || opens_required_chain(prefix, name));
                    stack.push((indent, path.clone(), child_chain));
                    fields.push(SchemaField {
                        path,
                        name: name.to_string(),
                        type_hint: Some(type_hint.to_string()),
                        description: String::new(),
                        required,
                        has_default: false,
                    });
                } else if let Some(last) = fields.last_mut() {
                    if !last.description.is_empty() {
                        last.description.push(' ');
                    }
                    last.description.push_str(trimmed);
                    let lower = trimmed.to_ascii_lowercase();
                    if lower.contains("defaults to") || lower.contains("default value") {
                        last.has_default = true;
                    }
                }
            }
            _ => {}
        }
    }

    SchemaOutline {
        format: SchemaFormat::ExplainText,
        description,
        fields,
    }
}

/// `name <type> [-required-]`
fn parse_explain_field(line: &str) -> Option<(&str, &str, bool)> {
    let (name, rest) = line.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('<')?;
    let (type_hint, tail) = rest.split_once('>')?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return None;
    }
    let tail = tail.trim();
    if !(tail.is_empty() || tail == "-required-") {
        return None;
    }
    Some((name, type_hint, tail == "-required-"))
}
