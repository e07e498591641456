//! AI completion seam for capability inference
//!
//! The engine only depends on [`AiClient`]; transport, model choice and retries
//! belong to the implementation. Everything coming back is validated here
//! against the controlled vocabulary and tier enum before it reaches a
//! [`CapabilityRecord`](crate::types::CapabilityRecord).

use crate::errors::{RecommendError, Result};
use crate::types::{Capability, ComplexityTier, ResourceTypeRef};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeSet;

// ─────────────────────────────────────────────────────────────────────────────
// Client Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Structured-output completion service
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Complete `prompt`, returning JSON intended to match `response_schema`
    ///
    /// The returned value is untrusted: callers validate it.
    async fn complete_structured(&self, prompt: &str, response_schema: &Value) -> Result<Value>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt and response schema
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic signals passed to the model as context
#[derive(Debug, Clone, Default)]
pub struct PromptSignals {
    pub capabilities: BTreeSet<Capability>,
    pub providers: BTreeSet<String>,
    pub abstractions: BTreeSet<String>,
    pub rule_tier: Option<ComplexityTier>,
}

/// JSON schema restricting the answer to the vocabulary and tier enum
pub fn capability_response_schema() -> Value {
    let vocabulary: Vec<String> = Capability::vocabulary()
        .iter()
        .map(ToString::to_string)
        .collect();
    json!({
        "type": "object",
        "properties": {
            "capabilities": {
                "type": "array",
                "items": { "type": "string", "enum": vocabulary }
            },
            "complexityTier": { "type": "string", "enum": ["low", "medium", "high"] },
            "description": { "type": "string" },
            "useCase": { "type": "string" }
        },
        "required": ["capabilities", "complexityTier", "description", "useCase"],
        "additionalProperties": false
    })
}

/// Build the capability-analysis prompt
pub fn build_capability_prompt(
    resource: &ResourceTypeRef,
    schema_excerpt: &str,
    signals: &PromptSignals,
) -> String {
    let join = |items: Vec<String>| {
        if items.is_empty() {
            "none".to_string()
        } else {
            items.join(", ")
        }
    };
    let caps = join(signals.capabilities.iter().map(ToString::to_string).collect());
    let providers = join(signals.providers.iter().cloned().collect());
    let abstractions = join(signals.abstractions.iter().cloned().collect());
    let tier = signals
        .rule_tier
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "Analyze the Kubernetes resource type below and describe what it lets a user do.\n\
         Only use capability tags from the allowed list in the response schema.\n\n\
         Kind: {kind}\n\
         API group: {group}\n\
         API version: {version}\n\
         Detected capabilities: {caps}\n\
         Detected providers: {providers}\n\
         Detected abstractions: {abstractions}\n\
         Complexity from required fields: {tier}\n\n\
         Schema excerpt:\n{schema_excerpt}\n",
        kind = resource.kind,
        group = if resource.is_core() { "core" } else { resource.group.as_str() },
        version = resource.version,
    )
}

/// First `max_chars` characters of `schema`, cut on a char boundary
pub fn schema_excerpt(schema: &str, max_chars: usize) -> &str {
    match schema.char_indices().nth(max_chars) {
        Some((idx, _)) => &schema[..idx],
        None => schema,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validated AI contribution to a capability record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiSignals {
    pub capabilities: BTreeSet<Capability>,
    pub complexity_tier: Option<ComplexityTier>,
    pub description: Option<String>,
    pub use_case: Option<String>,
    /// Tags outside the vocabulary that were discarded
    pub dropped_tags: Vec<String>,
}

/// Validate a model response.
///
/// Fields are checked one by one: an invalid field is discarded and the rest
/// kept. Only a response that is not a JSON object at all is an error.
pub fn validate_capability_response(value: &Value) -> Result<AiSignals> {
    let Some(obj) = value.as_object() else {
        return Err(RecommendError::ai_invalid(format!(
            "expected a JSON object, got {}",
            json_type_name(value)
        )));
    };

    let mut signals = AiSignals::default();

    if let Some(tags) = obj.get("capabilities").and_then(Value::as_array) {
        for tag in tags {
            match tag.as_str().and_then(Capability::parse_tag) {
                Some(cap) => {
                    signals.capabilities.insert(cap);
                }
                None => signals.dropped_tags.push(match tag.as_str() {
                    Some(s) => s.to_string(),
                    None => tag.to_string(),
                }),
            }
        }
    }

    signals.complexity_tier = obj
        .get("complexityTier")
        .and_then(Value::as_str)
        .and_then(ComplexityTier::parse);

    signals.description = non_empty_string(obj.get("description"));
    signals.use_case = non_empty_string(obj.get("useCase"));

    Ok(signals)
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
