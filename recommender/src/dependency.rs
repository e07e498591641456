//! Dependency inference
//!
//! Derives [`DependencyEdge`]s from a schema outline with a fixed table of
//! reference-field rules plus the cloud-provider heuristic. Unmatched fields
//! produce nothing: a missing edge is a false negative the user can recover
//! from, a spurious `required` edge corrupts every solution built on it.

use crate::config::DependencyConfig;
use crate::providers;
use crate::schema::{SchemaField, SchemaOutline};
use crate::types::{DependencyEdge, EdgeKey, RelationKind, ResourceTypeRef};
use chrono::{DateTime, Utc};
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ─────────────────────────────────────────────────────────────────────────────
// Rule table
// ─────────────────────────────────────────────────────────────────────────────

/// How a matching field names its target
#[derive(Debug, Clone, Copy)]
enum Target {
    /// Always the same type: (kind, group, version)
    WellKnown(&'static str, &'static str, &'static str),
    /// Any of these (kind, group) pairs present in the catalog
    AnyOf(&'static [(&'static str, &'static str)]),
    /// Strip the suffix captured as `base`, capitalize, look up by kind
    StripSuffix,
}

#[derive(Debug, Clone, Copy)]
struct ReferenceRule {
    name: &'static str,
    /// Matched against the field name
    field_pattern: &'static str,
    /// Matched against the declared type, when present
    type_pattern: Option<&'static str>,
    /// Relation when the schema does not list the field as required
    default_relation: RelationKind,
    target: Target,
    reason: &'static str,
}

/// Fields that look like references but point at outputs or controller config
const IGNORED_FIELDS: &[&str] = &[
    "writeConnectionSecretToRef",
    "publishConnectionDetailsTo",
    "providerConfigRef",
    "providerRef",
    "compositionRef",
    "compositionSelector",
    "compositionRevisionRef",
    "compositionRevisionSelector",
    "resourceRef",
    "resourceRefs",
    "claimRef",
    "ownerRef",
    "namespaceSelector",
    "podSelector",
    "selector",
];

/// First matching rule wins.
const RULES: &[ReferenceRule] = &[
    ReferenceRule {
        name: "secret-ref",
        field_pattern: r"(?i)(secretref|secretkeyref|^secretname)$",
        type_pattern: None,
        default_relation: RelationKind::Optional,
        target: Target::WellKnown("Secret", "", "v1"),
        reason: "field references a Secret",
    },
    ReferenceRule {
        name: "config-map-ref",
        field_pattern: r"(?i)(configmapref|configmapkeyref|^configmapname)$",
        type_pattern: None,
        default_relation: RelationKind::Optional,
        target: Target::WellKnown("ConfigMap", "", "v1"),
        reason: "field references a ConfigMap",
    },
    ReferenceRule {
        name: "service-account",
        field_pattern: r"^serviceAccountName$",
        type_pattern: Some(r"(?i)^string$"),
        default_relation: RelationKind::Optional,
        target: Target::WellKnown("ServiceAccount", "", "v1"),
        reason: "workload runs as a ServiceAccount",
    },
    ReferenceRule {
        name: "volume-claim",
        field_pattern: r"^claimName$",
        type_pattern: Some(r"(?i)^string$"),
        default_relation: RelationKind::Optional,
        target: Target::WellKnown("PersistentVolumeClaim", "", "v1"),
        reason: "volume is backed by a PersistentVolumeClaim",
    },
    ReferenceRule {
        name: "storage-class",
        field_pattern: r"^storageClassName$",
        type_pattern: Some(r"(?i)^string$"),
        default_relation: RelationKind::Optional,
        target: Target::WellKnown("StorageClass", "storage.k8s.io", "v1"),
        reason: "storage is provisioned through a StorageClass",
    },
    ReferenceRule {
        name: "ingress-class",
        field_pattern: r"^ingressClassName$",
        type_pattern: Some(r"(?i)^string$"),
        default_relation: RelationKind::Optional,
        target: Target::WellKnown("IngressClass", "networking.k8s.io", "v1"),
        reason: "traffic is served by an IngressClass controller",
    },
    ReferenceRule {
        name: "scale-target",
        field_pattern: r"^(scaleTargetRef|targetRef)$",
        type_pattern: None,
        default_relation: RelationKind::Enhances,
        target: Target::AnyOf(&[
            ("Deployment", "apps"),
            ("StatefulSet", "apps"),
            ("ReplicaSet", "apps"),
        ]),
        reason: "field targets a workload to scale or tune",
    },
    ReferenceRule {
        name: "typed-reference",
        field_pattern: r"^(?P<base>[a-z][A-Za-z0-9]*?)(Name|Id|ID|Arn)?(Ref|Selector)$",
        type_pattern: Some(r"(?i)^object$"),
        default_relation: RelationKind::Optional,
        target: Target::StripSuffix,
        reason: "field references another resource by name",
    },
];

struct CompiledRule {
    rule: &'static ReferenceRule,
    field: Regex,
    type_hint: Option<Regex>,
}

#[allow(clippy::expect_used)]
fn compiled_rules() -> &'static [CompiledRule] {
    static COMPILED: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|rule| CompiledRule {
                rule,
                field: Regex::new(rule.field_pattern).expect("valid reference field pattern"),
                type_hint: rule
                    .type_pattern
                    .map(|p| Regex::new(p).expect("valid reference type pattern")),
            })
            .collect()
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Inference
// ─────────────────────────────────────────────────────────────────────────────

/// Dependency inference engine
#[derive(Debug, Clone, Default)]
pub struct DependencyInferrer {
    config: DependencyConfig,
}

impl DependencyInferrer {
    pub fn new(config: DependencyConfig) -> Self {
        Self { config }
    }

    /// Infer edges from raw schema text
    pub fn infer(
        &self,
        resource: &ResourceTypeRef,
        schema_text: &str,
        known_types: &[ResourceTypeRef],
    ) -> Vec<DependencyEdge> {
        let outline = SchemaOutline::parse(schema_text);
        self.infer_with_outline(resource, &outline, known_types, Utc::now())
    }

    /// Infer edges from a parsed outline, stamped with `now`.
    ///
    /// Output is deduplicated by edge key and sorted by it.
    pub fn infer_with_outline(
        &self,
        resource: &ResourceTypeRef,
        outline: &SchemaOutline,
        known_types: &[ResourceTypeRef],
        now: DateTime<Utc>,
    ) -> Vec<DependencyEdge> {
        let mut edges: BTreeMap<EdgeKey, DependencyEdge> = BTreeMap::new();
        let mut insert = |edge: DependencyEdge| {
            if edge.dependency.same_kind_and_group(&edge.dependent) {
                return;
            }
            let key = edge.key();
            match edges.get(&key) {
                Some(existing) if existing.confidence >= edge.confidence => {}
                _ => {
                    edges.insert(key, edge);
                }
            }
        };

        for field in outline.config_fields() {
            if IGNORED_FIELDS.contains(&field.name.as_str()) {
                continue;
            }
            let Some((compiled, base)) = match_rule(field) else {
                continue;
            };
            let rule = compiled.rule;
            let targets = self.resolve_targets(resource, rule.target, base.as_deref(), known_types);
            if targets.is_empty() {
                tracing::debug!(
                    resource = %resource,
                    field = %field.path,
                    rule = rule.name,
                    "reference target not in catalog; no edge"
                );
                continue;
            }

            let relation = if field.required {
                RelationKind::Required
            } else {
                rule.default_relation
            };
            let confidence = match (rule.target, targets.len()) {
                (Target::WellKnown(..), _) => self.config.well_known_confidence,
                (_, 1) => self.config.explicit_confidence,
                _ => self.config.ambiguous_confidence,
            };

            for target in targets {
                insert(DependencyEdge {
                    dependent: resource.clone(),
                    dependency: target,
                    relation,
                    field: field.path.clone(),
                    evidence: field_evidence(field),
                    reason: rule.reason.to_string(),
                    confidence,
                    discovered_at: now,
                });
            }
        }

        if self.config.provider_heuristic_enabled
            && let Some(foundational) = providers::foundational_for(resource, known_types)
        {
            insert(DependencyEdge {
                dependent: resource.clone(),
                reason: format!(
                    "types in API group {} are created inside a {}",
                    resource.group, foundational.kind
                ),
                dependency: foundational,
                relation: RelationKind::Required,
                field: String::new(),
                evidence: format!("apiGroup {}", resource.group),
                confidence: self.config.provider_heuristic_confidence,
                discovered_at: now,
            });
        }

        edges.into_values().collect()
    }

    fn resolve_targets(
        &self,
        resource: &ResourceTypeRef,
        target: Target,
        base: Option<&str>,
        known_types: &[ResourceTypeRef],
    ) -> Vec<ResourceTypeRef> {
        match target {
            Target::WellKnown(kind, group, version) => {
                vec![ResourceTypeRef::new(kind, group, version)]
            }
            Target::AnyOf(candidates) => {
                let mut found: Vec<ResourceTypeRef> = known_types
                    .iter()
                    .filter(|t| candidates.iter().any(|(k, g)| t.kind == *k && t.group == *g))
                    .cloned()
                    .collect();
                found.sort();
                found.dedup_by(|a, b| a.same_kind_and_group(b));
                found
            }
            Target::StripSuffix => match base {
                Some(base) => lookup_kind(resource, &capitalize(base), known_types),
                None => Vec::new(),
            },
        }
    }
}

/// First rule matching the field, plus the captured `base` if any
fn match_rule(field: &SchemaField) -> Option<(&'static CompiledRule, Option<String>)> {
    compiled_rules().iter().find_map(|compiled| {
        let caps = compiled.field.captures(&field.name)?;
        if let (Some(type_re), Some(type_hint)) = (&compiled.type_hint, &field.type_hint)
            && !type_re.is_match(type_hint)
        {
            return None;
        }
        let base = caps.name("base").map(|m| m.as_str().to_string());
        Some((compiled, base))
    })
}

/// Known types of `kind`, preferring the closest API group.
///
/// Tiers: same group, provider root group, any group of the same provider.
/// The first non-empty tier wins; several matches in it are all returned.
fn lookup_kind(
    resource: &ResourceTypeRef,
    kind: &str,
    known_types: &[ResourceTypeRef],
) -> Vec<ResourceTypeRef> {
    let matching: Vec<&ResourceTypeRef> = known_types
        .iter()
        .filter(|t| t.kind.eq_ignore_ascii_case(kind))
        .collect();
    if matching.is_empty() {
        return Vec::new();
    }

    let pick = |pred: &dyn Fn(&ResourceTypeRef) -> bool| -> Vec<ResourceTypeRef> {
        let mut found: Vec<ResourceTypeRef> =
            matching.iter().filter(|t| pred(t)).map(|t| (*t).clone()).collect();
        found.sort();
        // One edge per (kind, group): keep the lowest-sorting version
        found.dedup_by(|a, b| a.same_kind_and_group(b));
        found
    };

    for group in providers::related_groups(&resource.group) {
        let found = pick(&|t| t.group == group);
        if !found.is_empty() {
            return found;
        }
    }

    match providers::provider_for_group(&resource.group) {
        Some(provider) => pick(&|t| {
            providers::provider_for_group(&t.group).is_some_and(|p| p.name == provider.name)
        }),
        None => Vec::new(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn field_evidence(field: &SchemaField) -> String {
    let mut evidence = field.path.clone();
    if let Some(type_hint) = &field.type_hint {
        evidence.push_str(&format!(" <{type_hint}>"));
    }
    if field.required {
        evidence.push_str(" (required)");
    }
    evidence
}
