//! Core data model shared by the inference, indexing and request paths.
//!
//! All set-valued fields are `BTreeSet`s so every iteration (and therefore
//! every ranking, prompt and rationale) is independent of hash ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// ResourceTypeRef
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of a Kubernetes resource type (GVK).
///
/// Ordering is `(kind, group, version)`, which is also the final tie-break
/// used by the ranker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceTypeRef {
    pub kind: String,
    #[serde(rename = "apiGroup")]
    pub group: String,
    #[serde(rename = "apiVersion")]
    pub version: String,
}

impl ResourceTypeRef {
    pub fn new(
        kind: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            group: group.into(),
            version: version.into(),
        }
    }

    /// Core API group (`""`), e.g. `Secret`, `ConfigMap`
    pub fn core(kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(kind, "", version)
    }

    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }

    /// Stable string key: `Kind.group/version`, or `Kind/version` for core types
    pub fn key(&self) -> String {
        if self.is_core() {
            format!("{}/{}", self.kind, self.version)
        } else {
            format!("{}.{}/{}", self.kind, self.group, self.version)
        }
    }

    /// Parse a key produced by [`ResourceTypeRef::key`]
    pub fn parse_key(key: &str) -> Option<Self> {
        let (kind_group, version) = key.rsplit_once('/')?;
        if version.is_empty() {
            return None;
        }
        let (kind, group) = match kind_group.split_once('.') {
            Some((kind, group)) => (kind, group),
            None => (kind_group, ""),
        };
        if kind.is_empty() {
            return None;
        }
        Some(Self::new(kind, group, version))
    }

    /// Whether `other` names the same kind in the same group, ignoring version
    pub fn same_kind_and_group(&self, other: &ResourceTypeRef) -> bool {
        self.kind.eq_ignore_ascii_case(&other.kind) && self.group == other.group
    }

    /// Dot-separated labels of the API group
    pub fn group_labels(&self) -> impl Iterator<Item = &str> {
        self.group.split('.').filter(|l| !l.is_empty())
    }
}

impl fmt::Display for ResourceTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Kubernetes version priority: `Greater` means `a` is preferred.
///
/// GA beats beta beats alpha; within a stability level the higher major, then
/// the higher minor, wins (`v10 > v2 > v1 > v2beta1 > v1beta2 > v1alpha1`).
/// Strings outside the `vN[alpha|betaM]` shape rank below every well-formed
/// version and order among themselves alphabetically, earliest first.
pub fn compare_api_versions(a: &str, b: &str) -> Ordering {
    match (version_priority(a), version_priority(b)) {
        (Some(pa), Some(pb)) => pa.cmp(&pb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => b.cmp(a),
    }
}

/// `(stability, major, minor)` where stability is 2 for GA, 1 beta, 0 alpha
fn version_priority(version: &str) -> Option<(u8, u64, u64)> {
    let rest = version.strip_prefix('v')?;
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let (major, tail) = rest.split_at(digits);
    if major.is_empty() || major.starts_with('0') {
        return None;
    }
    let major: u64 = major.parse().ok()?;
    if tail.is_empty() {
        return Some((2, major, 0));
    }
    let (stability, minor) = if let Some(minor) = tail.strip_prefix("beta") {
        (1, minor)
    } else if let Some(minor) = tail.strip_prefix("alpha") {
        (0, minor)
    } else {
        return None;
    };
    if minor.is_empty() || minor.starts_with('0') || !minor.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((stability, major, minor.parse().ok()?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Controlled vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// Capability tag drawn from the controlled vocabulary.
///
/// This enum *is* the vocabulary: a tag that does not parse into it cannot be
/// stored on a [`CapabilityRecord`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Capability {
    Database,
    Postgresql,
    Mysql,
    Mariadb,
    Mongodb,
    Redis,
    Cache,
    Search,
    MessageQueue,
    Streaming,
    ObjectStorage,
    BlockStorage,
    FileStorage,
    Backup,
    Networking,
    LoadBalancing,
    Dns,
    Ingress,
    Firewall,
    Cdn,
    ApiGateway,
    CertificateManagement,
    SecretManagement,
    Identity,
    AccessControl,
    Monitoring,
    Logging,
    Compute,
    VirtualMachine,
    Container,
    Serverless,
    KubernetesCluster,
    Autoscaling,
    HighAvailability,
    MultiCloud,
    ResourceGrouping,
}

impl Capability {
    /// Every vocabulary entry, in declaration order
    pub fn vocabulary() -> Vec<Capability> {
        use strum::IntoEnumIterator;
        Self::iter().collect()
    }

    /// Parse a free-text tag, returning `None` for anything outside the vocabulary
    pub fn parse_tag(tag: &str) -> Option<Capability> {
        let normalized = tag.trim().replace(['_', ' '], "-");
        normalized.parse().ok()
    }
}

/// Complexity tier of a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Ordinal distance from `Low`
    pub fn level(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    /// Parse from string (case-insensitive); `None` for anything else
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "simple" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "complex" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CapabilityRecord
// ─────────────────────────────────────────────────────────────────────────────

/// What a resource type semantically does, plus its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub resource: ResourceTypeRef,
    pub capabilities: BTreeSet<Capability>,
    pub providers: BTreeSet<String>,
    pub abstractions: BTreeSet<String>,
    pub complexity_tier: ComplexityTier,
    pub description: String,
    pub use_case: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub embedding_model_version: String,
    pub analyzed_at: DateTime<Utc>,
    /// SHA-256 of the schema text the record was derived from
    pub schema_version: String,
    /// AI signals were unavailable; record built from deterministic signals only
    #[serde(default)]
    pub degraded: bool,
}

impl CapabilityRecord {
    /// Text that is embedded for similarity search
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<String> = vec![self.resource.kind.clone()];
        parts.extend(self.resource.group_labels().map(str::to_string));
        parts.extend(self.capabilities.iter().map(|c| c.as_ref().replace('-', " ")));
        parts.extend(self.providers.iter().cloned());
        parts.extend(self.abstractions.iter().map(|a| a.replace('-', " ")));
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        if !self.use_case.is_empty() {
            parts.push(self.use_case.clone());
        }
        parts.join(" ")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DependencyEdge
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of relationship from a dependent to its dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Dependent cannot be deployed without the dependency
    Required,
    /// Dependency is commonly deployed alongside
    Optional,
    /// Dependent augments the dependency (e.g. an autoscaler targeting a workload)
    Enhances,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Enhances => "enhances",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "required" => Some(Self::Required),
            "optional" => Some(Self::Optional),
            "enhances" => Some(Self::Enhances),
            _ => None,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity key of a dependency edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub dependent: ResourceTypeRef,
    pub dependency: ResourceTypeRef,
    pub field: String,
}

/// Directed relationship discovered between two resource types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent: ResourceTypeRef,
    pub dependency: ResourceTypeRef,
    pub relation: RelationKind,
    /// Schema field path the edge was derived from (`""` for heuristic edges)
    pub field: String,
    /// Text that triggered the edge (field declaration or group match)
    pub evidence: String,
    pub reason: String,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    pub discovered_at: DateTime<Utc>,
}

impl DependencyEdge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            dependent: self.dependent.clone(),
            dependency: self.dependency.clone(),
            field: self.field.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SolutionCandidate
// ─────────────────────────────────────────────────────────────────────────────

/// One deployable option: a primary type plus its resolved dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionCandidate {
    pub primary: ResourceTypeRef,
    pub required: BTreeSet<ResourceTypeRef>,
    pub optional: BTreeSet<ResourceTypeRef>,
    pub unsatisfiable: BTreeSet<ResourceTypeRef>,
    /// Retriever similarity for `primary`, in `[0, 1]`
    pub similarity: f64,
    /// Embedding model version stored on the matched capability record
    pub embedding_model_version: Option<String>,
    /// Required traversal stopped at the depth bound
    pub truncated: bool,
    pub score: f64,
    pub breakdown: Option<crate::ranking::ScoreBreakdown>,
    pub rationale: Vec<String>,
}

impl SolutionCandidate {
    /// Empty candidate for `primary`; the resolver fills the sets, the ranker the score
    pub fn new(primary: ResourceTypeRef) -> Self {
        Self {
            primary,
            required: BTreeSet::new(),
            optional: BTreeSet::new(),
            unsatisfiable: BTreeSet::new(),
            similarity: 0.0,
            embedding_model_version: None,
            truncated: false,
            score: 0.0,
            breakdown: None,
            rationale: Vec::new(),
        }
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.unsatisfiable.is_empty()
    }

    /// Resources this solution deploys: primary, required and optional
    pub fn total_resources(&self) -> usize {
        1 + self.required.len() + self.optional.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_priority() {
        let mut versions = vec![
            "v1beta1", "v10", "foo1", "v2", "v1alpha1", "v1", "v11alpha2", "v3beta1", "v10beta3",
            "foo10", "v12alpha1", "v11beta2",
        ];
        versions.sort_by(|a, b| compare_api_versions(b, a));
        assert_eq!(
            versions,
            vec![
                "v10", "v2", "v1", "v11beta2", "v10beta3", "v3beta1", "v1beta1", "v12alpha1",
                "v11alpha2", "v1alpha1", "foo1", "foo10",
            ]
        );
        assert_eq!(compare_api_versions("v1", "v1beta1"), Ordering::Greater);
        assert_eq!(compare_api_versions("v2", "v10"), Ordering::Less);
    }

    #[test]
    fn test_key_roundtrip() {
        let refs = [
            ResourceTypeRef::new("Server", "dbforpostgresql.azure.upbound.io", "v1beta1"),
            ResourceTypeRef::core("Secret", "v1"),
            ResourceTypeRef::new("Deployment", "apps", "v1"),
        ];
        for r in refs {
            let parsed = ResourceTypeRef::parse_key(&r.key());
            assert_eq!(parsed.as_ref(), Some(&r), "roundtrip failed for {r}");
        }
        assert!(ResourceTypeRef::parse_key("no-version").is_none());
        assert!(ResourceTypeRef::parse_key("/v1").is_none());
    }

    #[test]
    fn test_vocabulary_parse() {
        assert_eq!(Capability::parse_tag("postgresql"), Some(Capability::Postgresql));
        assert_eq!(Capability::parse_tag("Message Queue"), Some(Capability::MessageQueue));
        assert_eq!(Capability::parse_tag("multi_cloud"), Some(Capability::MultiCloud));
        assert_eq!(Capability::parse_tag("quantum-teleportation"), None);
        assert_eq!(Capability::MessageQueue.to_string(), "message-queue");
        assert!(Capability::vocabulary().contains(&Capability::KubernetesCluster));
    }

    #[test]
    fn test_capability_serde_is_kebab_case() {
        let json = serde_json::to_string(&Capability::ObjectStorage).unwrap();
        assert_eq!(json, "\"object-storage\"");
        let back: Capability = serde_json::from_str("\"load-balancing\"").unwrap();
        assert_eq!(back, Capability::LoadBalancing);
    }

    #[test]
    fn test_complexity_levels() {
        assert_eq!(ComplexityTier::parse("HIGH"), Some(ComplexityTier::High));
        assert_eq!(ComplexityTier::parse("extreme"), None);
        assert_eq!(ComplexityTier::High.level() - ComplexityTier::Low.level(), 2);
    }

    #[test]
    fn test_resource_ref_serde_names() {
        let r = ResourceTypeRef::new("ResourceGroup", "azure.upbound.io", "v1beta1");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["apiGroup"], "azure.upbound.io");
        assert_eq!(json["apiVersion"], "v1beta1");
    }

    #[test]
    fn test_total_resources() {
        let mut c = SolutionCandidate::new(ResourceTypeRef::new("Server", "azure", "v1"));
        c.required.insert(ResourceTypeRef::new("ResourceGroup", "azure", "v1"));
        c.optional.insert(ResourceTypeRef::new("FirewallRule", "azure", "v1"));
        assert_eq!(c.total_resources(), 3);
        assert!(c.is_complete());
    }
}
