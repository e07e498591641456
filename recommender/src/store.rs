//! Capability store trait and query types
//!
//! The vector store holding [`CapabilityRecord`]s is an injected collaborator.
//! Records are keyed by [`ResourceTypeRef::key`]; upserting an existing key
//! replaces the record (last write wins).

use crate::errors::Result;
use crate::types::{Capability, CapabilityRecord, ResourceTypeRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Query-time filters for capability search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityFilter {
    /// Record must carry every one of these capabilities
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Record must carry at least one of these providers (empty = any)
    #[serde(default)]
    pub providers: Vec<String>,

    /// Restrict to these API groups (empty = any)
    #[serde(default)]
    pub groups: Vec<String>,
}

impl CapabilityFilter {
    /// Create empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Check if a record matches this filter
    pub fn matches(&self, record: &CapabilityRecord) -> bool {
        if !self
            .capabilities
            .iter()
            .all(|c| record.capabilities.contains(c))
        {
            return false;
        }

        if !self.providers.is_empty()
            && !self.providers.iter().any(|p| record.providers.contains(p))
        {
            return false;
        }

        if !self.groups.is_empty() && !self.groups.contains(&record.resource.group) {
            return false;
        }

        true
    }
}

/// Search hit with similarity score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCapability {
    pub record: CapabilityRecord,
    /// Cosine similarity to the query (higher = more relevant)
    pub score: f64,
}

impl ScoredCapability {
    pub fn new(record: CapabilityRecord, score: f64) -> Self {
        Self { record, score }
    }

    /// Embedding model version the matched record was indexed with
    pub fn embedding_model_version(&self) -> &str {
        &self.record.embedding_model_version
    }

    /// Whether the record was embedded with a different model than `current`.
    ///
    /// Scores across models are not comparable; callers decide how much to
    /// trust a stale hit.
    pub fn is_stale(&self, current_model_version: &str) -> bool {
        self.record.embedding_model_version != current_model_version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CapabilityStore Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Vector store for capability records
///
/// Any failure to reach the store surfaces as `VectorStoreUnavailable`.
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    /// Insert or replace the record for `record.resource`
    async fn upsert(&self, record: CapabilityRecord) -> Result<()>;

    /// Top `top_k` records by cosine similarity to `query`, sorted descending
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &CapabilityFilter,
    ) -> Result<Vec<ScoredCapability>>;

    /// All records matching `filter`, in key order
    async fn list_all(&self, filter: &CapabilityFilter) -> Result<Vec<CapabilityRecord>>;

    /// Number of stored records
    async fn count(&self) -> Result<usize>;

    /// Remove the record for `resource`; `true` if one existed
    async fn delete(&self, resource: &ResourceTypeRef) -> Result<bool>;
}
