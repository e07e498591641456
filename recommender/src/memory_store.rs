//! In-memory capability store
//!
//! Brute-force cosine search over a `BTreeMap` keyed by resource key. Suitable
//! for tests, single-cluster deployments and catalogs of a few thousand types.

// RwLock poisoning requires a panic in a critical section; allow expect for internal locks
#![allow(clippy::expect_used)]

use crate::embedding::cosine_similarity;
use crate::errors::{RecommendError, Result};
use crate::store::{CapabilityFilter, CapabilityStore, ScoredCapability};
use crate::types::{CapabilityRecord, ResourceTypeRef};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory [`CapabilityStore`]
#[derive(Debug, Default)]
pub struct InMemoryCapabilityStore {
    records: RwLock<BTreeMap<String, CapabilityRecord>>,
}

impl InMemoryCapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CapabilityStore for InMemoryCapabilityStore {
    async fn upsert(&self, record: CapabilityRecord) -> Result<()> {
        if record.embedding.is_empty() {
            return Err(RecommendError::vector_store(format!(
                "record for {} has no embedding",
                record.resource
            )));
        }
        let key = record.resource.key();
        self.records.write().expect("lock").insert(key, record);
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &CapabilityFilter,
    ) -> Result<Vec<ScoredCapability>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let records = self.records.read().expect("lock");
        let mut scored: Vec<(&String, f64)> = records
            .iter()
            .filter(|(_, r)| filter.matches(r))
            .map(|(key, r)| (key, cosine_similarity(query, &r.embedding)))
            .collect();

        // Descending score; key order breaks ties so results are stable
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .filter_map(|(key, score)| {
                records
                    .get(key)
                    .map(|r| ScoredCapability::new(r.clone(), score))
            })
            .collect())
    }

    async fn list_all(&self, filter: &CapabilityFilter) -> Result<Vec<CapabilityRecord>> {
        Ok(self
            .records
            .read()
            .expect("lock")
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().expect("lock").len())
    }

    async fn delete(&self, resource: &ResourceTypeRef) -> Result<bool> {
        Ok(self
            .records
            .write()
            .expect("lock")
            .remove(&resource.key())
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capability, ComplexityTier};
    use std::collections::BTreeSet;

    fn record(kind: &str, embedding: Vec<f32>) -> CapabilityRecord {
        CapabilityRecord {
            resource: ResourceTypeRef::new(kind, "example.org", "v1"),
            capabilities: BTreeSet::from([Capability::Database]),
            providers: BTreeSet::new(),
            abstractions: BTreeSet::new(),
            complexity_tier: ComplexityTier::Low,
            description: format!("{kind} description"),
            use_case: String::new(),
            embedding,
            embedding_model_version: "test".to_string(),
            analyzed_at: chrono::Utc::now(),
            schema_version: "abc".to_string(),
            degraded: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_key() {
        let store = InMemoryCapabilityStore::new();
        store.upsert(record("Server", vec![1.0, 0.0])).await.unwrap();
        let mut updated = record("Server", vec![0.0, 1.0]);
        updated.description = "updated".to_string();
        store.upsert(updated).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let all = store.list_all(&CapabilityFilter::new()).await.unwrap();
        assert_eq!(all[0].description, "updated");
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryCapabilityStore::new();
        store.upsert(record("Far", vec![0.0, 1.0])).await.unwrap();
        store.upsert(record("Near", vec![1.0, 0.1])).await.unwrap();
        store.upsert(record("Exact", vec![1.0, 0.0])).await.unwrap();

        let hits = store
            .search(&[1.0, 0.0], 2, &CapabilityFilter::new())
            .await
            .unwrap();
        let kinds: Vec<&str> = hits.iter().map(|h| h.record.resource.kind.as_str()).collect();
        assert_eq!(kinds, vec!["Exact", "Near"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_ties_break_by_key() {
        let store = InMemoryCapabilityStore::new();
        store.upsert(record("Beta", vec![1.0, 0.0])).await.unwrap();
        store.upsert(record("Alpha", vec![1.0, 0.0])).await.unwrap();
        let hits = store
            .search(&[1.0, 0.0], 10, &CapabilityFilter::new())
            .await
            .unwrap();
        assert_eq!(hits[0].record.resource.kind, "Alpha");
    }

    #[tokio::test]
    async fn test_empty_store_search_is_empty() {
        let store = InMemoryCapabilityStore::new();
        let hits = store
            .search(&[1.0, 0.0], 5, &CapabilityFilter::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_missing_embedding() {
        let store = InMemoryCapabilityStore::new();
        store.upsert(record("Server", vec![1.0])).await.unwrap();
        let r = ResourceTypeRef::new("Server", "example.org", "v1");
        assert!(store.delete(&r).await.unwrap());
        assert!(!store.delete(&r).await.unwrap());

        let err = store.upsert(record("Empty", Vec::new())).await.unwrap_err();
        assert_eq!(
            err.category(),
            crate::errors::ErrorCategory::VectorStoreUnavailable
        );
    }
}
