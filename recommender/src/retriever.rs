//! Semantic retriever
//!
//! Embeds an intent with the same model the indexer used and returns the
//! closest capability records from the store.

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::errors::Result;
use crate::store::{CapabilityFilter, CapabilityStore, ScoredCapability};
use std::sync::Arc;

/// Intent-to-capability search over an injected store
#[derive(Clone)]
pub struct SemanticRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CapabilityStore>,
    config: RetrievalConfig,
}

impl SemanticRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn CapabilityStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Model version queries are embedded with
    pub fn model_version(&self) -> &str {
        self.embedder.model_version()
    }

    /// Top `top_k` records for `intent`, most similar first.
    ///
    /// An empty index (or a blank intent) yields `Ok(vec![])`; a store that
    /// cannot be reached yields `VectorStoreUnavailable`.
    pub async fn search(&self, intent: &str, top_k: usize) -> Result<Vec<ScoredCapability>> {
        self.search_filtered(intent, top_k, &CapabilityFilter::default())
            .await
    }

    pub async fn search_filtered(
        &self,
        intent: &str,
        top_k: usize,
        filter: &CapabilityFilter,
    ) -> Result<Vec<ScoredCapability>> {
        let intent = intent.trim();
        let top_k = top_k.min(self.config.max_top_k);
        if intent.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(intent).await?;
        let hits = self.store.search(&query, top_k, filter).await?;

        let current = self.embedder.model_version();
        let mut results: Vec<ScoredCapability> = hits
            .into_iter()
            .map(|mut hit| {
                hit.score = if hit.score.is_finite() {
                    hit.score.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                hit
            })
            .filter(|hit| hit.score >= self.config.min_similarity)
            .collect();
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record.resource.cmp(&b.record.resource))
        });

        let stale = results.iter().filter(|h| h.is_stale(current)).count();
        if stale > 0 {
            tracing::debug!(
                stale,
                total = results.len(),
                model = current,
                "retrieved records embedded with a different model"
            );
        }

        Ok(results)
    }
}
