//! Offline scan pipeline
//!
//! For every known resource type: fetch its schema, infer capabilities and
//! dependency edges, embed the capability text, upsert the record and replace
//! the type's edges. Types are processed by a bounded worker pool; a failure
//! on one type is recorded in the [`ScanSummary`] and never aborts the scan.
//!
//! A type whose AI inference failed is still indexed from deterministic
//! signals but counts as failed, so the next scan cycle retries it. Records
//! and outgoing edges of types no longer in the known set are pruned at the
//! end of each scan.

use crate::capability::CapabilityInferrer;
use crate::config::ScanConfig;
use crate::dependency::DependencyInferrer;
use crate::embedding::Embedder;
use crate::errors::{ErrorCategory, RecommendError, Result};
use crate::graph::RelationshipStore;
use crate::schema::{SchemaOutline, SchemaSource};
use crate::store::{CapabilityFilter, CapabilityStore};
use crate::types::ResourceTypeRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

// ─────────────────────────────────────────────────────────────────────────────
// Summary
// ─────────────────────────────────────────────────────────────────────────────

/// One type that did not scan cleanly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub resource: ResourceTypeRef,
    /// Error category code, e.g. `SCHEMA_UNAVAILABLE`
    pub kind: String,
    pub message: String,
    /// A (degraded) record was still written to the capability store
    pub indexed: bool,
}

impl ScanFailure {
    fn new(resource: ResourceTypeRef, error: &RecommendError, indexed: bool) -> Self {
        Self {
            resource,
            kind: error.category().as_str().to_string(),
            message: error.to_string(),
            indexed,
        }
    }
}

/// Outcome of one scan cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Sorted by resource
    pub failures: Vec<ScanFailure>,
    /// Types removed from the index because they left the cluster
    #[serde(default)]
    pub pruned: usize,
    pub duration_ms: u64,
}

impl ScanSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Failures of one category
    pub fn failures_of(&self, category: ErrorCategory) -> impl Iterator<Item = &ScanFailure> {
        self.failures
            .iter()
            .filter(move |f| f.kind == category.as_str())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "succeeded": self.succeeded,
            "failed": self.failed,
            "failures": self.failures,
            "pruned": self.pruned,
            "duration_ms": self.duration_ms,
        })
    }

    /// One-line human summary
    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "scanned {} resource types: {} succeeded, {} failed in {}ms",
            self.total(),
            self.succeeded,
            self.failed,
            self.duration_ms
        );
        let degraded = self.failures.iter().filter(|f| f.indexed).count();
        if degraded > 0 {
            text.push_str(&format!(" ({degraded} indexed without AI signals)"));
        }
        let unavailable = self.failures_of(ErrorCategory::SchemaUnavailable).count();
        if unavailable > 0 {
            text.push_str(&format!(", {unavailable} schema(s) unavailable"));
        }
        if self.pruned > 0 {
            text.push_str(&format!(", {} removed type(s) pruned", self.pruned));
        }
        text
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

enum TypeOutcome {
    Indexed,
    /// Record written, but something the next cycle should retry went wrong
    Degraded(RecommendError),
    Failed(RecommendError),
}

/// Scan pipeline over injected collaborators
#[derive(Clone)]
pub struct ScanPipeline {
    schemas: Arc<dyn SchemaSource>,
    capability: CapabilityInferrer,
    dependency: DependencyInferrer,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CapabilityStore>,
    relationships: Arc<dyn RelationshipStore>,
    config: ScanConfig,
}

impl ScanPipeline {
    pub fn new(
        schemas: Arc<dyn SchemaSource>,
        capability: CapabilityInferrer,
        dependency: DependencyInferrer,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn CapabilityStore>,
        relationships: Arc<dyn RelationshipStore>,
        config: ScanConfig,
    ) -> Self {
        Self {
            schemas,
            capability,
            dependency,
            embedder,
            store,
            relationships,
            config,
        }
    }

    /// Scan `known_types`. Duplicate entries are scanned once.
    pub async fn scan(&self, known_types: &[ResourceTypeRef]) -> ScanSummary {
        let started = Instant::now();
        let unique: BTreeSet<ResourceTypeRef> = known_types.iter().cloned().collect();
        let known: Arc<Vec<ResourceTypeRef>> = Arc::new(unique.iter().cloned().collect());

        tracing::info!(
            types = known.len(),
            concurrency = self.config.concurrency,
            "Starting capability scan"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for resource in unique.iter().cloned() {
            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let known = Arc::clone(&known);
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => pipeline.index_one(&resource, &known).await,
                    Err(e) => TypeOutcome::Failed(RecommendError::internal(format!(
                        "scan worker pool closed: {e}"
                    ))),
                };
                (resource, outcome)
            });
        }

        let mut summary = ScanSummary::default();
        let mut reported: BTreeSet<ResourceTypeRef> = BTreeSet::new();
        while let Some(joined) = tasks.join_next().await {
            let (resource, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "scan worker task did not complete");
                    continue;
                }
            };
            reported.insert(resource.clone());
            match outcome {
                TypeOutcome::Indexed => summary.succeeded += 1,
                TypeOutcome::Degraded(e) => {
                    summary.failed += 1;
                    summary.failures.push(ScanFailure::new(resource, &e, true));
                }
                TypeOutcome::Failed(e) => {
                    tracing::warn!(
                        resource = %resource,
                        category = %e.category(),
                        error = %e,
                        "resource type excluded from this scan cycle"
                    );
                    summary.failed += 1;
                    summary.failures.push(ScanFailure::new(resource, &e, false));
                }
            }
        }

        // Tasks that panicked or were aborted never reported back
        for resource in unique.difference(&reported) {
            let e = RecommendError::internal("scan worker task did not complete");
            summary.failed += 1;
            summary.failures.push(ScanFailure::new(resource.clone(), &e, false));
        }

        summary.failures.sort_by(|a, b| a.resource.cmp(&b.resource));
        summary.pruned = self.prune(&unique).await;
        summary.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            pruned = summary.pruned,
            duration_ms = summary.duration_ms,
            "Capability scan finished"
        );
        summary
    }

    /// Drop capability records and outgoing edges of types outside `keep`.
    ///
    /// Returns the number of distinct types removed. A store that cannot be
    /// listed is skipped; the next scan tries again.
    async fn prune(&self, keep: &BTreeSet<ResourceTypeRef>) -> usize {
        let mut removed: BTreeSet<ResourceTypeRef> = BTreeSet::new();

        match self.store.list_all(&CapabilityFilter::default()).await {
            Ok(records) => {
                for record in records {
                    if keep.contains(&record.resource) {
                        continue;
                    }
                    match self.store.delete(&record.resource).await {
                        Ok(_) => {
                            removed.insert(record.resource);
                        }
                        Err(e) => tracing::warn!(
                            resource = %record.resource,
                            error = %e,
                            "failed to prune capability record"
                        ),
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "capability store not listable; skipping prune"),
        }

        match self.relationships.snapshot().await {
            Ok(graph) => {
                for dependent in graph.dependents().filter(|d| !keep.contains(*d)) {
                    match self.relationships.replace_edges_for(dependent, Vec::new()).await {
                        Ok(()) => {
                            removed.insert(dependent.clone());
                        }
                        Err(e) => tracing::warn!(
                            resource = %dependent,
                            error = %e,
                            "failed to prune dependency edges"
                        ),
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "relationship store not readable; skipping prune"),
        }

        for resource in &removed {
            tracing::debug!(resource = %resource, "Pruned resource type no longer in the cluster");
        }
        removed.len()
    }

    async fn index_one(
        &self,
        resource: &ResourceTypeRef,
        known: &[ResourceTypeRef],
    ) -> TypeOutcome {
        let schema_text = match self.fetch_schema(resource).await {
            Ok(text) => text,
            Err(e) => return TypeOutcome::Failed(e),
        };
        let outline = SchemaOutline::parse(&schema_text);

        let inference = self
            .capability
            .infer_with_outline(resource, &schema_text, &outline)
            .await;
        let mut record = inference.record;

        record.embedding = match self.embedder.embed(&record.embedding_text()).await {
            Ok(embedding) => embedding,
            Err(e) => return TypeOutcome::Failed(e),
        };
        record.embedding_model_version = self.embedder.model_version().to_string();

        if let Err(e) = self.store.upsert(record).await {
            return TypeOutcome::Failed(e);
        }

        let edges = self
            .dependency
            .infer_with_outline(resource, &outline, known, chrono::Utc::now());
        let edge_count = edges.len();
        if let Err(e) = self.relationships.replace_edges_for(resource, edges).await {
            return TypeOutcome::Degraded(e);
        }

        tracing::debug!(resource = %resource, edges = edge_count, "Indexed resource type");

        match inference.ai_error {
            Some(e) => TypeOutcome::Degraded(e),
            None => TypeOutcome::Indexed,
        }
    }

    async fn fetch_schema(&self, resource: &ResourceTypeRef) -> Result<String> {
        let timeout = self.config.schema_timeout();
        match tokio::time::timeout(timeout, self.schemas.get_resource_schema(resource)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) if e.category() == ErrorCategory::SchemaUnavailable => Err(e),
            Ok(Err(e)) => Err(RecommendError::schema_unavailable(resource, e.to_string())),
            Err(_) => Err(RecommendError::schema_unavailable(
                resource,
                format!("no schema within {}ms", timeout.as_millis()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CapabilityConfig;
    use crate::embedding::HashingEmbedder;
    use crate::graph::InMemoryRelationshipStore;
    use crate::memory_store::InMemoryCapabilityStore;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct MapSchemas(BTreeMap<ResourceTypeRef, String>);

    #[async_trait]
    impl SchemaSource for MapSchemas {
        async fn get_resource_schema(&self, resource: &ResourceTypeRef) -> Result<String> {
            self.0
                .get(resource)
                .cloned()
                .ok_or_else(|| RecommendError::schema_unavailable(resource, "not found"))
        }

        async fn list_known_resource_types(&self) -> Result<Vec<ResourceTypeRef>> {
            Ok(self.0.keys().cloned().collect())
        }
    }

    fn pipeline(
        schemas: MapSchemas,
    ) -> (ScanPipeline, Arc<InMemoryCapabilityStore>, Arc<InMemoryRelationshipStore>) {
        let store = Arc::new(InMemoryCapabilityStore::new());
        let relationships = Arc::new(InMemoryRelationshipStore::new());
        let pipeline = ScanPipeline::new(
            Arc::new(schemas),
            CapabilityInferrer::without_ai(CapabilityConfig::default()),
            DependencyInferrer::default(),
            Arc::new(HashingEmbedder::new(64)),
            store.clone(),
            relationships.clone(),
            ScanConfig::default(),
        );
        (pipeline, store, relationships)
    }

    #[tokio::test]
    async fn test_empty_scan() {
        let (pipeline, store, _) = pipeline(MapSchemas(BTreeMap::new()));
        let summary = pipeline.scan(&[]).await;
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 0);
        assert!(summary.failures.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_schema_is_isolated() {
        let ok = ResourceTypeRef::new("Bucket", "s3.aws.upbound.io", "v1beta1");
        let missing = ResourceTypeRef::new("Queue", "sqs.aws.upbound.io", "v1beta1");
        let schemas = MapSchemas(BTreeMap::from([(
            ok.clone(),
            r#"{"description": "Bucket is an object storage", "properties": {}}"#.to_string(),
        )]));
        let (pipeline, store, _) = pipeline(schemas);

        let summary = pipeline.scan(&[ok.clone(), missing.clone(), ok]).await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].resource, missing);
        assert_eq!(summary.failures[0].kind, "SCHEMA_UNAVAILABLE");
        assert!(!summary.failures[0].indexed);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(summary.summary_text().contains("1 succeeded, 1 failed"));
        assert!(summary.summary_text().contains("1 schema(s) unavailable"));
        assert_eq!(summary.to_json()["failed"], 1);
    }

    #[tokio::test]
    async fn test_types_that_left_are_pruned() {
        let bucket = ResourceTypeRef::new("Bucket", "s3.aws.upbound.io", "v1beta1");
        let queue = ResourceTypeRef::new("Queue", "sqs.aws.upbound.io", "v1beta1");
        let schema = r#"{"properties": {"spec": {"properties": {
            "tlsSecretRef": {"type": "object"}
        }}}}"#;
        let schemas = MapSchemas(BTreeMap::from([
            (bucket.clone(), schema.to_string()),
            (queue.clone(), schema.to_string()),
        ]));
        let (pipeline, store, relationships) = pipeline(schemas);

        let first = pipeline.scan(&[bucket.clone(), queue.clone()]).await;
        assert_eq!(first.succeeded, 2);
        assert_eq!(first.pruned, 0);
        assert!(!relationships.edges_from(&queue).await.unwrap().is_empty());

        let second = pipeline.scan(std::slice::from_ref(&bucket)).await;
        assert_eq!(second.succeeded, 1);
        assert_eq!(second.pruned, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(relationships.edges_from(&queue).await.unwrap().is_empty());
        assert!(!relationships.edges_from(&bucket).await.unwrap().is_empty());
        assert!(second.summary_text().contains("1 removed type(s) pruned"));
    }

    #[tokio::test]
    async fn test_records_carry_embedding_model() {
        let r = ResourceTypeRef::new("Bucket", "s3.aws.upbound.io", "v1beta1");
        let schemas = MapSchemas(BTreeMap::from([(r.clone(), "{}".to_string())]));
        let (pipeline, store, _) = pipeline(schemas);
        pipeline.scan(std::slice::from_ref(&r)).await;

        let records = store.list_all(&Default::default()).await.unwrap();
        assert_eq!(records[0].embedding.len(), 64);
        assert_eq!(records[0].embedding_model_version, "hashing-v1-64");
        assert_eq!(records[0].schema_version, crate::compute_hash("{}"));
    }
}
