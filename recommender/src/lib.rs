//! Capability and dependency-aware recommendation engine for Kubernetes
//!
//! Turns a natural-language intent ("PostgreSQL database on Azure") into a
//! ranked list of deployable resource-type combinations.
//!
//! Two paths share the indexes this crate maintains:
//! - **Scan** (offline): fetch each type's schema, infer capabilities and
//!   dependency edges, embed and store them ([`scan`]).
//! - **Recommend** (online): embed the intent, retrieve matching types,
//!   resolve their required/optional dependencies against the live catalog
//!   and rank the resulting candidates ([`retriever`], [`resolver`],
//!   [`ranking`]).
//!
//! The schema service, AI completion service and vector store are injected
//! collaborators; this crate ships in-memory and SQLite implementations for
//! the stores and a deterministic hashing embedder.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod ai;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod dependency;
pub mod embedding;
pub mod errors;
pub mod graph;
pub mod graph_db;
pub mod lexicon;
pub mod memory_store;
pub mod providers;
pub mod ranking;
pub mod resolver;
pub mod retriever;
pub mod scan;
pub mod schema;
pub mod store;
pub mod types;

pub use ai::AiClient;
pub use capability::{CapabilityInference, CapabilityInferrer};
pub use catalog::TypeCatalog;
pub use config::RecommenderConfig;
pub use dependency::DependencyInferrer;
pub use embedding::{Embedder, HashingEmbedder, cosine_similarity};
pub use errors::{ErrorCategory, RecommendError, Result};
pub use graph::{DependencyGraph, InMemoryRelationshipStore, RelationshipStore};
pub use graph_db::SqliteRelationshipStore;
pub use kindscout_async_utils::deadline_in;
pub use memory_store::InMemoryCapabilityStore;
pub use ranking::{PatternAdjustment, PatternAdjustments, ScoreBreakdown, SolutionRanker};
pub use resolver::DependencyResolver;
pub use retriever::SemanticRetriever;
pub use scan::{ScanFailure, ScanPipeline, ScanSummary};
pub use schema::{SchemaOutline, SchemaSource};
pub use store::{CapabilityFilter, CapabilityStore, ScoredCapability};
pub use types::{
    Capability, CapabilityRecord, ComplexityTier, DependencyEdge, RelationKind, ResourceTypeRef,
    SolutionCandidate,
};

use kindscout_async_utils::OrInterruptExt;
use sha2::{Digest, Sha256};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators and requests
// ─────────────────────────────────────────────────────────────────────────────

/// External services the engine is built on
#[derive(Clone)]
pub struct Collaborators {
    pub schemas: Arc<dyn SchemaSource>,
    pub store: Arc<dyn CapabilityStore>,
    /// `None` disables AI-assisted capability inference
    pub ai: Option<Arc<dyn AiClient>>,
    /// `None` uses [`HashingEmbedder`] with `embedding.dimensions`
    pub embedder: Option<Arc<dyn Embedder>>,
    /// `None` opens [`SqliteRelationshipStore`] at `store.relationship_db_path`
    pub relationships: Option<Arc<dyn RelationshipStore>>,
}

impl Collaborators {
    pub fn new(schemas: Arc<dyn SchemaSource>, store: Arc<dyn CapabilityStore>) -> Self {
        Self {
            schemas,
            store,
            ai: None,
            embedder: None,
            relationships: None,
        }
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiClient>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_relationships(mut self, relationships: Arc<dyn RelationshipStore>) -> Self {
        self.relationships = Some(relationships);
        self
    }
}

/// One recommendation request
#[derive(Debug, Clone)]
pub struct RecommendRequest {
    pub intent: String,
    pub top_k: usize,
    pub deadline: Instant,
    pub cancel: Option<CancellationToken>,
    pub pattern_adjustments: PatternAdjustments,
}

impl RecommendRequest {
    pub fn new(intent: impl Into<String>, top_k: usize, deadline: Instant) -> Self {
        Self {
            intent: intent.into(),
            top_k,
            deadline,
            cancel: None,
            pattern_adjustments: PatternAdjustments::new(),
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_pattern_adjustments(mut self, adjustments: PatternAdjustments) -> Self {
        self.pattern_adjustments = adjustments;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Main entry point for scans and recommendations
///
/// Holds immutable catalog and graph snapshots. Each `recommend` call clones
/// the snapshot handles when it starts, so a concurrent scan never changes
/// the data a request is working on.
pub struct RecommendationEngine {
    cfg: RecommenderConfig,
    schemas: Arc<dyn SchemaSource>,
    relationships: Arc<dyn RelationshipStore>,
    pipeline: ScanPipeline,
    retriever: SemanticRetriever,
    resolver: DependencyResolver,
    ranker: SolutionRanker,
    catalog: RwLock<Arc<TypeCatalog>>,
    graph: RwLock<Arc<DependencyGraph>>,
}

impl RecommendationEngine {
    /// Create an engine, loading config from the standard locations
    pub fn new(collaborators: Collaborators) -> Result<Self> {
        let cfg = RecommenderConfig::load()?;
        Self::with_config(cfg, collaborators)
    }

    /// Create an engine with a specific config
    pub fn with_config(cfg: RecommenderConfig, collaborators: Collaborators) -> Result<Self> {
        cfg.validate()?;

        let embedder: Arc<dyn Embedder> = match collaborators.embedder {
            Some(embedder) => embedder,
            None => Arc::new(HashingEmbedder::new(cfg.embedding.dimensions)),
        };
        let relationships: Arc<dyn RelationshipStore> = match collaborators.relationships {
            Some(relationships) => relationships,
            None => Arc::new(SqliteRelationshipStore::connect_and_init(&cfg)?),
        };

        let capability = CapabilityInferrer::new(
            cfg.capability.clone(),
            collaborators.ai.clone(),
            cfg.scan.ai_timeout(),
        );
        let pipeline = ScanPipeline::new(
            Arc::clone(&collaborators.schemas),
            capability,
            DependencyInferrer::new(cfg.dependency.clone()),
            Arc::clone(&embedder),
            Arc::clone(&collaborators.store),
            Arc::clone(&relationships),
            cfg.scan.clone(),
        );
        let retriever = SemanticRetriever::new(
            Arc::clone(&embedder),
            Arc::clone(&collaborators.store),
            cfg.retrieval.clone(),
        );

        tracing::info!(
            version = VERSION,
            embedding_model = embedder.model_version(),
            ai_enabled = cfg.capability.ai_enabled && collaborators.ai.is_some(),
            max_depth = cfg.resolver.max_depth,
            "Recommendation engine initialized"
        );

        Ok(Self {
            resolver: DependencyResolver::new(&cfg.resolver),
            ranker: SolutionRanker::new(cfg.ranking.clone()),
            schemas: collaborators.schemas,
            relationships,
            pipeline,
            retriever,
            catalog: RwLock::new(Arc::new(TypeCatalog::default())),
            graph: RwLock::new(Arc::new(DependencyGraph::default())),
            cfg,
        })
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &RecommenderConfig {
        &self.cfg
    }

    /// Current live-catalog snapshot
    pub fn catalog(&self) -> Arc<TypeCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Current dependency-graph snapshot
    pub fn graph(&self) -> Arc<DependencyGraph> {
        Arc::clone(&self.graph.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the live catalog the resolver checks targets against
    pub fn set_catalog(&self, types: impl IntoIterator<Item = ResourceTypeRef>) {
        let catalog = Arc::new(TypeCatalog::new(types));
        tracing::debug!(types = catalog.len(), "Live catalog replaced");
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = catalog;
    }

    /// Re-read the dependency graph from the relationship store
    pub async fn reload_graph(&self) -> Result<()> {
        let graph = Arc::new(self.relationships.snapshot().await?);
        tracing::debug!(edges = graph.edge_count(), "Dependency graph reloaded");
        *self.graph.write().unwrap_or_else(PoisonError::into_inner) = graph;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Scan path
    // ─────────────────────────────────────────────────────────────────────────────

    /// Scan and index `known_types`, which also become the live catalog.
    ///
    /// Types missing from `known_types` are pruned from both stores.
    /// Per-type failures are reported in the summary; only a failure to
    /// reload the dependency graph afterwards is returned as an error.
    pub async fn scan_and_index(&self, known_types: &[ResourceTypeRef]) -> Result<ScanSummary> {
        self.set_catalog(known_types.iter().cloned());
        let summary = self.pipeline.scan(known_types).await;
        self.reload_graph().await?;
        Ok(summary)
    }

    /// List the cluster's resource types through the schema source and scan them
    pub async fn scan_cluster(&self) -> Result<ScanSummary> {
        let known_types = self.schemas.list_known_resource_types().await?;
        self.scan_and_index(&known_types).await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Request path
    // ─────────────────────────────────────────────────────────────────────────────

    /// Ranked solution candidates for `intent`.
    ///
    /// `Ok(vec![])` means nothing matched; a missed deadline is `Timeout`.
    pub async fn recommend(
        &self,
        intent: &str,
        top_k: usize,
        deadline: Instant,
    ) -> Result<Vec<SolutionCandidate>> {
        self.recommend_with(RecommendRequest::new(intent, top_k, deadline))
            .await
    }

    /// [`recommend`](Self::recommend) with cancellation and pattern adjustments
    pub async fn recommend_with(
        &self,
        request: RecommendRequest,
    ) -> Result<Vec<SolutionCandidate>> {
        let catalog = self.catalog();
        let graph = self.graph();

        let work = self.recommend_inner(&request, &catalog, &graph);
        let outcome = match &request.cancel {
            Some(token) => work.or_interrupt(request.deadline, token).await,
            None => work.or_deadline(request.deadline).await,
        };

        let candidates = match outcome {
            Ok(result) => result?,
            Err(interrupted) => {
                tracing::warn!(
                    intent = %request.intent,
                    reason = %interrupted,
                    "recommend interrupted"
                );
                return Err(interrupted.into());
            }
        };

        tracing::debug!(
            intent = %request.intent,
            candidates = candidates.len(),
            "recommend finished"
        );
        Ok(candidates)
    }

    async fn recommend_inner(
        &self,
        request: &RecommendRequest,
        catalog: &TypeCatalog,
        graph: &DependencyGraph,
    ) -> Result<Vec<SolutionCandidate>> {
        let hits = self.retriever.search(&request.intent, request.top_k).await?;
        let current_model = self.retriever.model_version();

        let candidates = hits
            .into_iter()
            .map(|hit| {
                let mut candidate = self
                    .resolver
                    .resolve(&hit.record.resource, graph, catalog)
                    .with_similarity(hit.score);
                if hit.is_stale(current_model) {
                    candidate.rationale.push(format!(
                        "matched record was embedded with {}, queries use {current_model}",
                        hit.embedding_model_version()
                    ));
                }
                candidate.embedding_model_version = Some(hit.record.embedding_model_version);
                candidate
            })
            .collect();

        Ok(self.ranker.rank(candidates, &request.pattern_adjustments))
    }
}

/// Compute SHA-256 hash of input, returning hex string
pub fn compute_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}

// Need hex encoding for hashes
mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut s = String::with_capacity(bytes.len() * 2);
        for &b in bytes {
            s.push(HEX_CHARS[(b >> 4) as usize] as char);
            s.push(HEX_CHARS[(b & 0xf) as usize] as char);
        }
        s
    }
}
