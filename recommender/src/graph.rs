//! Dependency graph snapshot and relationship storage
//!
//! Edges are stored per dependent: a re-scan of a type replaces its whole
//! outgoing edge set, so edges no longer derivable from its schema disappear.
//! The graph may contain cycles; traversal code is responsible for bounding
//! itself (see [`crate::resolver`]).

// RwLock poisoning requires a panic in a critical section; allow expect for internal locks
#![allow(clippy::expect_used)]

use crate::errors::{RecommendError, Result};
use crate::types::{DependencyEdge, EdgeKey, RelationKind, ResourceTypeRef};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable view of every known edge, grouped by dependent.
///
/// Edges of each dependent are sorted by key, so traversal order is fixed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph {
    outgoing: BTreeMap<ResourceTypeRef, Vec<DependencyEdge>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from edges; a later edge with the same key replaces an earlier one
    pub fn from_edges(edges: impl IntoIterator<Item = DependencyEdge>) -> Self {
        let mut by_key: BTreeMap<EdgeKey, DependencyEdge> = BTreeMap::new();
        for edge in edges {
            by_key.insert(edge.key(), edge);
        }
        let mut outgoing: BTreeMap<ResourceTypeRef, Vec<DependencyEdge>> = BTreeMap::new();
        for (_, edge) in by_key {
            outgoing.entry(edge.dependent.clone()).or_default().push(edge);
        }
        Self { outgoing }
    }

    /// Outgoing edges of `dependent`, sorted by key
    pub fn edges_from(&self, dependent: &ResourceTypeRef) -> &[DependencyEdge] {
        self.outgoing
            .get(dependent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Distinct targets of `dependent`'s edges of one relation kind
    pub fn targets(
        &self,
        dependent: &ResourceTypeRef,
        relation: RelationKind,
    ) -> BTreeSet<&ResourceTypeRef> {
        self.edges_from(dependent)
            .iter()
            .filter(|e| e.relation == relation)
            .map(|e| &e.dependency)
            .collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.outgoing.values().flatten()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }

    /// Types with at least one outgoing edge
    pub fn dependents(&self) -> impl Iterator<Item = &ResourceTypeRef> {
        self.outgoing.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RelationshipStore Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Storage for dependency edges
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Replace every outgoing edge of `dependent` with `edges`
    async fn replace_edges_for(
        &self,
        dependent: &ResourceTypeRef,
        edges: Vec<DependencyEdge>,
    ) -> Result<()>;

    /// Outgoing edges of `dependent`, sorted by key
    async fn edges_from(&self, dependent: &ResourceTypeRef) -> Result<Vec<DependencyEdge>>;

    /// Immutable snapshot of the whole graph
    async fn snapshot(&self) -> Result<DependencyGraph>;
}

/// Reject edges that do not belong to `dependent` or carry an invalid confidence
pub(crate) fn check_edges(dependent: &ResourceTypeRef, edges: &[DependencyEdge]) -> Result<()> {
    for edge in edges {
        if &edge.dependent != dependent {
            return Err(RecommendError::relationship_store(format!(
                "edge from {} submitted while replacing edges of {dependent}",
                edge.dependent
            )));
        }
        if !(0.0..=1.0).contains(&edge.confidence) {
            return Err(RecommendError::relationship_store(format!(
                "edge {} -> {} has confidence {} outside [0, 1]",
                edge.dependent, edge.dependency, edge.confidence
            )));
        }
    }
    Ok(())
}

/// Sort by key and keep the last edge submitted for each key
pub(crate) fn dedup_by_key(edges: Vec<DependencyEdge>) -> Vec<DependencyEdge> {
    let mut by_key: BTreeMap<EdgeKey, DependencyEdge> = BTreeMap::new();
    for edge in edges {
        by_key.insert(edge.key(), edge);
    }
    by_key.into_values().collect()
}

/// In-memory [`RelationshipStore`]
#[derive(Debug, Default)]
pub struct InMemoryRelationshipStore {
    edges: RwLock<BTreeMap<ResourceTypeRef, Vec<DependencyEdge>>>,
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn replace_edges_for(
        &self,
        dependent: &ResourceTypeRef,
        edges: Vec<DependencyEdge>,
    ) -> Result<()> {
        check_edges(dependent, &edges)?;
        let edges = dedup_by_key(edges);
        let mut all = self.edges.write().expect("lock");
        if edges.is_empty() {
            all.remove(dependent);
        } else {
            all.insert(dependent.clone(), edges);
        }
        Ok(())
    }

    async fn edges_from(&self, dependent: &ResourceTypeRef) -> Result<Vec<DependencyEdge>> {
        Ok(self
            .edges
            .read()
            .expect("lock")
            .get(dependent)
            .cloned()
            .unwrap_or_default())
    }

    async fn snapshot(&self) -> Result<DependencyGraph> {
        let all = self.edges.read().expect("lock");
        Ok(DependencyGraph::from_edges(all.values().flatten().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn r(kind: &str) -> ResourceTypeRef {
        ResourceTypeRef::new(kind, "example.org", "v1")
    }

    fn edge(from: &str, to: &str, relation: RelationKind, field: &str) -> DependencyEdge {
        DependencyEdge {
            dependent: r(from),
            dependency: r(to),
            relation,
            field: field.to_string(),
            evidence: String::new(),
            reason: String::new(),
            confidence: 0.9,
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn test_graph_dedups_by_key() {
        let mut later = edge("A", "B", RelationKind::Optional, "spec.bRef");
        later.confidence = 0.95;
        let graph = DependencyGraph::from_edges([
            edge("A", "B", RelationKind::Required, "spec.bRef"),
            later,
            edge("A", "C", RelationKind::Required, "spec.cRef"),
        ]);
        assert_eq!(graph.edge_count(), 2);
        let from_a = graph.edges_from(&r("A"));
        assert_eq!(from_a[0].dependency, r("B"));
        assert_eq!(from_a[0].confidence, 0.95);
        assert_eq!(graph.targets(&r("A"), RelationKind::Required).len(), 1);
        assert!(graph.edges_from(&r("Z")).is_empty());
    }

    #[tokio::test]
    async fn test_replace_drops_stale_edges() {
        let store = InMemoryRelationshipStore::new();
        store
            .replace_edges_for(
                &r("A"),
                vec![
                    edge("A", "B", RelationKind::Required, "spec.bRef"),
                    edge("A", "C", RelationKind::Optional, "spec.cRef"),
                ],
            )
            .await
            .unwrap();
        store
            .replace_edges_for(&r("A"), vec![edge("A", "B", RelationKind::Required, "spec.bRef")])
            .await
            .unwrap();

        let edges = store.edges_from(&r("A")).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].dependency, r("B"));

        store.replace_edges_for(&r("A"), Vec::new()).await.unwrap();
        assert!(store.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_rejects_foreign_edges() {
        let store = InMemoryRelationshipStore::new();
        let err = store
            .replace_edges_for(&r("A"), vec![edge("B", "C", RelationKind::Required, "")])
            .await
            .unwrap_err();
        assert_eq!(
            err.category(),
            crate::errors::ErrorCategory::RelationshipStoreError
        );
    }

    #[tokio::test]
    async fn test_snapshot_keeps_cycles() {
        let store = InMemoryRelationshipStore::new();
        store
            .replace_edges_for(&r("A"), vec![edge("A", "B", RelationKind::Required, "")])
            .await
            .unwrap();
        store
            .replace_edges_for(&r("B"), vec![edge("B", "A", RelationKind::Required, "")])
            .await
            .unwrap();
        let graph = store.snapshot().await.unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dependents().count(), 2);
    }
}
