//! Dependency resolver
//!
//! Expands a primary resource type into a [`SolutionCandidate`]: the
//! transitive closure of its `required` edges (bounded by depth, cycle-safe)
//! plus the direct `optional` edges of everything in that closure.

use crate::catalog::TypeCatalog;
use crate::config::ResolverConfig;
use crate::graph::DependencyGraph;
use crate::types::{RelationKind, ResourceTypeRef, SolutionCandidate};
use std::collections::{BTreeSet, VecDeque};

/// Visited-set identity: versions are interchangeable for the same kind and group
type NodeId = (String, String);

fn node_id(resource: &ResourceTypeRef) -> NodeId {
    (resource.kind.to_ascii_lowercase(), resource.group.clone())
}

/// Bounded breadth-first resolver over a [`DependencyGraph`] snapshot
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver {
    max_depth: usize,
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

impl DependencyResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            max_depth: config.max_depth,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Resolve `primary` against `graph`, checking targets against `catalog`.
    ///
    /// Never fails: missing targets land in `unsatisfiable`, cycles are cut at
    /// the visited set and a hit depth bound sets `truncated`.
    pub fn resolve(
        &self,
        primary: &ResourceTypeRef,
        graph: &DependencyGraph,
        catalog: &TypeCatalog,
    ) -> SolutionCandidate {
        let mut candidate = SolutionCandidate::new(primary.clone());
        let mut visited: BTreeSet<NodeId> = BTreeSet::from([node_id(primary)]);
        let mut queue: VecDeque<(ResourceTypeRef, usize)> = VecDeque::from([(primary.clone(), 0)]);
        // Nodes whose optional edges are collected afterwards, in visit order
        let mut closure: Vec<ResourceTypeRef> = vec![primary.clone()];

        while let Some((node, depth)) = queue.pop_front() {
            let required = graph
                .edges_from(&node)
                .iter()
                .filter(|e| e.relation == RelationKind::Required);

            for edge in required {
                let target = &edge.dependency;
                let id = node_id(target);
                if visited.contains(&id) {
                    tracing::debug!(
                        from = %node,
                        to = %target,
                        "dependency already visited; skipping possible cycle"
                    );
                    continue;
                }

                if depth >= self.max_depth {
                    tracing::debug!(
                        primary = %primary,
                        from = %node,
                        to = %target,
                        max_depth = self.max_depth,
                        "dependency depth bound reached"
                    );
                    candidate.truncated = true;
                    continue;
                }

                visited.insert(id);
                match catalog.resolve(target) {
                    Some(installed) => {
                        candidate.rationale.push(format!(
                            "requires {installed} ({})",
                            describe_edge(&edge.field, &edge.reason)
                        ));
                        candidate.required.insert(installed.clone());
                        closure.push(installed.clone());
                        queue.push_back((installed, depth + 1));
                    }
                    None => {
                        candidate.rationale.push(format!(
                            "requires {target}, which is not installed in the cluster"
                        ));
                        candidate.unsatisfiable.insert(target.clone());
                    }
                }
            }
        }

        for node in &closure {
            for edge in graph.edges_from(node) {
                if edge.relation != RelationKind::Optional
                    || visited.contains(&node_id(&edge.dependency))
                {
                    continue;
                }
                if let Some(installed) = catalog.resolve(&edge.dependency)
                    && candidate.optional.insert(installed.clone())
                {
                    candidate.rationale.push(format!(
                        "can use {installed} ({})",
                        describe_edge(&edge.field, &edge.reason)
                    ));
                }
            }
        }

        candidate
    }
}

fn describe_edge(field: &str, reason: &str) -> String {
    match (field.is_empty(), reason.is_empty()) {
        (false, false) => format!("{field}: {reason}"),
        (false, true) => field.to_string(),
        (true, false) => reason.to_string(),
        (true, true) => "inferred dependency".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DependencyEdge;
    use chrono::Utc;

    fn r(kind: &str) -> ResourceTypeRef {
        ResourceTypeRef::new(kind, "example.org", "v1")
    }

    fn edge(from: &str, to: &str, relation: RelationKind) -> DependencyEdge {
        DependencyEdge {
            dependent: r(from),
            dependency: r(to),
            relation,
            field: format!("spec.{}Ref", to.to_ascii_lowercase()),
            evidence: String::new(),
            reason: "typed reference".to_string(),
            confidence: 0.95,
            discovered_at: Utc::now(),
        }
    }

    fn catalog(kinds: &[&str]) -> TypeCatalog {
        kinds.iter().map(|k| r(k)).collect()
    }

    #[test]
    fn test_transitive_required_and_direct_optional() {
        let graph = DependencyGraph::from_edges([
            edge("App", "Db", RelationKind::Required),
            edge("Db", "Network", RelationKind::Required),
            edge("Db", "Backup", RelationKind::Optional),
            edge("Backup", "Vault", RelationKind::Optional),
            edge("App", "Dashboard", RelationKind::Enhances),
        ]);
        let catalog = catalog(&["App", "Db", "Network", "Backup", "Vault", "Dashboard"]);

        let c = DependencyResolver::default().resolve(&r("App"), &graph, &catalog);
        assert_eq!(c.required, BTreeSet::from([r("Db"), r("Network")]));
        assert_eq!(c.optional, BTreeSet::from([r("Backup")]));
        assert!(c.unsatisfiable.is_empty());
        assert!(!c.truncated);
        assert!(c.rationale.iter().any(|l| l.starts_with("requires Db.example.org/v1")));
    }

    #[test]
    fn test_cycle_terminates() {
        let graph = DependencyGraph::from_edges([
            edge("A", "B", RelationKind::Required),
            edge("B", "A", RelationKind::Required),
        ]);
        let c = DependencyResolver::default().resolve(&r("A"), &graph, &catalog(&["A", "B"]));
        assert_eq!(c.required, BTreeSet::from([r("B")]));
        assert!(!c.required.contains(&r("A")));
    }

    #[test]
    fn test_missing_target_is_unsatisfiable_and_not_traversed() {
        let graph = DependencyGraph::from_edges([
            edge("App", "Missing", RelationKind::Required),
            edge("Missing", "Deeper", RelationKind::Required),
        ]);
        let c =
            DependencyResolver::default().resolve(&r("App"), &graph, &catalog(&["App", "Deeper"]));
        assert_eq!(c.unsatisfiable, BTreeSet::from([r("Missing")]));
        assert!(c.required.is_empty());
        assert!(!c.is_complete());
    }

    #[test]
    fn test_depth_bound_truncates() {
        let graph = DependencyGraph::from_edges([
            edge("L0", "L1", RelationKind::Required),
            edge("L1", "L2", RelationKind::Required),
            edge("L2", "L3", RelationKind::Required),
        ]);
        let catalog = catalog(&["L0", "L1", "L2", "L3"]);

        let c = DependencyResolver::with_max_depth(2).resolve(&r("L0"), &graph, &catalog);
        assert_eq!(c.required, BTreeSet::from([r("L1"), r("L2")]));
        assert!(c.truncated);

        let c = DependencyResolver::with_max_depth(0).resolve(&r("L0"), &graph, &catalog);
        assert!(c.required.is_empty());
        assert!(c.truncated);
    }

    #[test]
    fn test_optional_target_missing_from_catalog_is_omitted() {
        let graph = DependencyGraph::from_edges([edge("App", "Cache", RelationKind::Optional)]);
        let c = DependencyResolver::default().resolve(&r("App"), &graph, &catalog(&["App"]));
        assert!(c.optional.is_empty());
        assert!(c.is_complete());
    }

    #[test]
    fn test_version_skew_still_satisfies() {
        let graph = DependencyGraph::from_edges([edge("App", "Db", RelationKind::Required)]);
        let catalog = TypeCatalog::new([r("App"), ResourceTypeRef::new("Db", "example.org", "v2")]);
        let c = DependencyResolver::default().resolve(&r("App"), &graph, &catalog);
        assert_eq!(
            c.required,
            BTreeSet::from([ResourceTypeRef::new("Db", "example.org", "v2")])
        );
    }
}
