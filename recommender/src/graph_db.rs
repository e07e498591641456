//! SQLite-backed relationship store
//!
//! Persists dependency edges so a restarted engine can answer requests before
//! the next scan completes. One connection guarded by a mutex; the async trait
//! methods run their statements on the blocking pool so disk I/O never stalls
//! a runtime worker.

// Mutex poisoning requires a panic in a critical section; allow expect for internal locks
#![allow(clippy::expect_used)]

use crate::config::RecommenderConfig;
use crate::errors::{RecommendError, Result};
use crate::graph::{DependencyGraph, RelationshipStore, check_edges, dedup_by_key};
use crate::types::{DependencyEdge, RelationKind, ResourceTypeRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Embedded schema SQL from RELATIONSHIPS_SCHEMA.sql
const SCHEMA_SQL: &str = include_str!("../RELATIONSHIPS_SCHEMA.sql");

const SELECT_COLUMNS: &str = r#"
    SELECT dependent_kind, dependent_group, dependent_version,
           dependency_kind, dependency_group, dependency_version,
           field, relation, evidence, reason, confidence, discovered_at
    FROM dependency_edges
"#;

/// Relationship store wrapper
pub struct SqliteRelationshipStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRelationshipStore {
    /// Open the database named by `store.relationship_db_path`
    pub fn connect_and_init(cfg: &RecommenderConfig) -> Result<Self> {
        let path = cfg.store.resolved_db_path();
        Self::connect_and_init_at_path(&path)
    }

    /// Connect to a specific database path, creating it if needed
    pub fn connect_and_init_at_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecommendError::relationship_store_with_source(
                    format!("failed to create db directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            RecommendError::relationship_store_with_source(
                format!("failed to open db at {}", path.display()),
                e,
            )
        })?;

        Self::apply_schema(&conn)?;

        tracing::debug!(path = %path.display(), "Relationship DB initialized");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Connect to an in-memory database (for testing)
    pub fn connect_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            RecommendError::relationship_store_with_source("failed to open in-memory db", e)
        })?;

        Self::apply_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn apply_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL).map_err(|e| {
            RecommendError::relationship_store_with_source("failed to apply schema", e)
        })?;
        Ok(())
    }

    /// Run `op` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("lock");
            op(&mut conn)
        })
        .await
        .map_err(|e| RecommendError::relationship_store_with_source("database task failed", e))?
    }

    /// Total stored edges (for metrics/debugging). Blocking.
    pub fn edge_count(&self) -> Result<i64> {
        self.conn
            .lock()
            .expect("lock")
            .query_row("SELECT COUNT(*) FROM dependency_edges", [], |row| row.get(0))
            .map_err(|e| RecommendError::relationship_store_with_source("failed to count edges", e))
    }

    fn query_edges(
        conn: &Connection,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<DependencyEdge>> {
        let sql = format!("{SELECT_COLUMNS} {filter}");
        let mut stmt = conn.prepare(&sql).map_err(|e| {
            RecommendError::relationship_store_with_source("failed to prepare query", e)
        })?;

        let rows = stmt.query_map(args, edge_from_row).map_err(|e| {
            RecommendError::relationship_store_with_source("failed to query edges", e)
        })?;

        let mut edges = Vec::new();
        for row in rows {
            edges.push(row.map_err(|e| {
                RecommendError::relationship_store_with_source("failed to read edge row", e)
            })?);
        }
        Ok(edges)
    }
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<DependencyEdge> {
    let relation: String = row.get(7)?;
    let relation = RelationKind::parse(&relation).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown relation kind: {relation}").into(),
        )
    })?;
    let discovered_at: String = row.get(11)?;
    let discovered_at = DateTime::parse_from_rfc3339(&discovered_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(DependencyEdge {
        dependent: ResourceTypeRef::new(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ),
        dependency: ResourceTypeRef::new(
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ),
        field: row.get(6)?,
        relation,
        evidence: row.get(8)?,
        reason: row.get(9)?,
        confidence: row.get(10)?,
        discovered_at,
    })
}

/// Replace every edge stored for dependent `key` in one transaction
fn write_edges(conn: &mut Connection, key: &str, edges: &[DependencyEdge]) -> Result<()> {
    let tx = conn.transaction().map_err(|e| {
        RecommendError::relationship_store_with_source("failed to begin transaction", e)
    })?;

    tx.execute(
        "DELETE FROM dependency_edges WHERE dependent_key = ?1",
        params![key],
    )
    .map_err(|e| RecommendError::relationship_store_with_source("failed to clear edges", e))?;

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO dependency_edges (
                    dependent_key, dependent_kind, dependent_group, dependent_version,
                    dependency_key, dependency_kind, dependency_group, dependency_version,
                    field, relation, evidence, reason, confidence, discovered_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
            )
            .map_err(|e| {
                RecommendError::relationship_store_with_source("failed to prepare insert", e)
            })?;

        for edge in edges {
            stmt.execute(params![
                edge.dependent.key(),
                edge.dependent.kind,
                edge.dependent.group,
                edge.dependent.version,
                edge.dependency.key(),
                edge.dependency.kind,
                edge.dependency.group,
                edge.dependency.version,
                edge.field,
                edge.relation.as_str(),
                edge.evidence,
                edge.reason,
                edge.confidence,
                edge.discovered_at.to_rfc3339(),
            ])
            .map_err(|e| {
                RecommendError::relationship_store_with_source(
                    format!("failed to insert edge {} -> {}", edge.dependent, edge.dependency),
                    e,
                )
            })?;
        }
    }

    tx.commit()
        .map_err(|e| RecommendError::relationship_store_with_source("failed to commit edges", e))?;
    Ok(())
}

#[async_trait]
impl RelationshipStore for SqliteRelationshipStore {
    async fn replace_edges_for(
        &self,
        dependent: &ResourceTypeRef,
        edges: Vec<DependencyEdge>,
    ) -> Result<()> {
        check_edges(dependent, &edges)?;
        let edges = dedup_by_key(edges);

        let edge_count = edges.len();
        let key = dependent.key();
        self.with_conn(move |conn| write_edges(conn, &key, &edges))
            .await?;

        tracing::debug!(dependent = %dependent, edges = edge_count, "Replaced dependency edges");
        Ok(())
    }

    async fn edges_from(&self, dependent: &ResourceTypeRef) -> Result<Vec<DependencyEdge>> {
        let key = dependent.key();
        let mut edges = self
            .with_conn(move |conn| {
                Self::query_edges(conn, "WHERE dependent_key = ?1", params![key])
            })
            .await?;
        edges.sort_by_key(DependencyEdge::key);
        Ok(edges)
    }

    async fn snapshot(&self) -> Result<DependencyGraph> {
        let edges = self
            .with_conn(|conn| Self::query_edges(conn, "", []))
            .await?;
        Ok(DependencyGraph::from_edges(edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(
        from: &str,
        to: ResourceTypeRef,
        relation: RelationKind,
        field: &str,
    ) -> DependencyEdge {
        DependencyEdge {
            dependent: ResourceTypeRef::new(from, "dbforpostgresql.azure.upbound.io", "v1beta1"),
            dependency: to,
            relation,
            field: field.to_string(),
            evidence: format!("{field}: object"),
            reason: "typed reference".to_string(),
            confidence: 0.95,
            discovered_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .expect("valid timestamp")
                .with_timezone(&Utc),
        }
    }

    fn server() -> ResourceTypeRef {
        ResourceTypeRef::new("Server", "dbforpostgresql.azure.upbound.io", "v1beta1")
    }

    #[test]
    fn test_schema_applies() {
        let db = SqliteRelationshipStore::connect_in_memory().expect("should connect");
        assert_eq!(db.edge_count().expect("count"), 0);
    }

    #[tokio::test]
    async fn test_edges_roundtrip_and_replace() {
        let db = SqliteRelationshipStore::connect_in_memory().expect("should connect");
        let rg = ResourceTypeRef::new("ResourceGroup", "azure.upbound.io", "v1beta1");
        let secret = ResourceTypeRef::core("Secret", "v1");

        let original = vec![
            edge(
                "Server",
                rg.clone(),
                RelationKind::Required,
                "spec.forProvider.resourceGroupNameRef",
            ),
            edge(
                "Server",
                secret,
                RelationKind::Optional,
                "spec.forProvider.administratorLoginPasswordSecretRef",
            ),
        ];
        db.replace_edges_for(&server(), original.clone())
            .await
            .expect("replace");
        assert_eq!(db.edge_count().expect("count"), 2);

        let stored = db.edges_from(&server()).await.expect("edges");
        let mut expected = original;
        expected.sort_by_key(DependencyEdge::key);
        assert_eq!(stored, expected);

        db.replace_edges_for(
            &server(),
            vec![edge(
                "Server",
                rg,
                RelationKind::Required,
                "spec.forProvider.resourceGroupNameRef",
            )],
        )
        .await
        .expect("replace");
        assert_eq!(db.edge_count().expect("count"), 1);
        assert_eq!(db.snapshot().await.expect("snapshot").edge_count(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("relationships.db");
        let rg = ResourceTypeRef::new("ResourceGroup", "azure.upbound.io", "v1beta1");

        {
            let db = SqliteRelationshipStore::connect_and_init_at_path(&path).expect("open");
            let edges = vec![edge("Server", rg.clone(), RelationKind::Required, "")];
            db.replace_edges_for(&server(), edges)
                .await
                .expect("replace");
        }

        let db = SqliteRelationshipStore::connect_and_init_at_path(&path).expect("reopen");
        let graph = db.snapshot().await.expect("snapshot");
        assert_eq!(
            graph.targets(&server(), RelationKind::Required).into_iter().collect::<Vec<_>>(),
            vec![&rg]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writers_share_one_connection() {
        let db = Arc::new(SqliteRelationshipStore::connect_in_memory().expect("should connect"));
        let rg = ResourceTypeRef::new("ResourceGroup", "azure.upbound.io", "v1beta1");

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let db = Arc::clone(&db);
            let rg = rg.clone();
            tasks.spawn(async move {
                let kind = format!("Server{i}");
                let mut e = edge(&kind, rg, RelationKind::Required, "spec.resourceGroupNameRef");
                e.dependent = ResourceTypeRef::new(kind, "dbforpostgresql.azure.upbound.io", "v1");
                let dependent = e.dependent.clone();
                db.replace_edges_for(&dependent, vec![e]).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.expect("task").expect("replace");
        }

        let graph = db.snapshot().await.expect("snapshot");
        assert_eq!(graph.edge_count(), 16);
        assert_eq!(graph.dependents().count(), 16);
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_confidence() {
        let db = SqliteRelationshipStore::connect_in_memory().expect("should connect");
        let secret = ResourceTypeRef::core("Secret", "v1");
        let mut bad = edge("Server", secret, RelationKind::Optional, "");
        bad.confidence = 1.5;
        assert!(db.replace_edges_for(&server(), vec![bad]).await.is_err());
        assert_eq!(db.edge_count().expect("count"), 0);
    }
}
