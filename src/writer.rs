//! Graph-then-vector batch writes.
//!
//! The graph write always goes first. If it fails the vector store is not
//! touched. If the vector write then fails, the graph keeps the nodes but
//! the batch is reported as failed; since dedup requires presence in both
//! stores, the next cycle rewrites the whole batch. Both writes are
//! upserts, so the rewrite is idempotent.

use std::time::Duration;

use tracing::{debug, warn};

use sync_harness_core::models::{Edge, PreparedNode};
use sync_harness_core::store::VectorDocument;

use crate::dedup::StoreSet;
use crate::error::{timed, WriteError};

pub struct DualStoreWriter {
    stores: StoreSet,
    call_timeout: Duration,
}

impl DualStoreWriter {
    pub fn new(stores: StoreSet, call_timeout: Duration) -> Self {
        Self {
            stores,
            call_timeout,
        }
    }

    /// Write `nodes` and their edges. Returns the number of nodes written.
    #[tracing::instrument(level = "debug", skip_all, fields(owner = owner, nodes = nodes.len()))]
    pub async fn write(&self, owner: &str, nodes: &[PreparedNode]) -> Result<usize, WriteError> {
        if nodes.is_empty() {
            return Ok(0);
        }
        if self.stores.is_empty() {
            debug!("no stores configured; write is a no-op");
            return Ok(nodes.len());
        }

        if let Some(graph) = &self.stores.graph {
            let edges: Vec<Edge> = nodes
                .iter()
                .flat_map(|p| p.node.edges.iter().cloned())
                .collect();
            timed(
                "graph.write_batch",
                self.call_timeout,
                graph.write_batch(owner, nodes, &edges),
            )
            .await
            .map_err(|t| WriteError::Graph(t.into()))?
            .map_err(WriteError::Graph)?;
        }

        if let Some(vector) = &self.stores.vector {
            let docs: Vec<VectorDocument> = nodes
                .iter()
                .map(|p| VectorDocument::from_prepared(owner, p))
                .collect();
            let written = timed(
                "vector.upsert_batch",
                self.call_timeout,
                vector.upsert_batch(&docs),
            )
            .await
            .map_err(|t| WriteError::Vector(t.into()))
            .and_then(|r| r.map_err(WriteError::Vector));

            if let Err(e) = written {
                if self.stores.graph.is_some() {
                    warn!(
                        error = %e,
                        "vector write failed after graph write; nodes will be rewritten next cycle"
                    );
                }
                return Err(e);
            }
        }

        Ok(nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use sync_harness_core::hash::ContentHasher;
    use sync_harness_core::models::Node;
    use sync_harness_core::store::memory::{InMemoryGraphStore, InMemoryVectorStore};
    use sync_harness_core::store::{GraphStore, VectorStore};

    struct DownVector;

    #[async_trait]
    impl VectorStore for DownVector {
        async fn document_exists(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn batch_document_exists(&self, _ids: &[String]) -> Result<HashMap<String, bool>> {
            Ok(HashMap::new())
        }
        async fn upsert_batch(&self, _docs: &[VectorDocument]) -> Result<()> {
            anyhow::bail!("index unavailable")
        }
    }

    struct DownGraph;

    #[async_trait]
    impl GraphStore for DownGraph {
        async fn exists_by_content_hash(&self, _h: &str, _o: &str) -> Result<bool> {
            Ok(false)
        }
        async fn write_batch(&self, _o: &str, _n: &[PreparedNode], _e: &[Edge]) -> Result<()> {
            anyhow::bail!("graph unavailable")
        }
        async fn batch_exists(&self, _ids: &[String]) -> Result<HashMap<String, bool>> {
            Ok(HashMap::new())
        }
    }

    fn nodes() -> Vec<PreparedNode> {
        let hasher = ContentHasher::default();
        vec![hasher.prepare(
            Node::new("doc-1", "document")
                .with_text("Retro notes: the vector index was down for an hour on Tuesday.")
                .with_edge("person-1", "mentions"),
        )]
    }

    #[tokio::test]
    async fn writes_both_stores() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vector = Arc::new(InMemoryVectorStore::new());
        let writer = DualStoreWriter::new(
            StoreSet::new(graph.clone(), vector.clone()),
            Duration::from_secs(5),
        );

        assert_eq!(writer.write("alice", &nodes()).await.unwrap(), 1);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(vector.len(), 1);
    }

    #[tokio::test]
    async fn graph_failure_skips_vector() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let writer = DualStoreWriter::new(
            StoreSet::new(Arc::new(DownGraph), vector.clone()),
            Duration::from_secs(5),
        );

        let err = writer.write("alice", &nodes()).await.unwrap_err();
        assert!(matches!(err, WriteError::Graph(_)));
        assert!(vector.is_empty());
    }

    #[tokio::test]
    async fn vector_failure_leaves_graph_and_reports_error() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let writer = DualStoreWriter::new(
            StoreSet::new(graph.clone(), Arc::new(DownVector)),
            Duration::from_secs(5),
        );

        let err = writer.write("alice", &nodes()).await.unwrap_err();
        assert!(matches!(err, WriteError::Vector(_)));
        assert_eq!(graph.len(), 1);
    }

    #[tokio::test]
    async fn single_store_and_no_store() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let writer = DualStoreWriter::new(StoreSet::vector_only(vector.clone()), Duration::from_secs(5));
        assert_eq!(writer.write("alice", &nodes()).await.unwrap(), 1);
        assert_eq!(vector.len(), 1);

        let writer = DualStoreWriter::new(StoreSet::default(), Duration::from_secs(5));
        assert_eq!(writer.write("alice", &nodes()).await.unwrap(), 1);
    }
}
