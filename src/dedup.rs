//! Content-hash duplicate suppression across the configured stores.
//!
//! A node counts as already indexed only when every configured store has
//! it. The graph store is asked by `(content_hash, owner)`, the vector
//! store by document id, which for hashed nodes is `"{owner}:{hash}"`. Nodes
//! too short to hash are never considered indexed and are rewritten every
//! time they are seen (the writes are upserts).
//!
//! Lookup failures and timeouts count as "not indexed": a redundant
//! rewrite is harmless, a wrongly skipped node is lost data.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use sync_harness_core::hash::ContentHasher;
use sync_harness_core::models::{Node, PreparedNode};
use sync_harness_core::store::{GraphStore, VectorStore};

use crate::error::timed;

/// The target stores this process was configured with.
///
/// Either store may be absent. With neither configured, writes are
/// no-ops and nothing is ever treated as a duplicate.
#[derive(Clone, Default)]
pub struct StoreSet {
    pub graph: Option<Arc<dyn GraphStore>>,
    pub vector: Option<Arc<dyn VectorStore>>,
}

impl StoreSet {
    pub fn new(graph: Arc<dyn GraphStore>, vector: Arc<dyn VectorStore>) -> Self {
        Self {
            graph: Some(graph),
            vector: Some(vector),
        }
    }

    pub fn graph_only(graph: Arc<dyn GraphStore>) -> Self {
        Self {
            graph: Some(graph),
            vector: None,
        }
    }

    pub fn vector_only(vector: Arc<dyn VectorStore>) -> Self {
        Self {
            graph: None,
            vector: Some(vector),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_none() && self.vector.is_none()
    }

    pub fn describe(&self) -> &'static str {
        match (&self.graph, &self.vector) {
            (Some(_), Some(_)) => "graph+vector",
            (Some(_), None) => "graph",
            (None, Some(_)) => "vector",
            (None, None) => "none",
        }
    }
}

/// Nodes from one item that still need writing.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub fresh: Vec<PreparedNode>,
    pub duplicates: usize,
}

/// Node id and the vector document id it is expected under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    pub node_id: String,
    pub document_id: String,
}

/// A node found in one store but not the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialEntry {
    pub node_id: String,
    pub document_id: String,
    pub in_graph: bool,
    pub in_vector: bool,
}

pub struct Deduplicator {
    stores: StoreSet,
    hasher: ContentHasher,
    call_timeout: Duration,
}

impl Deduplicator {
    pub fn new(stores: StoreSet, hasher: ContentHasher, call_timeout: Duration) -> Self {
        Self {
            stores,
            hasher,
            call_timeout,
        }
    }

    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    pub fn prepare(&self, nodes: Vec<Node>) -> Vec<PreparedNode> {
        nodes.into_iter().map(|n| self.hasher.prepare(n)).collect()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(owner = owner, candidates = nodes.len()))]
    pub async fn filter_new(&self, owner: &str, nodes: Vec<PreparedNode>) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        for node in nodes {
            if self.is_indexed(owner, &node).await {
                debug!(node_id = %node.node.id, "already indexed");
                outcome.duplicates += 1;
            } else {
                outcome.fresh.push(node);
            }
        }
        outcome
    }

    /// Whether `node` is present in every configured store.
    pub async fn is_indexed(&self, owner: &str, node: &PreparedNode) -> bool {
        let Some(hash) = node.content_hash.as_deref() else {
            return false;
        };
        if self.stores.is_empty() {
            return false;
        }

        if let Some(graph) = &self.stores.graph {
            let found = timed(
                "graph.exists_by_content_hash",
                self.call_timeout,
                graph.exists_by_content_hash(hash, owner),
            )
            .await;
            if !self.present(found, &node.node.id) {
                return false;
            }
        }

        if let Some(vector) = &self.stores.vector {
            let document_id = node.document_id(owner);
            let found = timed(
                "vector.document_exists",
                self.call_timeout,
                vector.document_exists(&document_id),
            )
            .await;
            if !self.present(found, &node.node.id) {
                return false;
            }
        }

        true
    }

    fn present(
        &self,
        found: Result<Result<bool>, crate::error::CallTimeout>,
        node_id: &str,
    ) -> bool {
        match found {
            Ok(Ok(present)) => present,
            Ok(Err(e)) => {
                warn!(node_id, error = %format!("{:#}", e), "dedup lookup failed; treating as not indexed");
                false
            }
            Err(timeout) => {
                warn!(node_id, error = %timeout, "dedup lookup timed out; treating as not indexed");
                false
            }
        }
    }

    /// Nodes that exist in exactly one of the two stores.
    ///
    /// Only meaningful with both stores configured; otherwise nothing can
    /// be partial and the result is empty. When a node id appears in more
    /// than one key the first wins, so pass the graph's keys first.
    #[tracing::instrument(level = "debug", skip_all, fields(keys = keys.len()))]
    pub async fn partial_entries(&self, keys: &[IndexKey]) -> Result<Vec<PartialEntry>> {
        let (Some(graph), Some(vector)) = (&self.stores.graph, &self.stores.vector) else {
            return Ok(Vec::new());
        };

        let mut unique: BTreeMap<String, String> = BTreeMap::new();
        for key in keys {
            unique
                .entry(key.node_id.clone())
                .or_insert_with(|| key.document_id.clone());
        }
        let node_ids: Vec<String> = unique.keys().cloned().collect();
        let doc_ids: Vec<String> = unique.values().cloned().collect();

        let in_graph = graph.batch_exists(&node_ids).await?;
        let in_vector = vector.batch_document_exists(&doc_ids).await?;

        Ok(unique
            .into_iter()
            .filter_map(|(node_id, document_id)| {
                let g = in_graph.get(&node_id).copied().unwrap_or(false);
                let v = in_vector.get(&document_id).copied().unwrap_or(false);
                (g != v).then_some(PartialEntry {
                    node_id,
                    document_id,
                    in_graph: g,
                    in_vector: v,
                })
            })
            .collect())
    }
}
