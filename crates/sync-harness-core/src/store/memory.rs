//! In-memory store implementations for tests and embedding.
//!
//! Uses `HashMap` behind `std::sync::RwLock`. Each store also exposes a few
//! inspection helpers (`len`, `get`, `remove`) that the trait surface does
//! not need but tests and tools do.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::cursor::Cursor;
use crate::models::{Edge, Node, PreparedNode};

use super::{CursorStore, GraphStore, VectorDocument, VectorStore};

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

struct StoredNode {
    owner: String,
    node: Node,
    content_hash: Option<String>,
}

type EdgeKey = (String, String, String);

/// In-memory graph store. Nodes upsert by id, edges by
/// `(from_id, to_id, relation_type)`.
pub struct InMemoryGraphStore {
    nodes: RwLock<HashMap<String, StoredNode>>,
    edges: RwLock<HashMap<EdgeKey, Edge>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            edges: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.read().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.edges.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn get(&self, id: &str) -> Option<Node> {
        self.nodes
            .read()
            .ok()
            .and_then(|n| n.get(id).map(|s| s.node.clone()))
    }

    pub fn remove(&self, id: &str) -> Option<Node> {
        self.nodes
            .write()
            .ok()
            .and_then(|mut n| n.remove(id).map(|s| s.node))
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn exists_by_content_hash(&self, hash: &str, owner: &str) -> Result<bool> {
        let nodes = self.nodes.read().map_err(poisoned)?;
        Ok(nodes
            .values()
            .any(|s| s.owner == owner && s.content_hash.as_deref() == Some(hash)))
    }

    async fn write_batch(&self, owner: &str, nodes: &[PreparedNode], edges: &[Edge]) -> Result<()> {
        {
            let mut stored = self.nodes.write().map_err(poisoned)?;
            for prepared in nodes {
                stored.insert(
                    prepared.node.id.clone(),
                    StoredNode {
                        owner: owner.to_string(),
                        node: prepared.node.clone(),
                        content_hash: prepared.content_hash.clone(),
                    },
                );
            }
        }
        let mut stored_edges = self.edges.write().map_err(poisoned)?;
        for edge in edges {
            let key = (
                edge.from_id.clone(),
                edge.to_id.clone(),
                edge.relation_type.clone(),
            );
            stored_edges.insert(key, edge.clone());
        }
        Ok(())
    }

    async fn batch_exists(&self, ids: &[String]) -> Result<HashMap<String, bool>> {
        let nodes = self.nodes.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .map(|id| (id.clone(), nodes.contains_key(id)))
            .collect())
    }
}

/// In-memory vector store. Keeps documents only; no similarity search.
pub struct InMemoryVectorStore {
    docs: RwLock<HashMap<String, VectorDocument>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<VectorDocument> {
        self.docs.read().ok().and_then(|d| d.get(id).cloned())
    }

    pub fn remove(&self, id: &str) -> Option<VectorDocument> {
        self.docs.write().ok().and_then(|mut d| d.remove(id))
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn document_exists(&self, id: &str) -> Result<bool> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.contains_key(id))
    }

    async fn batch_document_exists(&self, ids: &[String]) -> Result<HashMap<String, bool>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .map(|id| (id.clone(), docs.contains_key(id)))
            .collect())
    }

    async fn upsert_batch(&self, batch: &[VectorDocument]) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        for doc in batch {
            docs.retain(|id, existing| *id == doc.id || existing.node_id != doc.node_id);
            docs.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }
}

/// In-memory cursor store keyed by (source, owner).
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<(String, String), Cursor>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self {
            cursors: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCursorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn load(&self, source: &str, owner: &str) -> Result<Option<Cursor>> {
        let cursors = self.cursors.read().map_err(poisoned)?;
        Ok(cursors
            .get(&(source.to_string(), owner.to_string()))
            .cloned())
    }

    async fn save(
        &self,
        source: &str,
        owner: &str,
        cursor: &Cursor,
        items_processed: u64,
    ) -> Result<()> {
        let mut cursors = self.cursors.write().map_err(poisoned)?;
        let key = (source.to_string(), owner.to_string());
        let previous = cursors.get(&key).map(|c| c.items_processed).unwrap_or(0);
        let mut saved = cursor.clone();
        saved.items_processed = previous + items_processed;
        saved.saved_at = Some(Utc::now());
        cursors.insert(key, saved);
        Ok(())
    }
}
