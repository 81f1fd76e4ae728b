//! Storage abstractions the engine writes through.
//!
//! Three narrow collaborator interfaces:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`GraphStore`] | Structured node/edge store, upserts by node id |
//! | [`VectorStore`] | Semantic index of embeddable documents, upserts by document id |
//! | [`CursorStore`] | Durable per-(source, owner) checkpoints |
//!
//! Every store is shared by all source engines, so implementations must
//! tolerate concurrent writers (upsert semantics, never positional
//! overwrite). All methods are async via `async-trait`; the in-memory
//! implementations in [`memory`] return immediately-ready futures.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cursor::Cursor;
use crate::models::{Edge, PreparedNode};

/// A document as written to the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    /// `"{owner}:{content_hash}"` when the node has a hash, otherwise the
    /// node id.
    pub id: String,
    pub node_id: String,
    pub owner: String,
    pub text: String,
    /// Node type and attributes, carried as filterable metadata.
    pub metadata: Map<String, Value>,
    pub content_hash: Option<String>,
}

impl VectorDocument {
    pub fn from_prepared(owner: &str, prepared: &PreparedNode) -> Self {
        let node = &prepared.node;
        let mut metadata = node.attributes.clone();
        metadata.insert("node_type".to_string(), Value::String(node.node_type.clone()));
        Self {
            id: prepared.document_id(owner),
            node_id: node.id.clone(),
            owner: owner.to_string(),
            text: node.embeddable_text(),
            metadata,
            content_hash: prepared.content_hash.clone(),
        }
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Whether a node with this content hash exists for `owner`.
    async fn exists_by_content_hash(&self, hash: &str, owner: &str) -> Result<bool>;

    /// Upsert nodes (by id) and edges in one call.
    async fn write_batch(&self, owner: &str, nodes: &[PreparedNode], edges: &[Edge]) -> Result<()>;

    /// Presence of each id. Every requested id appears in the result.
    async fn batch_exists(&self, ids: &[String]) -> Result<HashMap<String, bool>>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn document_exists(&self, id: &str) -> Result<bool>;

    /// Presence of each id. Every requested id appears in the result.
    async fn batch_document_exists(&self, ids: &[String]) -> Result<HashMap<String, bool>>;

    /// Upsert documents by id. A node has at most one document: any other
    /// document carrying the same `node_id` is replaced.
    async fn upsert_batch(&self, docs: &[VectorDocument]) -> Result<()>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self, source: &str, owner: &str) -> Result<Option<Cursor>>;

    /// Persist `cursor` and add `items_processed` to the stored cumulative
    /// counter.
    async fn save(&self, source: &str, owner: &str, cursor: &Cursor, items_processed: u64)
        -> Result<()>;
}
