//! Core data models exchanged between adapters, the engine, and the stores.
//!
//! A [`Node`] is the canonical unit of indexing. Adapters build nodes from
//! [`RawItem`]s; once a node is handed to the writer it is only read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A directed relation between two nodes.
///
/// `to_id` may point at a node outside the current batch (or one that was
/// never indexed at all). Resolving dangling references is the graph
/// store's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from_id: String,
    pub to_id: String,
    pub relation_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl Edge {
    pub fn new(
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            relation_type: relation_type.into(),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A normalized graph node produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable per source and content.
    pub id: String,
    /// Open tag: `document`, `person`, `message`, `event`, `action-item`, ...
    pub node_type: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Text used for embedding and for content-hash deduplication.
    #[serde(default)]
    pub searchable_text: Option<String>,
    /// Edges originating at this node.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            attributes: Map::new(),
            searchable_text: None,
            edges: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.searchable_text = Some(text.into());
        self
    }

    /// Add an edge from this node to `to_id`.
    pub fn with_edge(mut self, to_id: impl Into<String>, relation_type: impl Into<String>) -> Self {
        let edge = Edge::new(self.id.clone(), to_id, relation_type);
        self.edges.push(edge);
        self
    }

    /// Text handed to the vector store.
    ///
    /// Falls back to a flat rendering of the type and attributes for nodes
    /// that carry no searchable text (people, events without a body, ...).
    pub fn embeddable_text(&self) -> String {
        match &self.searchable_text {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => {
                let mut out = self.node_type.clone();
                for (key, value) in &self.attributes {
                    let rendered = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    out.push_str(&format!("\n{}: {}", key, rendered));
                }
                out
            }
        }
    }
}

/// A node paired with its content hash, ready for the stores.
///
/// `content_hash` is `None` for nodes whose searchable text is too short to
/// deduplicate on.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedNode {
    pub node: Node,
    pub content_hash: Option<String>,
}

impl PreparedNode {
    /// Identifier of this node's document in the vector store.
    ///
    /// Hashed nodes are content-addressed within an owner
    /// (`"{owner}:{hash}"`), so identical content arriving from two of the
    /// owner's sources lands on one document while other owners keep
    /// their own. Unhashed nodes use the node id.
    pub fn document_id(&self, owner: &str) -> String {
        match &self.content_hash {
            Some(hash) => format!("{}:{}", owner, hash),
            None => self.node.id.clone(),
        }
    }
}

/// An unprocessed item returned by a source adapter's delta fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Source-assigned reference (message id, page id, file path, ...).
    pub item_ref: String,
    /// When the item last changed upstream, if the source reports it.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Source-defined payload, interpreted only by the adapter's `transform`.
    pub payload: Value,
}

impl RawItem {
    pub fn new(item_ref: impl Into<String>, payload: Value) -> Self {
        Self {
            item_ref: item_ref.into(),
            updated_at: None,
            payload,
        }
    }

    pub fn updated(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}
