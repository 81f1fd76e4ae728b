//! Source adapter trait and the registry of configured sources.
//!
//! An adapter knows how to ask one upstream system "what changed since
//! this cursor" and how to turn one returned item into graph nodes. It
//! knows nothing about stores, dedup, or scheduling; the
//! [`SyncEngine`](crate::engine::SyncEngine) owns all of that.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             AdapterRegistry              │
//! │  ┌──────────────┐  ┌──────────────────┐  │
//! │  │ Built-in     │  │ Custom (Rust)    │  │
//! │  │ notes:<name> │  │ register(...)    │  │
//! │  └──────────────┘  └──────────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     Supervisor → one SyncEngine per source
//! ```

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use sync_harness_core::cursor::{Cursor, CursorMode};
use sync_harness_core::models::{Node, RawItem};

use crate::config::Config;

/// One upstream source.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use sync_harness::adapter::SourceAdapter;
/// use sync_harness_core::cursor::Cursor;
/// use sync_harness_core::models::{Node, RawItem};
///
/// struct Calendar;
///
/// #[async_trait]
/// impl SourceAdapter for Calendar {
///     fn name(&self) -> &str { "work" }
///     fn kind(&self) -> &str { "calendar" }
///
///     async fn fetch_delta(&self, _cursor: &Cursor) -> Result<Vec<RawItem>> {
///         Ok(vec![])
///     }
///
///     async fn transform(&self, item: &RawItem) -> Result<Vec<Node>> {
///         Ok(vec![Node::new(format!("calendar:{}", item.item_ref), "event")])
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Instance name (e.g. `"journal"`).
    fn name(&self) -> &str;

    /// Adapter kind (e.g. `"notes"`). Custom adapters default to `"custom"`.
    fn kind(&self) -> &str {
        "custom"
    }

    /// `"{kind}:{name}"`, the key cursors are stored under.
    fn source_label(&self) -> String {
        format!("{}:{}", self.kind(), self.name())
    }

    fn cursor_mode(&self) -> CursorMode {
        CursorMode::Watermark
    }

    /// Items changed since `cursor`. Must return an empty vec, not an
    /// error, when nothing changed.
    async fn fetch_delta(&self, cursor: &Cursor) -> Result<Vec<RawItem>>;

    /// Turn one item into zero or more nodes. An empty vec skips the item.
    async fn transform(&self, item: &RawItem) -> Result<Vec<Node>>;
}

/// An adapter bound to the owner whose data it syncs.
#[derive(Clone)]
pub struct RegisteredSource {
    pub owner: String,
    pub adapter: Arc<dyn SourceAdapter>,
}

impl RegisteredSource {
    pub fn label(&self) -> String {
        self.adapter.source_label()
    }
}

pub struct AdapterRegistry {
    sources: Vec<RegisteredSource>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// A registry holding every built-in source instance in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::adapter_notes::NotesAdapter;

        let mut registry = Self::new();
        for (name, cfg) in &config.sources.notes {
            registry.register(
                cfg.owner.clone(),
                Arc::new(NotesAdapter::new(name.clone(), cfg.clone())?),
            );
        }
        Ok(registry)
    }

    pub fn register(&mut self, owner: impl Into<String>, adapter: Arc<dyn SourceAdapter>) {
        self.sources.push(RegisteredSource {
            owner: owner.into(),
            adapter,
        });
    }

    pub fn sources(&self) -> &[RegisteredSource] {
        &self.sources
    }

    /// Look up a source by its `"{kind}:{name}"` label.
    pub fn find(&self, label: &str) -> Option<&RegisteredSource> {
        self.sources.iter().find(|s| s.label() == label)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        async fn fetch_delta(&self, _cursor: &Cursor) -> Result<Vec<RawItem>> {
            Ok(vec![])
        }
        async fn transform(&self, _item: &RawItem) -> Result<Vec<Node>> {
            Ok(vec![])
        }
    }

    #[test]
    fn finds_by_label() {
        let mut registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        registry.register("alice", Arc::new(Fixed("inbox")));
        registry.register("bob", Arc::new(Fixed("wiki")));

        assert_eq!(registry.len(), 2);
        let found = registry.find("custom:wiki").unwrap();
        assert_eq!(found.owner, "bob");
        assert!(registry.find("notes:wiki").is_none());
    }

    #[test]
    fn from_config_builds_notes_sources() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::minimal(dir.path().join("db.sqlite"));
        config.sources.notes.insert(
            "journal".to_string(),
            crate::config::NotesSourceConfig {
                owner: "alice".to_string(),
                root: dir.path().to_path_buf(),
                include_globs: vec!["**/*.md".to_string()],
                exclude_globs: vec![],
                follow_symlinks: false,
            },
        );
        let registry = AdapterRegistry::from_config(&config).unwrap();
        let journal = registry.find("notes:journal").unwrap();
        assert_eq!(journal.owner, "alice");
        assert_eq!(journal.adapter.cursor_mode(), CursorMode::PerItem);
    }
}
