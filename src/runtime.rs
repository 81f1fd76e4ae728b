//! Wiring from configuration to live stores.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use sync_harness_core::store::{CursorStore, GraphStore, VectorStore};

use crate::config::Config;
use crate::db;
use crate::dedup::StoreSet;
use crate::embedding::create_provider;
use crate::engine::EngineSettings;
use crate::sqlite_store::{SqliteCursorStore, SqliteGraphStore, SqliteVectorStore};

/// The SQLite-backed stores a CLI command works against.
///
/// `graph` and `vector` are `None` when disabled under `[stores]`.
pub struct Runtime {
    pub pool: SqlitePool,
    pub graph: Option<Arc<SqliteGraphStore>>,
    pub vector: Option<Arc<SqliteVectorStore>>,
    pub cursors: Arc<SqliteCursorStore>,
    pub settings: EngineSettings,
}

impl Runtime {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;

        let graph = config
            .stores
            .graph
            .then(|| Arc::new(SqliteGraphStore::new(pool.clone())));

        let vector = if config.stores.vector {
            let provider = Arc::from(create_provider(&config.embedding)?);
            Some(Arc::new(SqliteVectorStore::new(pool.clone(), provider)))
        } else {
            None
        };

        Ok(Self {
            cursors: Arc::new(SqliteCursorStore::new(pool.clone())),
            pool,
            graph,
            vector,
            settings: EngineSettings::from_config(config),
        })
    }

    pub fn store_set(&self) -> StoreSet {
        StoreSet {
            graph: self.graph.clone().map(|g| g as Arc<dyn GraphStore>),
            vector: self.vector.clone().map(|v| v as Arc<dyn VectorStore>),
        }
    }

    pub fn cursor_store(&self) -> Arc<dyn CursorStore> {
        self.cursors.clone()
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
