//! SQLite-backed reference stores.
//!
//! All three stores share one pool (see [`crate::db::connect`]) and the
//! tables created by [`crate::migrate`]. Writes are upserts, so several
//! source engines can write concurrently without coordinating.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use sync_harness_core::cursor::{Cursor, CursorMarker};
use sync_harness_core::models::{Edge, PreparedNode};
use sync_harness_core::store::{CursorStore, GraphStore, VectorDocument, VectorStore};

use crate::dedup::IndexKey;
use crate::embedding::{vec_to_blob, EmbeddingProvider};

/// SQLite caps bound parameters per statement; stay well below it.
const MAX_IDS_PER_QUERY: usize = 500;

async fn present_ids(pool: &SqlitePool, table: &str, ids: &[String]) -> Result<HashMap<String, bool>> {
    let mut found: HashMap<String, bool> = ids.iter().map(|id| (id.clone(), false)).collect();
    for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT id FROM {} WHERE id IN (", table));
        let mut separated = query.separated(", ");
        for id in chunk {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(pool).await?;
        for row in rows {
            let id: String = row.get("id");
            found.insert(id, true);
        }
    }
    Ok(found)
}

pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count_nodes(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM graph_nodes")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn count_edges(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM graph_edges")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn index_keys(&self) -> Result<Vec<IndexKey>> {
        let rows = sqlx::query(
            "SELECT id, COALESCE(owner || ':' || content_hash, id) AS document_id FROM graph_nodes ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| IndexKey {
                node_id: row.get("id"),
                document_id: row.get("document_id"),
            })
            .collect())
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn exists_by_content_hash(&self, hash: &str, owner: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM graph_nodes WHERE owner = ? AND content_hash = ?",
        )
        .bind(owner)
        .bind(hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn write_batch(&self, owner: &str, nodes: &[PreparedNode], edges: &[Edge]) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for prepared in nodes {
            let node = &prepared.node;
            let attributes = serde_json::to_string(&node.attributes)?;
            sqlx::query(
                r#"
                INSERT INTO graph_nodes (id, owner, node_type, attributes_json, searchable_text, content_hash, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    owner = excluded.owner,
                    node_type = excluded.node_type,
                    attributes_json = excluded.attributes_json,
                    searchable_text = excluded.searchable_text,
                    content_hash = excluded.content_hash,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&node.id)
            .bind(owner)
            .bind(&node.node_type)
            .bind(&attributes)
            .bind(&node.searchable_text)
            .bind(&prepared.content_hash)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("upsert node {}", node.id))?;
        }

        for edge in edges {
            let properties = serde_json::to_string(&edge.properties)?;
            sqlx::query(
                r#"
                INSERT INTO graph_edges (from_id, to_id, relation_type, properties_json)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(from_id, to_id, relation_type) DO UPDATE SET
                    properties_json = excluded.properties_json
                "#,
            )
            .bind(&edge.from_id)
            .bind(&edge.to_id)
            .bind(&edge.relation_type)
            .bind(&properties)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn batch_exists(&self, ids: &[String]) -> Result<HashMap<String, bool>> {
        present_ids(&self.pool, "graph_nodes", ids).await
    }
}

/// Vector store over `vector_documents`. Vectors are computed by the
/// configured provider at write time; with the disabled provider the
/// documents are stored without them.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { pool, provider }
    }

    pub async fn count_documents(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM vector_documents")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn count_embedded(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM vector_documents WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn index_keys(&self) -> Result<Vec<IndexKey>> {
        let rows = sqlx::query("SELECT id, node_id FROM vector_documents ORDER BY node_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| IndexKey {
                node_id: row.get("node_id"),
                document_id: row.get("id"),
            })
            .collect())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn document_exists(&self, id: &str) -> Result<bool> {
        let found: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM vector_documents WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(found)
    }

    async fn batch_document_exists(&self, ids: &[String]) -> Result<HashMap<String, bool>> {
        present_ids(&self.pool, "vector_documents", ids).await
    }

    async fn upsert_batch(&self, docs: &[VectorDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let vectors: Vec<Option<Vec<f32>>> = if self.provider.is_enabled() {
            let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
            let vectors = self
                .provider
                .embed(&texts)
                .await
                .context("embedding vector documents")?;
            vectors.into_iter().map(Some).collect()
        } else {
            vec![None; docs.len()]
        };

        let (model, dims) = if self.provider.is_enabled() {
            (
                Some(self.provider.model_name().to_string()),
                Some(self.provider.dims() as i64),
            )
        } else {
            (None, None)
        };

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for (doc, vector) in docs.iter().zip(vectors) {
            // A node keeps one document; drop the one its previous text produced.
            sqlx::query("DELETE FROM vector_documents WHERE node_id = ? AND id <> ?")
                .bind(&doc.node_id)
                .bind(&doc.id)
                .execute(&mut *tx)
                .await?;

            let metadata = serde_json::to_string(&doc.metadata)?;
            let blob = vector.as_deref().map(vec_to_blob);
            sqlx::query(
                r#"
                INSERT INTO vector_documents (id, node_id, owner, text, metadata_json, content_hash, model, dims, embedding, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    node_id = excluded.node_id,
                    owner = excluded.owner,
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    content_hash = excluded.content_hash,
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.node_id)
            .bind(&doc.owner)
            .bind(&doc.text)
            .bind(&metadata)
            .bind(&doc.content_hash)
            .bind(&model)
            .bind(dims)
            .bind(blob)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("upsert vector document {}", doc.id))?;
        }
        tx.commit().await?;
        Ok(())
    }
}

pub struct SqliteCursorStore {
    pool: SqlitePool,
}

impl SqliteCursorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every persisted cursor, ordered by source then owner.
    pub async fn list(&self) -> Result<Vec<Cursor>> {
        let rows = sqlx::query(
            "SELECT source, owner, marker_json, items_processed, saved_at FROM sync_cursors ORDER BY source, owner",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|row| cursor_from_row(&row)).collect()
    }
}

fn cursor_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Cursor> {
    let source: String = row.get("source");
    let marker_json: String = row.get("marker_json");
    let marker: CursorMarker = serde_json::from_str(&marker_json)
        .with_context(|| format!("corrupt cursor marker for source {}", source))?;
    let items_processed: i64 = row.get("items_processed");
    let saved_at: i64 = row.get("saved_at");
    Ok(Cursor {
        source,
        owner: row.get("owner"),
        marker,
        items_processed: items_processed.max(0) as u64,
        saved_at: Utc.timestamp_opt(saved_at, 0).single(),
    })
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn load(&self, source: &str, owner: &str) -> Result<Option<Cursor>> {
        let row = sqlx::query(
            "SELECT source, owner, marker_json, items_processed, saved_at FROM sync_cursors WHERE source = ? AND owner = ?",
        )
        .bind(source)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| cursor_from_row(&r)).transpose()
    }

    async fn save(
        &self,
        source: &str,
        owner: &str,
        cursor: &Cursor,
        items_processed: u64,
    ) -> Result<()> {
        let marker_json = serde_json::to_string(&cursor.marker)?;
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (source, owner, marker_json, items_processed, saved_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source, owner) DO UPDATE SET
                marker_json = excluded.marker_json,
                items_processed = sync_cursors.items_processed + excluded.items_processed,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(source)
        .bind(owner)
        .bind(&marker_json)
        .bind(items_processed as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
