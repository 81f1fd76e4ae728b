use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            node_type TEXT NOT NULL,
            attributes_json TEXT NOT NULL DEFAULT '{}',
            searchable_text TEXT,
            content_hash TEXT,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_edges (
            from_id TEXT NOT NULL,
            to_id TEXT NOT NULL,
            relation_type TEXT NOT NULL,
            properties_json TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (from_id, to_id, relation_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_documents (
            id TEXT PRIMARY KEY,
            node_id TEXT NOT NULL,
            owner TEXT NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            content_hash TEXT,
            model TEXT,
            dims INTEGER,
            embedding BLOB,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_cursors (
            source TEXT NOT NULL,
            owner TEXT NOT NULL,
            marker_json TEXT NOT NULL,
            items_processed INTEGER NOT NULL DEFAULT 0,
            saved_at INTEGER NOT NULL,
            PRIMARY KEY (source, owner)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_graph_nodes_owner_hash ON graph_nodes(owner, content_hash)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_graph_edges_to ON graph_edges(to_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vector_documents_node ON vector_documents(node_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
