//! SQLite reference stores against a real database file.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::TempDir;

use sync_harness::config::Config;
use sync_harness::db;
use sync_harness::dedup::{Deduplicator, StoreSet};
use sync_harness::embedding::{blob_to_vec, DisabledProvider, HashingProvider};
use sync_harness::migrate::migrate_pool;
use sync_harness::sqlite_store::{SqliteCursorStore, SqliteGraphStore, SqliteVectorStore};
use sync_harness_core::cursor::{Cursor, CursorMarker};
use sync_harness_core::hash::ContentHasher;
use sync_harness_core::models::{Node, PreparedNode};
use sync_harness_core::store::{CursorStore, GraphStore, VectorDocument, VectorStore};

const TEXT: &str =
    "Incident review: the nightly export overlapped with the cursor checkpoint and stalled writes.";

async fn open() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("data").join("synx.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate_pool(&pool).await.unwrap();
    (tmp, pool)
}

fn prepared(id: &str, text: &str) -> PreparedNode {
    ContentHasher::default().prepare(
        Node::new(id, "document")
            .with_attribute("title", "Incident review")
            .with_text(text)
            .with_edge("person:ops-lead", "authored_by"),
    )
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (_tmp, pool) = open().await;
    migrate_pool(&pool).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        tables,
        vec!["graph_edges", "graph_nodes", "sync_cursors", "vector_documents"]
    );
}

#[tokio::test]
async fn graph_upserts_nodes_and_edges() {
    let (_tmp, pool) = open().await;
    let graph = SqliteGraphStore::new(pool);
    let node = prepared("doc:1", TEXT);
    let edges = node.node.edges.clone();
    let hash = node.content_hash.clone().unwrap();

    graph.write_batch("alice", &[node.clone()], &edges).await.unwrap();
    graph.write_batch("alice", &[node], &edges).await.unwrap();

    assert_eq!(graph.count_nodes().await.unwrap(), 1);
    assert_eq!(graph.count_edges().await.unwrap(), 1);
    assert!(graph.exists_by_content_hash(&hash, "alice").await.unwrap());
    assert!(!graph.exists_by_content_hash(&hash, "bob").await.unwrap());

    let found = graph
        .batch_exists(&["doc:1".to_string(), "doc:2".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found["doc:1"], true);
    assert_eq!(found["doc:2"], false);
}

#[tokio::test]
async fn vector_documents_are_content_addressed() {
    let (_tmp, pool) = open().await;
    let vector = SqliteVectorStore::new(pool, Arc::new(DisabledProvider));

    let a = VectorDocument::from_prepared("alice", &prepared("mail:1", TEXT));
    let b = VectorDocument::from_prepared("alice", &prepared("chat:7", TEXT));
    assert_eq!(a.id, b.id);

    vector.upsert_batch(&[a.clone()]).await.unwrap();
    vector.upsert_batch(&[b]).await.unwrap();

    assert_eq!(vector.count_documents().await.unwrap(), 1);
    assert_eq!(vector.count_embedded().await.unwrap(), 0);
    assert!(vector.document_exists(&a.id).await.unwrap());
    assert!(!vector.document_exists("mail:1").await.unwrap());
}

#[tokio::test]
async fn edited_node_replaces_its_vector_document() {
    let (_tmp, pool) = open().await;
    let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
    let vector = Arc::new(SqliteVectorStore::new(pool, Arc::new(DisabledProvider)));

    let before = prepared("doc:1", TEXT);
    let after = prepared(
        "doc:1",
        "Incident review (revised): the export now runs after the checkpoint, writes no longer stall.",
    );
    for node in [&before, &after] {
        graph.write_batch("alice", &[node.clone()], &[]).await.unwrap();
        vector
            .upsert_batch(&[VectorDocument::from_prepared("alice", node)])
            .await
            .unwrap();
    }

    assert_eq!(vector.count_documents().await.unwrap(), 1);
    assert!(!vector.document_exists(&before.document_id("alice")).await.unwrap());
    assert!(vector.document_exists(&after.document_id("alice")).await.unwrap());

    let keys = graph.index_keys().await.unwrap();
    assert_eq!(keys[0].document_id, after.document_id("alice"));
    let dedup = Deduplicator::new(
        StoreSet::new(graph.clone(), vector.clone()),
        ContentHasher::default(),
        Duration::from_secs(5),
    );
    let mut all_keys = keys;
    all_keys.extend(vector.index_keys().await.unwrap());
    assert!(dedup.partial_entries(&all_keys).await.unwrap().is_empty());
}

#[tokio::test]
async fn owners_keep_separate_vector_documents() {
    let (_tmp, pool) = open().await;
    let vector = SqliteVectorStore::new(pool.clone(), Arc::new(DisabledProvider));

    let alice = VectorDocument::from_prepared("alice", &prepared("mail:1", TEXT));
    let bob = VectorDocument::from_prepared("bob", &prepared("chat:9", TEXT));
    assert_ne!(alice.id, bob.id);
    vector.upsert_batch(&[alice.clone()]).await.unwrap();
    vector.upsert_batch(&[bob.clone()]).await.unwrap();

    assert_eq!(vector.count_documents().await.unwrap(), 2);
    let (owner, node_id): (String, String) =
        sqlx::query_as("SELECT owner, node_id FROM vector_documents WHERE id = ?")
            .bind(&alice.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(owner, "alice");
    assert_eq!(node_id, "mail:1");
}

#[tokio::test]
async fn hashing_provider_stores_vectors() {
    let (_tmp, pool) = open().await;
    let provider = Arc::new(HashingProvider::new(64).unwrap());
    let vector = SqliteVectorStore::new(pool.clone(), provider.clone());

    let doc = VectorDocument::from_prepared("alice", &prepared("doc:1", TEXT));
    vector.upsert_batch(&[doc.clone()]).await.unwrap();
    assert_eq!(vector.count_embedded().await.unwrap(), 1);

    let (model, dims, blob): (String, i64, Vec<u8>) = sqlx::query_as(
        "SELECT model, dims, embedding FROM vector_documents WHERE id = ?",
    )
    .bind(&doc.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(model, "feature-hash");
    assert_eq!(dims, 64);
    assert_eq!(blob_to_vec(&blob), provider.embed_one(&doc.text));
}

#[tokio::test]
async fn cursor_counter_accumulates_across_saves() {
    let (_tmp, pool) = open().await;
    let cursors = SqliteCursorStore::new(pool);
    assert!(cursors.load("notes:docs", "alice").await.unwrap().is_none());

    let mut cursor = Cursor::new("notes:docs", "alice");
    cursor.marker = CursorMarker::Watermark(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    cursors.save("notes:docs", "alice", &cursor, 4).await.unwrap();

    cursor.marker = CursorMarker::Watermark(Utc.timestamp_opt(1_700_000_600, 0).unwrap());
    cursors.save("notes:docs", "alice", &cursor, 3).await.unwrap();

    let loaded = cursors.load("notes:docs", "alice").await.unwrap().unwrap();
    assert_eq!(loaded.items_processed, 7);
    assert_eq!(loaded.marker, cursor.marker);
    assert!(loaded.saved_at.is_some());

    cursors.save("notes:docs", "bob", &Cursor::new("notes:docs", "bob"), 1).await.unwrap();
    let all = cursors.list().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].owner, "alice");
}

#[tokio::test]
async fn partial_entries_finds_half_written_nodes() {
    let (_tmp, pool) = open().await;
    let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
    let vector = Arc::new(SqliteVectorStore::new(pool, Arc::new(DisabledProvider)));

    let complete = prepared("doc:complete", TEXT);
    let graph_only = prepared(
        "doc:graph-only",
        "Runbook: restart the worker pool, then replay the dead-letter queue from the last cursor.",
    );
    let short = ContentHasher::default().prepare(Node::new("person:bob", "person").with_text("Bob"));

    graph
        .write_batch("alice", &[complete.clone(), graph_only.clone(), short.clone()], &[])
        .await
        .unwrap();
    vector
        .upsert_batch(&[
            VectorDocument::from_prepared("alice", &complete),
            VectorDocument::from_prepared("alice", &short),
        ])
        .await
        .unwrap();

    let keys = graph.index_keys().await.unwrap();
    assert_eq!(keys.len(), 3);
    let short_key = keys.iter().find(|k| k.node_id == "person:bob").unwrap();
    assert_eq!(short_key.document_id, "person:bob");

    let dedup = Deduplicator::new(
        StoreSet::new(graph.clone(), vector.clone()),
        ContentHasher::default(),
        Duration::from_secs(5),
    );
    let mut all_keys = keys;
    all_keys.extend(vector.index_keys().await.unwrap());
    let partial = dedup.partial_entries(&all_keys).await.unwrap();

    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].node_id, "doc:graph-only");
    assert!(partial[0].in_graph);
    assert!(!partial[0].in_vector);

    assert!(dedup.is_indexed("alice", &complete).await);
    assert!(!dedup.is_indexed("alice", &graph_only).await);
    assert!(!dedup.is_indexed("alice", &short).await);
}

#[tokio::test]
async fn attributes_round_trip_as_json() {
    let (_tmp, pool) = open().await;
    let graph = SqliteGraphStore::new(pool.clone());
    let node = ContentHasher::default().prepare(
        Node::new("event:standup", "event")
            .with_attribute("attendees", json!(["alice", "bob"]))
            .with_attribute("duration_min", 15),
    );
    graph.write_batch("alice", &[node], &[]).await.unwrap();

    let (attributes, hash): (String, Option<String>) =
        sqlx::query_as("SELECT attributes_json, content_hash FROM graph_nodes WHERE id = ?")
            .bind("event:standup")
            .fetch_one(&pool)
            .await
            .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&attributes).unwrap();
    assert_eq!(parsed["attendees"][1], "bob");
    assert_eq!(parsed["duration_min"], 15);
    assert!(hash.is_none());
}
