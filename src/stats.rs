//! `synx status` and `synx verify`.
//!
//! A quick overview of what is indexed: cursor progress per source, store
//! counts, and how many nodes sit in only one of the two stores.

use anyhow::Result;

use crate::config::Config;
use crate::dedup::{Deduplicator, IndexKey};
use crate::runtime::Runtime;

pub async fn run_status(config: &Config) -> Result<()> {
    let runtime = Runtime::open(config).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Sync Harness Status");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Stores:      {}", runtime.store_set().describe());
    println!();

    if let Some(graph) = &runtime.graph {
        println!("  Graph nodes: {}", graph.count_nodes().await?);
        println!("  Graph edges: {}", graph.count_edges().await?);
    }
    if let Some(vector) = &runtime.vector {
        let docs = vector.count_documents().await?;
        let embedded = vector.count_embedded().await?;
        println!("  Vector docs: {}", docs);
        println!(
            "  Embedded:    {} / {} ({}%)",
            embedded,
            docs,
            if docs > 0 { (embedded * 100) / docs } else { 0 }
        );
    }

    let partial = partial_entries(&runtime, config).await?;
    println!("  Partially indexed: {}", partial.len());

    let cursors = runtime.cursors.list().await?;
    if !cursors.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<28} {:<10} {:>10}   {}",
            "SOURCE", "OWNER", "PROCESSED", "LAST SAVE"
        );
        println!("  {}", "-".repeat(70));
        for cursor in &cursors {
            let saved = cursor
                .saved_at
                .map(|at| format_ts_relative(at.timestamp()))
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<28} {:<10} {:>10}   {}",
                cursor.source, cursor.owner, cursor.items_processed, saved
            );
        }
    }
    println!();

    runtime.close().await;
    Ok(())
}

/// List every node present in exactly one store.
pub async fn run_verify(config: &Config) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let partial = partial_entries(&runtime, config).await?;

    if partial.is_empty() {
        println!("All nodes are present in every configured store.");
    } else {
        println!("{:<48} {:<6} VECTOR", "NODE", "GRAPH");
        for entry in &partial {
            println!(
                "{:<48} {:<6} {}",
                entry.node_id, entry.in_graph, entry.in_vector
            );
        }
        println!();
        println!(
            "{} node(s) partially indexed; the next sync of their source rewrites them.",
            partial.len()
        );
    }

    runtime.close().await;
    Ok(())
}

async fn partial_entries(
    runtime: &Runtime,
    config: &Config,
) -> Result<Vec<crate::dedup::PartialEntry>> {
    let (Some(graph), Some(vector)) = (&runtime.graph, &runtime.vector) else {
        return Ok(Vec::new());
    };

    let mut keys: Vec<IndexKey> = graph.index_keys().await?;
    keys.extend(vector.index_keys().await?);

    let dedup = Deduplicator::new(
        runtime.store_set(),
        config.dedup.hasher(),
        runtime.settings.call_timeout,
    );
    dedup.partial_entries(&keys).await
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" style rendering of a Unix timestamp.
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
