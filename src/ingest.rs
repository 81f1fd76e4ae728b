//! `synx sync` and `synx run`.

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::info;

use sync_harness_core::stats::IndexingResult;

use crate::adapter::AdapterRegistry;
use crate::config::Config;
use crate::engine::SyncEngine;
use crate::enrich::EnrichmentDispatcher;
use crate::runtime::Runtime;
use crate::supervisor::Supervisor;

/// Sync one source. With `once`, run a single cycle and print its result;
/// otherwise loop until Ctrl-C.
pub async fn run_sync(config: &Config, source: &str, once: bool) -> Result<()> {
    let registry = AdapterRegistry::from_config(config)?;
    let Some(registered) = registry.find(source).cloned() else {
        let known: Vec<String> = registry.sources().iter().map(|s| s.label()).collect();
        bail!(
            "Unknown source: '{}'. Configured: {}",
            source,
            if known.is_empty() {
                "(none)".to_string()
            } else {
                known.join(", ")
            }
        );
    };

    let runtime = Runtime::open(config).await?;
    let engine = SyncEngine::new(
        registered,
        runtime.store_set(),
        runtime.cursor_store(),
        runtime.settings.clone(),
    );

    if once {
        let result = engine.run_cycle().await?;
        print_result(&result);
    } else {
        let engine = std::sync::Arc::new(engine);
        let runner = engine.clone();
        let task = tokio::spawn(async move { runner.run().await });
        tokio::signal::ctrl_c().await?;
        info!("interrupt received; stopping");
        engine.stop();
        task.await?;
        if let Some(result) = engine.status().last_result {
            print_result(&result);
        }
    }

    runtime.close().await;
    Ok(())
}

/// Run every configured source until Ctrl-C.
pub async fn run_all(config: &Config) -> Result<()> {
    let registry = AdapterRegistry::from_config(config)?;
    if registry.is_empty() {
        bail!("No sources configured. Add a [sources.notes.<name>] section.");
    }

    let runtime = Runtime::open(config).await?;
    let enrichment = EnrichmentDispatcher::new(
        runtime.settings.enrichment_concurrency,
        runtime.settings.call_timeout,
    );
    let mut supervisor = Supervisor::from_registry(
        &registry,
        runtime.store_set(),
        runtime.cursor_store(),
        runtime.settings.clone(),
        &enrichment,
    );
    supervisor.start();
    println!("Running {} source(s). Press Ctrl-C to stop.", registry.len());

    tokio::signal::ctrl_c().await?;
    info!("interrupt received; stopping all engines");

    for health in supervisor.health() {
        println!(
            "  {:<28} {:<10} {:>6} consecutive errors",
            health.source,
            health.status.as_str(),
            health.consecutive_errors
        );
    }
    supervisor.shutdown().await;
    runtime.close().await;
    Ok(())
}

pub fn print_result(result: &IndexingResult) {
    let elapsed = result
        .finished_at
        .signed_duration_since(result.started_at)
        .num_milliseconds();
    println!("sync {} (owner {})", result.source, result.owner);
    println!("  fetched:      {}", result.stats.items_fetched);
    println!("  created:      {}", result.stats.created);
    println!("  duplicates:   {}", result.stats.duplicates);
    println!("  skipped:      {}", result.stats.skipped);
    println!("  errors:       {}", result.stats.errors);
    if result.stats.enrichment_failures > 0 {
        println!("  enrichment failures: {}", result.stats.enrichment_failures);
    }
    println!(
        "  cursor:       {}",
        if result.cursor_saved { "saved" } else { "unchanged" }
    );
    for failure in &result.stats.failures {
        println!("    ! {}: {}", failure.item_ref, failure.message);
    }
    println!(
        "  {} in {} ms ({})",
        if result.success { "ok" } else { "completed with errors" },
        elapsed,
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
}
