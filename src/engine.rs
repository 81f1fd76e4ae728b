//! Per-source incremental sync loop.
//!
//! One [`SyncEngine`] runs per (source, owner). Each cycle:
//!
//! 1. loads the persisted cursor (first cycle only),
//! 2. asks the adapter for everything changed since it,
//! 3. runs transform → dedup → write for every item, `batch_size` at a time,
//! 4. hands the nodes written this cycle to the enrichment dispatcher,
//! 5. saves the advanced cursor if anything was created.
//!
//! Item failures are counted and retried next cycle. Cycle failures
//! (cursor load/save, fetch) trigger exponential backoff; after
//! `circuit_threshold` in a row the engine pauses until [`SyncEngine::reset`]
//! and a new [`SyncEngine::run`].
//!
//! ```text
//! Idle → Running → Sleeping ──────┐
//!          ▲  └──→ Backoff ──┬────┤
//!          └─────────────────┼────┘
//!                            └──→ Paused (threshold reached)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sync_harness_core::backoff::{BackoffPolicy, CircuitState, DEFAULT_CIRCUIT_THRESHOLD};
use sync_harness_core::cursor::Cursor;
use sync_harness_core::hash::ContentHasher;
use sync_harness_core::models::{Node, RawItem};
use sync_harness_core::stats::{CycleStats, IndexingResult};
use sync_harness_core::store::CursorStore;

use crate::adapter::{RegisteredSource, SourceAdapter};
use crate::config::Config;
use crate::dedup::{Deduplicator, StoreSet};
use crate::enrich::EnrichmentDispatcher;
use crate::error::{timed, CycleError, PipelineError};
use crate::health::{freshness_window, heartbeat_is_fresh, EngineHealth, HealthStatus};
use crate::writer::DualStoreWriter;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub sync_interval: Duration,
    pub batch_size: usize,
    pub enrichment_concurrency: usize,
    pub circuit_threshold: u32,
    pub backoff: BackoffPolicy,
    /// Deadline for every adapter, store, and enricher call.
    pub call_timeout: Duration,
    /// Warn when more than this fraction of a cycle's items fail.
    pub high_failure_ratio: f64,
    pub hasher: ContentHasher,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            batch_size: 10,
            enrichment_concurrency: 32,
            circuit_threshold: DEFAULT_CIRCUIT_THRESHOLD,
            backoff: BackoffPolicy::default(),
            call_timeout: Duration::from_secs(120),
            high_failure_ratio: 0.3,
            hasher: ContentHasher::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        let engine = &config.engine;
        Self {
            sync_interval: engine.sync_interval(),
            batch_size: engine.batch_size.max(1),
            enrichment_concurrency: engine.enrichment_concurrency.max(1),
            circuit_threshold: engine.circuit_threshold.max(1),
            backoff: engine.backoff(),
            call_timeout: engine.call_timeout(),
            high_failure_ratio: engine.high_failure_ratio,
            hasher: config.dedup.hasher(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Running,
    Sleeping,
    Backoff,
    Paused,
    Stopped,
}

/// Point-in-time view of an engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub source: String,
    pub owner: String,
    pub state: EngineState,
    pub circuit: CircuitState,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub cycles: u64,
    pub last_result: Option<IndexingResult>,
    pub last_error: Option<String>,
}

/// What one item contributed to the cycle.
#[derive(Debug, Default)]
struct ItemOutcome {
    indexed: Vec<Node>,
    created: usize,
    duplicates: usize,
    skipped: bool,
}

pub struct SyncEngine {
    adapter: Arc<dyn SourceAdapter>,
    source: String,
    owner: String,
    cursors: Arc<dyn CursorStore>,
    dedup: Deduplicator,
    writer: DualStoreWriter,
    enrichment: EnrichmentDispatcher,
    settings: EngineSettings,
    cursor: Mutex<Option<Cursor>>,
    status: RwLock<EngineStatus>,
    cancel: Mutex<CancellationToken>,
    running: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        source: RegisteredSource,
        stores: StoreSet,
        cursors: Arc<dyn CursorStore>,
        settings: EngineSettings,
    ) -> Self {
        let label = source.label();
        if stores.is_empty() {
            warn!(
                source = %label,
                "no target stores configured; nothing will be deduplicated and every cycle rewrites"
            );
        }

        let status = EngineStatus {
            source: label.clone(),
            owner: source.owner.clone(),
            state: EngineState::Idle,
            circuit: CircuitState::default(),
            last_heartbeat: None,
            cycles: 0,
            last_result: None,
            last_error: None,
        };

        Self {
            dedup: Deduplicator::new(stores.clone(), settings.hasher, settings.call_timeout),
            writer: DualStoreWriter::new(stores, settings.call_timeout),
            enrichment: EnrichmentDispatcher::new(
                settings.enrichment_concurrency,
                settings.call_timeout,
            ),
            adapter: source.adapter,
            source: label,
            owner: source.owner,
            cursors,
            settings,
            cursor: Mutex::new(None),
            status: RwLock::new(status),
            cancel: Mutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentDispatcher) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn status(&self) -> EngineStatus {
        self.status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn state(&self) -> EngineState {
        self.status().state
    }

    fn update_status(&self, f: impl FnOnce(&mut EngineStatus)) {
        let mut status = self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut status);
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn cached_cursor(&self) -> Option<Cursor> {
        self.cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn cache_cursor(&self, cursor: Cursor) {
        *self
            .cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(cursor);
    }

    pub fn health(&self, now: DateTime<Utc>) -> HealthStatus {
        let status = self.status();
        match status.state {
            EngineState::Idle => HealthStatus::Idle,
            EngineState::Paused => HealthStatus::Paused,
            EngineState::Stopped => HealthStatus::Stopped,
            EngineState::Running | EngineState::Sleeping | EngineState::Backoff => {
                let backoff = (status.state == EngineState::Backoff)
                    .then_some(status.circuit.current_backoff);
                let window = freshness_window(self.settings.sync_interval, backoff);
                if heartbeat_is_fresh(status.last_heartbeat, window, now) {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Stale
                }
            }
        }
    }

    pub fn health_report(&self, now: DateTime<Utc>) -> EngineHealth {
        let status = self.status();
        EngineHealth {
            source: status.source,
            owner: status.owner,
            status: self.health(now),
            last_heartbeat: status.last_heartbeat,
            consecutive_errors: status.circuit.consecutive_errors,
        }
    }

    /// Ask the loop to exit. Interrupts any sleep or backoff wait at once.
    pub fn stop(&self) {
        self.cancel_token().cancel();
    }

    /// Clear the circuit breaker after a pause or stop so `run()` can be
    /// called again. Has no effect on a running engine.
    pub fn reset(&self) {
        if self.running.load(Ordering::SeqCst) {
            warn!(source = %self.source, "reset ignored while engine is running");
            return;
        }
        {
            let mut token = self
                .cancel
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if token.is_cancelled() {
                *token = CancellationToken::new();
            }
        }
        self.update_status(|s| {
            s.circuit = CircuitState::default();
            s.state = EngineState::Idle;
            s.last_error = None;
        });
        info!(source = %self.source, owner = %self.owner, "engine reset");
    }

    /// Run cycles until stopped or paused.
    #[tracing::instrument(level = "info", skip_all, fields(source = %self.source, owner = %self.owner))]
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("engine is already running");
            return;
        }
        if self.state() == EngineState::Paused {
            warn!("engine is paused; call reset() before run()");
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        let cancel = self.cancel_token();
        info!("sync engine started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.run_cycle() => outcome,
            };

            let wait = match outcome {
                Ok(_) => {
                    self.update_status(|s| {
                        s.circuit.record_success();
                        s.state = EngineState::Sleeping;
                        s.last_error = None;
                    });
                    self.settings.sync_interval
                }
                Err(e) => {
                    let mut tripped = false;
                    let mut delay = Duration::ZERO;
                    let threshold = self.settings.circuit_threshold;
                    let policy = self.settings.backoff;
                    self.update_status(|s| {
                        delay = s.circuit.record_failure(&policy);
                        s.last_error = Some(e.to_string());
                        tripped = s.circuit.is_tripped(threshold);
                        s.state = if tripped {
                            EngineState::Paused
                        } else {
                            EngineState::Backoff
                        };
                    });

                    if tripped {
                        error!(
                            error = %e,
                            threshold,
                            "circuit breaker tripped; engine paused until reset"
                        );
                        self.running.store(false, Ordering::SeqCst);
                        return;
                    }
                    warn!(error = %e, backoff_secs = delay.as_secs(), "sync cycle failed; backing off");
                    delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.update_status(|s| s.state = EngineState::Stopped);
        self.running.store(false, Ordering::SeqCst);
        info!("sync engine stopped");
    }

    /// One fetch → index → checkpoint pass.
    #[tracing::instrument(level = "debug", skip_all, fields(source = %self.source, owner = %self.owner))]
    pub async fn run_cycle(&self) -> Result<IndexingResult, CycleError> {
        let started_at = Utc::now();
        self.update_status(|s| {
            s.last_heartbeat = Some(started_at);
            s.state = EngineState::Running;
            s.cycles += 1;
        });

        let cursor = self.load_cursor().await?;
        let timeout = self.settings.call_timeout;

        let items = timed("adapter.fetch_delta", timeout, self.adapter.fetch_delta(&cursor))
            .await?
            .map_err(CycleError::Fetch)?;

        let mut stats = CycleStats {
            items_fetched: items.len(),
            ..CycleStats::default()
        };

        if items.is_empty() {
            debug!("nothing changed upstream");
            return Ok(self.finish(stats, false, started_at));
        }

        let mut completed: Vec<&RawItem> = Vec::with_capacity(items.len());
        let mut failed: Vec<&RawItem> = Vec::new();
        let mut indexed: Vec<Node> = Vec::new();

        for batch in items.chunks(self.settings.batch_size) {
            let results = join_all(batch.iter().map(|item| self.process_item(item))).await;
            for (item, result) in batch.iter().zip(results) {
                match result {
                    Ok(outcome) => {
                        stats.created += outcome.created;
                        stats.duplicates += outcome.duplicates;
                        if outcome.skipped {
                            stats.skipped += 1;
                        }
                        indexed.extend(outcome.indexed);
                        completed.push(item);
                    }
                    Err(e) => {
                        warn!(item_ref = %item.item_ref, error = %e, "item failed");
                        stats.record_failure(&item.item_ref, e.to_string());
                        failed.push(item);
                    }
                }
            }
        }

        let report = self.enrichment.dispatch(&indexed).await;
        stats.enrichment_failures = report.failed;

        if stats.errors as f64 > self.settings.high_failure_ratio * items.len() as f64 {
            warn!(
                errors = stats.errors,
                items = items.len(),
                "high item failure rate this cycle"
            );
        }

        let mut cursor_saved = false;
        if stats.created > 0 {
            let advanced = cursor.advanced(self.adapter.cursor_mode(), &completed, &failed);
            let processed = completed.len() as u64;
            timed(
                "cursor.save",
                timeout,
                self.cursors.save(&self.source, &self.owner, &advanced, processed),
            )
            .await?
            .map_err(CycleError::Cursor)?;

            let mut cached = advanced;
            cached.items_processed += processed;
            cached.saved_at = Some(Utc::now());
            self.cache_cursor(cached);
            cursor_saved = true;
        }

        Ok(self.finish(stats, cursor_saved, started_at))
    }

    async fn load_cursor(&self) -> Result<Cursor, CycleError> {
        if let Some(cursor) = self.cached_cursor() {
            return Ok(cursor);
        }
        let loaded = timed(
            "cursor.load",
            self.settings.call_timeout,
            self.cursors.load(&self.source, &self.owner),
        )
        .await?
        .map_err(CycleError::Cursor)?;
        let cursor = loaded.unwrap_or_else(|| Cursor::new(&self.source, &self.owner));
        self.cache_cursor(cursor.clone());
        Ok(cursor)
    }

    async fn process_item(&self, item: &RawItem) -> Result<ItemOutcome, PipelineError> {
        let nodes = timed(
            "adapter.transform",
            self.settings.call_timeout,
            self.adapter.transform(item),
        )
        .await?
        .map_err(PipelineError::Transform)?;

        if nodes.is_empty() {
            return Ok(ItemOutcome {
                skipped: true,
                ..ItemOutcome::default()
            });
        }

        let prepared = self.dedup.prepare(nodes);
        let outcome = self.dedup.filter_new(&self.owner, prepared).await;
        let created = self.writer.write(&self.owner, &outcome.fresh).await?;

        Ok(ItemOutcome {
            indexed: outcome.fresh.into_iter().map(|p| p.node).collect(),
            created,
            duplicates: outcome.duplicates,
            skipped: false,
        })
    }

    fn finish(&self, stats: CycleStats, cursor_saved: bool, started_at: DateTime<Utc>) -> IndexingResult {
        let result = IndexingResult::new(
            &self.source,
            &self.owner,
            stats,
            cursor_saved,
            started_at,
            Utc::now(),
        );
        info!(
            fetched = result.stats.items_fetched,
            created = result.stats.created,
            duplicates = result.stats.duplicates,
            skipped = result.stats.skipped,
            errors = result.stats.errors,
            enrichment_failures = result.stats.enrichment_failures,
            cursor_saved,
            "sync cycle complete"
        );
        self.update_status(|s| s.last_result = Some(result.clone()));
        result
    }
}
