//! Per-cycle counters and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of failure records kept per cycle.
pub const MAX_FAILURE_RECORDS: usize = 50;

/// One item that failed during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub item_ref: String,
    pub message: String,
}

/// Counters for a single sync cycle.
///
/// `errors` keeps counting after the failure list is full; only the
/// records themselves are capped at [`MAX_FAILURE_RECORDS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub items_fetched: usize,
    pub created: usize,
    pub duplicates: usize,
    /// Items whose transform intentionally produced no nodes.
    pub skipped: usize,
    pub errors: usize,
    pub enrichment_failures: usize,
    pub failures: Vec<FailureRecord>,
}

impl CycleStats {
    pub fn record_failure(&mut self, item_ref: impl Into<String>, message: impl Into<String>) {
        self.errors += 1;
        if self.failures.len() < MAX_FAILURE_RECORDS {
            self.failures.push(FailureRecord {
                item_ref: item_ref.into(),
                message: message.into(),
            });
        }
    }

    /// Fraction of fetched items that failed, `0.0` for an empty cycle.
    pub fn failure_rate(&self) -> f64 {
        if self.items_fetched == 0 {
            0.0
        } else {
            self.errors as f64 / self.items_fetched as f64
        }
    }
}

/// The outcome of one completed cycle, as recorded by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingResult {
    pub source: String,
    pub owner: String,
    pub stats: CycleStats,
    /// `true` when no item failed.
    pub success: bool,
    pub cursor_saved: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IndexingResult {
    pub fn new(
        source: impl Into<String>,
        owner: impl Into<String>,
        stats: CycleStats,
        cursor_saved: bool,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let success = stats.errors == 0;
        Self {
            source: source.into(),
            owner: owner.into(),
            stats,
            success,
            cursor_saved,
            started_at,
            finished_at,
        }
    }
}
