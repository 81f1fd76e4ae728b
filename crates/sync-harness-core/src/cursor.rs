//! Per-source synchronization checkpoints.
//!
//! A [`Cursor`] is keyed by (source, owner) and records how far an
//! adapter's delta fetch has progressed. The marker is opaque to the
//! engine beyond the two shapes it knows how to advance:
//!
//! - [`CursorMarker::Watermark`]: a single "changed since" timestamp.
//! - [`CursorMarker::Items`]: a map of item reference → update marker, for
//!   sources that can only tell which items changed, not when.
//!
//! Cursors are loaded and saved as a whole unit; nothing mutates a cursor
//! in place while a cycle is in flight.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::RawItem;

/// How an adapter wants its cursor advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    #[default]
    Watermark,
    PerItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CursorMarker {
    /// Nothing synced yet.
    #[default]
    None,
    Watermark(DateTime<Utc>),
    Items(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub source: String,
    pub owner: String,
    #[serde(default)]
    pub marker: CursorMarker,
    /// Cumulative count of items processed across all saved cycles.
    #[serde(default)]
    pub items_processed: u64,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Cursor {
    /// A fresh cursor for a source that has never synced.
    pub fn new(source: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            owner: owner.into(),
            marker: CursorMarker::None,
            items_processed: 0,
            saved_at: None,
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match &self.marker {
            CursorMarker::Watermark(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn item_marker(&self, item_ref: &str) -> Option<&str> {
        match &self.marker {
            CursorMarker::Items(map) => map.get(item_ref).map(String::as_str),
            _ => None,
        }
    }

    /// Whether `item` is already covered by this cursor.
    ///
    /// Adapters use this to filter their delta. Items without an
    /// `updated_at` are never covered by a watermark.
    pub fn has_seen(&self, item: &RawItem) -> bool {
        match &self.marker {
            CursorMarker::None => false,
            CursorMarker::Watermark(ts) => item.updated_at.is_some_and(|at| at <= *ts),
            CursorMarker::Items(map) => map.get(&item.item_ref) == Some(&item_marker(item)),
        }
    }

    /// Compute the cursor that results from a cycle's outcome.
    ///
    /// Only `completed` items (indexed, duplicate, or intentionally skipped)
    /// move the cursor. A watermark never moves past the oldest `failed`
    /// item, so the next fetch still returns it. Watermarks never move
    /// backwards.
    pub fn advanced(&self, mode: CursorMode, completed: &[&RawItem], failed: &[&RawItem]) -> Cursor {
        let marker = match mode {
            CursorMode::Watermark => {
                let oldest_failed = failed.iter().filter_map(|i| i.updated_at).min();
                let newest_completed = completed
                    .iter()
                    .filter_map(|i| i.updated_at)
                    .filter(|at| oldest_failed.map_or(true, |f| *at < f))
                    .max();
                match (self.watermark(), newest_completed) {
                    (Some(current), Some(new)) => CursorMarker::Watermark(current.max(new)),
                    (None, Some(new)) => CursorMarker::Watermark(new),
                    (Some(current), None) => CursorMarker::Watermark(current),
                    (None, None) => CursorMarker::None,
                }
            }
            CursorMode::PerItem => {
                let mut map = match &self.marker {
                    CursorMarker::Items(map) => map.clone(),
                    _ => BTreeMap::new(),
                };
                for item in completed {
                    map.insert(item.item_ref.clone(), item_marker(item));
                }
                CursorMarker::Items(map)
            }
        };

        Cursor {
            source: self.source.clone(),
            owner: self.owner.clone(),
            marker,
            items_processed: self.items_processed,
            saved_at: self.saved_at,
        }
    }
}

/// The per-item update marker recorded in [`CursorMarker::Items`].
pub fn item_marker(item: &RawItem) -> String {
    item.updated_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "seen".to_string())
}
