//! # Sync Harness Core
//!
//! Runtime-agnostic building blocks for Sync Harness: the node model,
//! per-source cursors, content hashing, cycle statistics, backoff and
//! circuit-breaker arithmetic, and the store traits the engine writes
//! through.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The engine,
//! the SQLite backends, and the CLI live in the `sync-harness` app crate.

pub mod backoff;
pub mod cursor;
pub mod hash;
pub mod models;
pub mod stats;
pub mod store;
