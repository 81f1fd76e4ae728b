//! # Sync Harness
//!
//! An incremental multi-source indexing engine. Each configured source is
//! polled on a schedule; changed items are normalized into graph nodes,
//! deduplicated by content hash, and written to a graph store and a vector
//! index so that a node is either present in both or treated as absent.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────────┐   ┌─────────────┐
//! │  Adapters   │──▶│          SyncEngine           │──▶│ Graph store │
//! │ notes/custom│   │ transform → dedup → write     │   ├─────────────┤
//! └─────────────┘   │ → enrich → checkpoint         │──▶│ Vector store│
//!                   └──────────────┬───────────────┘   └─────────────┘
//!                                  ▼
//!                           ┌─────────────┐
//!                           │ Cursor store│
//!                           └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! synx init                     # create database
//! synx sources                  # list configured sources
//! synx sync notes:docs --once   # one cycle of one source
//! synx run                      # every source until Ctrl-C
//! synx status                   # cursors and store counts
//! synx verify                   # nodes present in only one store
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`engine`] | Per-source sync loop, backoff, circuit breaker |
//! | [`dedup`] | Content-hash dedup over the configured stores |
//! | [`writer`] | Graph-then-vector batch writes |
//! | [`enrich`] | Best-effort post-indexing enrichment |
//! | [`adapter`] | Source adapter trait and registry |
//! | [`adapter_notes`] | Notes directory adapter |
//! | [`supervisor`] | One engine per source |
//! | [`sqlite_store`] | SQLite reference stores |
//! | [`embedding`] | Embedding providers |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//!
//! Models, cursors, hashing, and the store traits live in
//! `sync_harness_core`.

pub mod adapter;
pub mod adapter_notes;
pub mod config;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod runtime;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod supervisor;
pub mod writer;
