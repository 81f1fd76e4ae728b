//! TOML configuration parsing and validation.
//!
//! Everything except `[db]` is optional; omitted sections fall back to the
//! engine defaults. See `config/synx.example.toml` for a full example.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sync_harness_core::backoff::{
    BackoffPolicy, DEFAULT_CIRCUIT_THRESHOLD, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF,
};
use sync_harness_core::hash::{ContentHasher, DEFAULT_MIN_TEXT_LEN, DEFAULT_PREFIX_CHARS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,
    #[serde(default = "default_circuit_threshold")]
    pub circuit_threshold: u32,
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_high_failure_ratio")]
    pub high_failure_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            batch_size: default_batch_size(),
            enrichment_concurrency: default_enrichment_concurrency(),
            circuit_threshold: default_circuit_threshold(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            high_failure_ratio: default_high_failure_ratio(),
        }
    }
}

fn default_sync_interval_secs() -> u64 {
    300
}
fn default_batch_size() -> usize {
    10
}
fn default_enrichment_concurrency() -> usize {
    32
}
fn default_circuit_threshold() -> u32 {
    DEFAULT_CIRCUIT_THRESHOLD
}
fn default_initial_backoff_secs() -> u64 {
    DEFAULT_INITIAL_BACKOFF.as_secs()
}
fn default_max_backoff_secs() -> u64 {
    DEFAULT_MAX_BACKOFF.as_secs()
}
fn default_call_timeout_secs() -> u64 {
    120
}
fn default_high_failure_ratio() -> f64 {
    0.3
}

impl EngineConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(self.initial_backoff_secs),
            Duration::from_secs(self.max_backoff_secs),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,
    #[serde(default = "default_hash_prefix_chars")]
    pub hash_prefix_chars: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            min_text_len: default_min_text_len(),
            hash_prefix_chars: default_hash_prefix_chars(),
        }
    }
}

fn default_min_text_len() -> usize {
    DEFAULT_MIN_TEXT_LEN
}
fn default_hash_prefix_chars() -> usize {
    DEFAULT_PREFIX_CHARS
}

impl DedupConfig {
    pub fn hasher(&self) -> ContentHasher {
        ContentHasher::new(self.min_text_len, self.hash_prefix_chars)
    }
}

/// Which target stores are enabled.
#[derive(Debug, Deserialize, Clone)]
pub struct StoresConfig {
    #[serde(default = "default_true")]
    pub graph: bool,
    #[serde(default = "default_true")]
    pub vector: bool,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            graph: true,
            vector: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embed_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

/// Source instances, grouped by adapter kind and keyed by instance name.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub notes: BTreeMap<String, NotesSourceConfig>,
}

impl SourcesConfig {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotesSourceConfig {
    pub owner: String,
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

impl Config {
    /// A config with defaults everywhere and the database at `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            engine: EngineConfig::default(),
            dedup: DedupConfig::default(),
            stores: StoresConfig::default(),
            embedding: EmbeddingConfig::default(),
            logging: LoggingConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let engine = &config.engine;
    if engine.sync_interval_secs == 0 {
        bail!("engine.sync_interval_secs must be >= 1");
    }
    if engine.batch_size == 0 {
        bail!("engine.batch_size must be >= 1");
    }
    if engine.enrichment_concurrency == 0 {
        bail!("engine.enrichment_concurrency must be >= 1");
    }
    if engine.circuit_threshold == 0 {
        bail!("engine.circuit_threshold must be >= 1");
    }
    if engine.call_timeout_secs == 0 {
        bail!("engine.call_timeout_secs must be >= 1");
    }
    if engine.initial_backoff_secs > engine.max_backoff_secs {
        bail!(
            "engine.initial_backoff_secs ({}) must not exceed engine.max_backoff_secs ({})",
            engine.initial_backoff_secs,
            engine.max_backoff_secs
        );
    }
    if !(0.0..=1.0).contains(&engine.high_failure_ratio) {
        bail!("engine.high_failure_ratio must be in [0.0, 1.0]");
    }

    if config.dedup.hash_prefix_chars == 0 {
        bail!("dedup.hash_prefix_chars must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider == "openai" && config.embedding.model.is_none() {
            bail!("embedding.model must be specified when provider is 'openai'");
        }
    }

    match config.logging.format.as_str() {
        "text" | "json" => {}
        other => bail!("Unknown logging.format: '{}'. Must be text or json.", other),
    }

    for (name, notes) in &config.sources.notes {
        if notes.owner.trim().is_empty() {
            bail!("sources.notes.{}.owner must not be empty", name);
        }
    }

    Ok(())
}
