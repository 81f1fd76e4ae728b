//! # Sync Harness CLI (`synx`)
//!
//! ## Usage
//!
//! ```bash
//! synx --config ./config/synx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `synx init` | Create the SQLite database and run schema migrations |
//! | `synx sources` | List configured sources |
//! | `synx sync <source>` | Sync one source (`--once` for a single cycle) |
//! | `synx run` | Sync every source until Ctrl-C |
//! | `synx status` | Cursor progress and store counts |
//! | `synx verify` | List nodes present in only one store |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sync_harness::{config, ingest, logging, migrate, sources, stats};

/// Sync Harness: keep a graph store and a vector index in step with many
/// upstream sources.
#[derive(Parser)]
#[command(
    name = "synx",
    about = "Sync Harness: incremental multi-source indexing into a graph store and a vector index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/synx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// List configured sources.
    Sources,

    /// Sync one source.
    ///
    /// Source format: `<kind>:<name>`, e.g. `notes:docs`.
    Sync {
        source: String,

        /// Run a single cycle and exit instead of looping.
        #[arg(long)]
        once: bool,
    },

    /// Sync every configured source until interrupted.
    Run,

    /// Show cursor progress and store counts.
    Status,

    /// List nodes that are present in only one of the two stores.
    Verify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_tracing(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Sync { source, once } => {
            ingest::run_sync(&cfg, &source, once).await?;
        }
        Commands::Run => {
            ingest::run_all(&cfg).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
        Commands::Verify => {
            stats::run_verify(&cfg).await?;
        }
    }

    Ok(())
}
