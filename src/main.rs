//! # ragsync CLI
//!
//! ```bash
//! ragsync --config ./config/ragsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragsync init` | Create the catalog and index tables |
//! | `ragsync sync [DIR]` | Bring the index in line with a directory |
//! | `ragsync ingest <FILE>` | Index one file directly, bypassing the catalog |
//! | `ragsync forget <SOURCE_ID>` | Drop a file's chunks and catalog row |
//! | `ragsync status` | List catalogued files and chunk counts |
//! | `ragsync search "<query>"` | Nearest chunks for a query |
//! | `ragsync ask "<question>"` | Grounded answer with sources |
//! | `ragsync serve` | Start the HTTP API |
//!
//! If the config file does not exist, built-in defaults are used.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ragsync::{commands, config, server};

/// Incremental document sync and retrieval-augmented answering.
#[derive(Parser)]
#[command(
    name = "ragsync",
    about = "Keep a vector index in sync with a directory of documents and ask questions about them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragsync.toml`; if that file is absent, defaults apply.
    #[arg(long, global = true, default_value = "./config/ragsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog and index tables. Idempotent.
    Init,

    /// Synchronize a directory (default: `[sync].root`) with the index.
    ///
    /// Only new, modified, and deleted files are touched. Files whose last
    /// ingestion was interrupted are re-ingested.
    Sync {
        /// Directory to synchronize.
        directory: Option<PathBuf>,

        /// Re-ingest every file regardless of its content hash.
        #[arg(long)]
        full: bool,

        /// Show what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Index one file directly. The catalog is not consulted or updated.
    Ingest {
        file: PathBuf,

        /// Identifier stamped on the chunks (default: the path as given).
        #[arg(long)]
        source_id: Option<String>,
    },

    /// Remove a file's chunks and catalog row so the next sync re-adds it.
    Forget { source_id: String },

    /// Show catalogued files, their status, and chunk counts.
    Status,

    /// Search the index.
    Search {
        query: String,

        /// Number of results (default: `[retrieval].k`).
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        question: String,

        /// Number of chunks used as context (default: `[retrieval].k`).
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "config file not found, using defaults");
        config::Config::default()
    };

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Sync {
            directory,
            full,
            dry_run,
        } => commands::run_sync(&cfg, directory, full, dry_run).await?,
        Commands::Ingest { file, source_id } => {
            commands::run_ingest(&cfg, &file, source_id.as_deref()).await?
        }
        Commands::Forget { source_id } => commands::run_forget(&cfg, &source_id).await?,
        Commands::Status => commands::run_status(&cfg).await?,
        Commands::Search { query, k } => commands::run_search(&cfg, &query, k).await?,
        Commands::Ask { question, k } => commands::run_ask(&cfg, &question, k).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
