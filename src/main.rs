//! # mailsift CLI
//!
//! Incrementally indexes a mailbox into a vector index and answers
//! similarity queries over it.
//!
//! ## Usage
//!
//! ```bash
//! mailsift --config ./config/mailsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mailsift init` | Create the SQLite schema (when `[db]` is configured) |
//! | `mailsift probe` | Log in and check the mailbox is reachable |
//! | `mailsift status` | Show sync progress and index size |
//! | `mailsift sync` | Index unseen messages in batches |
//! | `mailsift search "<query>"` | Search indexed messages |
//! | `mailsift serve` | Start the HTTP API with background sync |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mailsift::{commands, config, logging};

/// mailsift: incremental semantic search over a mailbox.
#[derive(Parser)]
#[command(
    name = "mailsift",
    about = "Incremental semantic search over a mailbox",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mailsift.toml")]
    config: PathBuf,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Check mailbox connectivity and report the message count.
    Probe,

    /// Show sync status.
    Status,

    /// Fetch, embed and index unseen messages.
    ///
    /// Runs batches until one finds nothing new, or until `--max-batches`.
    Sync {
        /// Messages per batch (defaults to `[sync].batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Stop after this many batches.
        #[arg(long)]
        max_batches: Option<usize>,
    },

    /// Search indexed messages.
    Search {
        /// Free-text query.
        query: String,

        /// Maximum number of results (defaults to `[retrieval].default_top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Probe => commands::run_probe(&cfg).await?,
        Commands::Status => commands::run_status(&cfg).await?,
        Commands::Sync {
            batch_size,
            max_batches,
        } => commands::run_sync(&cfg, batch_size, max_batches).await?,
        Commands::Search { query, limit } => commands::run_search(&cfg, &query, limit).await?,
        Commands::Serve => commands::run_serve(&cfg).await?,
    }

    Ok(())
}
