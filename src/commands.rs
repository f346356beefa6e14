//! CLI command implementations.
//!
//! Each `run_*` function backs one `mailsift` subcommand. Reports go to
//! stdout; diagnostics go through `tracing` to stderr.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::{migrate, server};

const EXCERPT_CHARS: usize = 200;

/// `mailsift init`: create the database schema.
pub async fn run_init(config: &Config) -> Result<()> {
    match &config.db {
        Some(db) => {
            migrate::run_migrations(db).await?;
            println!("Database initialized at {}", db.path.display());
        }
        None => println!("No [db] configured; nothing to initialize."),
    }
    Ok(())
}

async fn connect(config: &Config) -> Result<Coordinator> {
    let coordinator = Coordinator::from_config(config).await?;
    if !coordinator.initialize().await {
        let reason = coordinator
            .status()
            .last_error
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("Mailbox initialization failed: {}", reason);
    }
    Ok(coordinator)
}

/// `mailsift probe`: check that the mailbox is reachable.
pub async fn run_probe(config: &Config) -> Result<()> {
    let coordinator = connect(config).await?;
    let state = coordinator.status();
    println!("mailbox: ok ({})", config.mailbox.kind);
    println!("  messages: {}", state.total_known);
    Ok(())
}

/// `mailsift status`: sync progress and index size.
pub async fn run_status(config: &Config) -> Result<()> {
    let coordinator = Coordinator::from_config(config).await?;
    let reachable = coordinator.initialize().await;
    let state = coordinator.status();
    let chunks = coordinator.indexed_chunks().await?;

    println!("mailsift status");
    println!("  mailbox:     {}", if reachable { "reachable" } else { "unreachable" });
    println!("  status:      {}", state.status);
    println!("  messages:    {}", state.total_known);
    println!("  synced:      {}", state.synced_count);
    println!("  chunks:      {}", chunks);
    match state.last_sync_time {
        Some(t) => println!("  last sync:   {}", t.to_rfc3339()),
        None => println!("  last sync:   never"),
    }
    if let Some(err) = state.last_error {
        println!("  last error:  {}", err);
    }
    Ok(())
}

/// `mailsift sync`: run batches until caught up or `max_batches` is hit.
pub async fn run_sync(
    config: &Config,
    batch_size: Option<usize>,
    max_batches: Option<usize>,
) -> Result<()> {
    let batch_size = batch_size.unwrap_or(config.sync.batch_size);
    if batch_size == 0 {
        bail!("--batch-size must be >= 1");
    }
    let coordinator = connect(config).await?;
    let report = coordinator.sync_all(batch_size, max_batches).await?;
    let state = coordinator.status();

    println!("sync {}", config.mailbox.kind);
    println!("  batches: {}", report.batches);
    println!("  messages indexed: {}", report.messages);
    println!("  chunks written: {}", report.chunks);
    println!("  synced: {} / {}", state.synced_count, state.total_known);
    Ok(())
}

/// `mailsift search`: print the best-matching chunks.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let limit = limit.unwrap_or(config.retrieval.default_top_k);
    let coordinator = Coordinator::from_config(config).await?;
    let results = coordinator.search(query, limit).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let subject = if result.subject.is_empty() {
            "(no subject)"
        } else {
            result.subject.as_str()
        };
        println!("{}. [{:.3}] {}", i + 1, result.score, subject);
        if !result.sender.is_empty() {
            println!("    from: {}", result.sender);
        }
        if !result.date.is_empty() {
            println!("    date: {}", result.date);
        }
        println!("    excerpt: \"{}\"", excerpt(&result.text));
        println!("    message: {} (chunk {})", result.message_id, result.chunk_index);
        println!();
    }
    Ok(())
}

/// `mailsift serve`: HTTP API with background sync.
pub async fn run_serve(config: &Config) -> Result<()> {
    server::run_server(config).await
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}
