//! # mailsift
//!
//! Incremental ingestion and semantic retrieval over a mailbox.
//!
//! mailsift tracks which messages of a mailbox folder it has already
//! indexed, fetches the rest in bounded batches, cleans and chunks their
//! bodies, embeds the chunks, and answers similarity queries against the
//! accumulated index.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  Mailbox    │──▶│  Normalize   │──▶│ Vector index  │
//! │ IMAP / .eml │   │ Chunk+Embed  │   │ memory/SQLite │
//! └─────────────┘   └──────────────┘   └───────┬───────┘
//!                                              │
//!                        ┌─────────────────────┤
//!                        ▼                     ▼
//!                   ┌──────────┐          ┌──────────┐
//!                   │   CLI    │          │   HTTP   │
//!                   └──────────┘          └──────────┘
//! ```
//!
//! Pure pipeline logic (normalization, chunking, index traits, ranking)
//! lives in the `mailsift-core` crate; this crate supplies the mailbox
//! transports, embedding backends, SQLite persistence and the surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`mailbox`] | IMAP and `.eml` stores, the mailbox worker thread |
//! | [`embedding`] | Embedding providers |
//! | [`sqlite_index`] | Durable vector index |
//! | [`state`] | Sync state persistence |
//! | [`coordinator`] | `initialize`, `sync_batch`, `search`, `status` |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod embedding;
pub mod error;
pub mod logging;
pub mod mailbox;
pub mod migrate;
pub mod server;
pub mod sqlite_index;
pub mod state;
