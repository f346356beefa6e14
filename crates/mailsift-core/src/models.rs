//! Data models shared by the ingestion and retrieval pipeline.
//!
//! A [`RawMessage`] comes out of the mailbox, the normalizer turns it into a
//! [`ProcessedMessage`], and every chunk of that becomes one
//! [`VectorRecord`] in the index. Queries come back as [`SearchResult`]s.
//! [`SyncState`] is the bookkeeping the coordinator keeps between batches.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as fetched from the mailbox, before any cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Mailbox-scoped identifier (IMAP UID, or a path for `.eml` trees).
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    /// `Date:` header as it appeared in the message.
    pub date: String,
    /// Decoded body: the `text/plain` part when present, else the HTML part.
    pub body: String,
}

/// The cleaned, chunked form of one message.
///
/// `chunks` may be empty when the body had no usable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedMessage {
    pub message_id: String,
    pub chunks: Vec<String>,
}

impl ProcessedMessage {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub message_id: String,
    pub chunk_index: usize,
    pub text: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub date: String,
    /// SHA-256 of `text`, hex encoded.
    #[serde(default)]
    pub hash: String,
}

/// One embedded chunk as stored in a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// `"{message_id}_{chunk_index}"`. Stable across re-ingestion.
    pub record_id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// Build the stable record id for a message chunk.
///
/// ```rust
/// use mailsift_core::models::record_id;
///
/// assert_eq!(record_id("4711", 2), "4711_2");
/// ```
pub fn record_id(message_id: &str, chunk_index: usize) -> String {
    format!("{}_{}", message_id, chunk_index)
}

/// A ranked hit returned to callers of `search`.
///
/// `score` is always "higher = more relevant", whatever the index measures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub text: String,
    pub message_id: String,
    pub chunk_index: usize,
    pub score: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subject: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sender: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub date: String,
}

/// Sync status state machine.
///
/// ```text
/// idle ──sync_batch──▶ syncing ──ok──▶ idle
///                        │
///                        └──failure──▶ error ──sync_batch──▶ syncing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync bookkeeping owned by a single coordinator.
///
/// `seen_ids` only ever grows, and `synced_count == seen_ids.len()` whenever
/// no batch is running.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    pub seen_ids: HashSet<String>,
    /// Message count reported by the mailbox at the last probe.
    pub total_known: usize,
    pub synced_count: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub last_error: Option<String>,
}

impl SyncState {
    /// Serializable view without the (potentially large) id set.
    pub fn summary(&self) -> SyncSummary {
        SyncSummary {
            status: self.status,
            total_known: self.total_known,
            synced_count: self.synced_count,
            last_sync_time: self.last_sync_time.map(|t| t.to_rfc3339()),
            last_error: self.last_error.clone(),
        }
    }
}

/// Compact, serializable status report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSummary {
    pub status: SyncStatus,
    pub total_known: usize,
    pub synced_count: usize,
    pub last_sync_time: Option<String>,
    pub last_error: Option<String>,
}
