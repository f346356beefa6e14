//! Incremental ingestion and retrieval over one mailbox.
//!
//! The [`Coordinator`] owns the [`SyncState`] for a mailbox and drives the
//! pipeline:
//!
//! ```text
//! MailboxClient ──fetch_unseen──▶ Normalizer ──chunks──▶ EmbeddingProvider
//!                                                              │
//!                                   VectorIndex ◀──upsert──────┘
//! ```
//!
//! # Guarantees
//!
//! - At most one `sync_batch` runs at a time; a concurrent call fails fast
//!   with [`SyncError::AlreadySyncing`] without touching state.
//! - A message is added to `seen_ids` only after all its chunks are in the
//!   index (or it had none). Messages finished before a failure in the same
//!   batch stay seen.
//! - `search` never mutates sync state and always returns best-first.
//! - Persisted seen ids are restored before the first batch, whether or not
//!   the mailbox was reachable at startup.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use mailsift_core::chunk::content_hash;
use mailsift_core::embedding::{check_batch, embed_query, EmbeddingProvider};
use mailsift_core::index::memory::InMemoryIndex;
use mailsift_core::index::VectorIndex;
use mailsift_core::models::{
    record_id, ProcessedMessage, RawMessage, RecordMetadata, SearchResult, SyncState, SyncStatus,
    VectorRecord,
};
use mailsift_core::normalize::Normalizer;
use mailsift_core::rank::rank;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::error::{chain_message, SyncError};
use crate::mailbox::MailboxClient;
use crate::sqlite_index::SqliteIndex;
use crate::state::{MemoryStateStore, SqliteStateStore, StateStore};
use crate::{db, migrate};

/// Totals for a [`Coordinator::sync_all`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub batches: usize,
    /// Messages newly marked seen, including those without any text.
    pub messages: usize,
    pub chunks: usize,
}

/// What one batch did.
#[derive(Debug, Default)]
struct BatchOutcome {
    /// Messages that produced at least one chunk.
    processed: Vec<ProcessedMessage>,
    /// Messages added to `seen_ids`, with or without chunks.
    newly_seen: usize,
}

pub struct Coordinator {
    mailbox: MailboxClient,
    normalizer: Normalizer,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn StateStore>,
    state: Mutex<SyncState>,
    in_flight: tokio::sync::Mutex<()>,
    /// Set once the state store has been merged into `state`.
    restored: AtomicBool,
}

impl Coordinator {
    pub fn new(
        mailbox: MailboxClient,
        normalizer: Normalizer,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            mailbox,
            normalizer,
            embedder,
            index,
            store,
            state: Mutex::new(SyncState::default()),
            in_flight: tokio::sync::Mutex::new(()),
            restored: AtomicBool::new(false),
        }
    }

    /// Wire a coordinator from configuration.
    ///
    /// With `index.backend = "sqlite"` both the index and the seen-id set
    /// live in the `[db]` database. With the in-memory index, sync state is
    /// kept in memory too, since remembering ids whose vectors are gone
    /// would hide those messages forever.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mailbox = MailboxClient::from_config(&config.mailbox)?;
        let normalizer = Normalizer::new(config.normalize.max_chunk_chars)?;
        let embedder = create_provider(&config.embedding)?;
        let metric = config.index.metric()?;

        let (index, store): (Arc<dyn VectorIndex>, Arc<dyn StateStore>) =
            match (config.index.backend.as_str(), &config.db) {
                ("sqlite", Some(db_config)) => {
                    let pool = db::connect(db_config).await?;
                    migrate::ensure_schema(&pool).await?;
                    (
                        Arc::new(SqliteIndex::new(pool.clone(), metric)),
                        Arc::new(SqliteStateStore::new(pool)),
                    )
                }
                ("sqlite", None) => anyhow::bail!("[db] path is required for the sqlite index"),
                _ => (
                    Arc::new(InMemoryIndex::new(metric)),
                    Arc::new(MemoryStateStore::default()),
                ),
            };

        Ok(Self::new(mailbox, normalizer, embedder, index, store))
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock still holds usable data.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Restore persisted progress and check that the mailbox answers.
    ///
    /// Returns `false` (and records `last_error`) when either step fails.
    /// A failed check leaves everything but `last_error` and the restored
    /// seen ids untouched.
    pub async fn initialize(&self) -> bool {
        let _guard = self.in_flight.lock().await;

        let reached = match self.restore_state().await {
            Ok(()) => self.reach_mailbox().await,
            Err(e) => Err(e),
        };
        match reached {
            Ok(total) => {
                let mut state = self.lock_state();
                state.total_known = total;
                state.status = SyncStatus::Idle;
                state.last_error = None;
                info!(
                    total_known = total,
                    synced = state.synced_count,
                    "Mailbox initialized"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "Mailbox initialization failed");
                self.lock_state().last_error = Some(e.to_string());
                false
            }
        }
    }

    async fn reach_mailbox(&self) -> Result<usize, SyncError> {
        self.mailbox.test_connection().await?;
        self.mailbox.count_all().await
    }

    /// Merge the state store into the in-memory state, once.
    ///
    /// Callers hold `in_flight`.
    async fn restore_state(&self) -> Result<(), SyncError> {
        if self.restored.load(Ordering::Acquire) {
            return Ok(());
        }
        let persisted = self
            .store
            .load()
            .await
            .map_err(|e| SyncError::State(chain_message(&e)))?;

        let mut state = self.lock_state();
        state.seen_ids.extend(persisted.seen_ids);
        state.synced_count = state.seen_ids.len();
        if state.last_sync_time.is_none() {
            state.last_sync_time = persisted.last_sync_time;
        }
        self.restored.store(true, Ordering::Release);
        debug!(synced = state.synced_count, "Restored sync state");
        Ok(())
    }

    /// Fetch, normalize, embed and index up to `batch_size` unseen messages.
    ///
    /// Returns the processed messages that produced at least one chunk. A
    /// `batch_size` of zero is treated as one.
    pub async fn sync_batch(&self, batch_size: usize) -> Result<Vec<ProcessedMessage>, SyncError> {
        self.sync_batch_counted(batch_size)
            .await
            .map(|outcome| outcome.processed)
    }

    async fn sync_batch_counted(&self, batch_size: usize) -> Result<BatchOutcome, SyncError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SyncError::AlreadySyncing)?;

        self.lock_state().status = SyncStatus::Syncing;

        let now = Utc::now();
        let result = self.run_guarded(batch_size.max(1), now).await;

        match result {
            Ok(outcome) => {
                // Best effort: a failed count leaves the previous figure.
                let total = self.mailbox.count_all().await;
                let mut state = self.lock_state();
                if let Ok(total) = total {
                    state.total_known = total;
                }
                state.synced_count = state.seen_ids.len();
                state.last_sync_time = Some(now);
                state.status = SyncStatus::Idle;
                state.last_error = None;
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Sync batch failed");
                let mut state = self.lock_state();
                state.synced_count = state.seen_ids.len();
                state.status = SyncStatus::Error;
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Body of `sync_batch`, run while holding `in_flight`.
    async fn run_guarded(
        &self,
        batch_size: usize,
        now: chrono::DateTime<Utc>,
    ) -> Result<BatchOutcome, SyncError> {
        self.restore_state().await?;
        let exclude = self.lock_state().seen_ids.clone();
        let outcome = self.run_batch(batch_size, exclude).await?;
        self.store
            .set_last_sync_time(now)
            .await
            .map_err(|e| SyncError::State(chain_message(&e)))?;
        Ok(outcome)
    }

    async fn run_batch(
        &self,
        batch_size: usize,
        exclude: HashSet<String>,
    ) -> Result<BatchOutcome, SyncError> {
        let messages = self.mailbox.fetch_unseen(batch_size, exclude.clone()).await?;
        let mut outcome = BatchOutcome::default();
        if messages.is_empty() {
            debug!("No unseen messages");
            return Ok(outcome);
        }
        info!(count = messages.len(), "Fetched unseen messages");

        for message in messages {
            if exclude.contains(&message.id) {
                continue;
            }
            let processed = self.normalizer.process(&message);
            if !processed.is_empty() {
                self.index_message(&message, &processed).await?;
            }

            self.store
                .add_seen_id(&message.id)
                .await
                .map_err(|e| SyncError::State(chain_message(&e)))?;
            {
                let mut state = self.lock_state();
                if state.seen_ids.insert(message.id.clone()) {
                    outcome.newly_seen += 1;
                }
                state.synced_count = state.seen_ids.len();
            }
            info!(
                message_id = %message.id,
                chunks = processed.chunks.len(),
                "Indexed message"
            );

            if !processed.is_empty() {
                outcome.processed.push(processed);
            }
        }

        Ok(outcome)
    }

    /// Embed every chunk of one message and upsert them in a single call.
    async fn index_message(
        &self,
        message: &RawMessage,
        processed: &ProcessedMessage,
    ) -> Result<(), SyncError> {
        let vectors = self
            .embedder
            .embed(&processed.chunks)
            .await
            .map_err(|e| SyncError::Embedding(chain_message(&e)))?;
        check_batch(processed.chunks.len(), &vectors)
            .map_err(|e| SyncError::Embedding(chain_message(&e)))?;

        let records: Vec<VectorRecord> = processed
            .chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (text, vector))| VectorRecord {
                record_id: record_id(&processed.message_id, chunk_index),
                vector,
                metadata: RecordMetadata {
                    message_id: processed.message_id.clone(),
                    chunk_index,
                    text: text.clone(),
                    subject: message.subject.clone(),
                    sender: message.sender.clone(),
                    date: message.date.clone(),
                    hash: content_hash(text),
                },
            })
            .collect();

        self.index
            .upsert(&records)
            .await
            .map_err(|e| SyncError::Index(chain_message(&e)))
    }

    /// Run batches until one adds no new message or `max_batches` is hit.
    pub async fn sync_all(
        &self,
        batch_size: usize,
        max_batches: Option<usize>,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        loop {
            if max_batches.is_some_and(|max| report.batches >= max) {
                break;
            }
            let outcome = self.sync_batch_counted(batch_size).await?;

            report.batches += 1;
            report.messages += outcome.newly_seen;
            report.chunks += outcome
                .processed
                .iter()
                .map(|p| p.chunks.len())
                .sum::<usize>();

            if outcome.newly_seen == 0 {
                break;
            }
        }
        info!(
            batches = report.batches,
            messages = report.messages,
            chunks = report.chunks,
            "Sync finished"
        );
        Ok(report)
    }

    /// The `top_k` chunks most similar to `query`, best first.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, SyncError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let count = self
            .index
            .count()
            .await
            .map_err(|e| SyncError::Index(chain_message(&e)))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let vector = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| SyncError::Embedding(chain_message(&e)))?;
        let hits = self
            .index
            .query(&vector, top_k)
            .await
            .map_err(|e| SyncError::Index(chain_message(&e)))?;

        Ok(rank(hits, self.index.score_kind(), top_k))
    }

    /// Snapshot of the sync state.
    pub fn status(&self) -> SyncState {
        self.lock_state().clone()
    }

    /// Number of chunk records in the index.
    pub async fn indexed_chunks(&self) -> Result<usize, SyncError> {
        self.index
            .count()
            .await
            .map_err(|e| SyncError::Index(chain_message(&e)))
    }

    /// Fetch one message straight from the mailbox, bypassing the index.
    pub async fn fetch_message(&self, id: &str) -> Result<RawMessage, SyncError> {
        self.mailbox.fetch_by_id(id).await
    }
}
