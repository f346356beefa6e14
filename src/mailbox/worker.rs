//! Dedicated mailbox thread.
//!
//! Mailbox protocols are blocking, so a [`MailboxClient`] owns one OS thread
//! that owns the [`MailStore`]. Async callers send a job over a channel and
//! await a oneshot reply under an outer per-operation timeout. Jobs run one
//! at a time in submission order; the tokio runtime is never blocked.

use std::collections::HashSet;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use mailsift_core::models::RawMessage;

use super::{is_timeout_error, is_transport_error, open_store, MailStore};
use crate::config::MailboxConfig;
use crate::error::SyncError;

type Job = Box<dyn FnOnce(&mut dyn MailStore) + Send>;

pub struct MailboxClient {
    jobs: mpsc::Sender<Job>,
    op_timeout: Duration,
    io_timeout: Duration,
}

impl MailboxClient {
    /// Move `store` onto a new worker thread.
    pub fn spawn(
        store: Box<dyn MailStore>,
        op_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        std::thread::Builder::new()
            .name("mailbox-worker".to_string())
            .spawn(move || {
                let mut store = store;
                while let Ok(job) = rx.recv() {
                    job(store.as_mut());
                }
                debug!("Mailbox worker stopped");
            })?;
        Ok(Self {
            jobs: tx,
            op_timeout,
            io_timeout,
        })
    }

    pub fn from_config(config: &MailboxConfig) -> Result<Self> {
        let store = open_store(config)?;
        Self::spawn(store, config.op_timeout(), config.io_timeout())
    }

    /// Run `f` on the worker and wait for its answer.
    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<Result<T>, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn MailStore) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |store| {
            // The caller may have timed out and gone away.
            let _ = reply_tx.send(f(store));
        });
        self.jobs
            .send(job)
            .map_err(|_| SyncError::Connectivity("mailbox worker has stopped".to_string()))?;

        match tokio::time::timeout(self.op_timeout, reply_rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(SyncError::Connectivity(
                "mailbox worker dropped the request".to_string(),
            )),
            Err(_) => {
                warn!(operation, secs = self.op_timeout.as_secs(), "Mailbox operation timed out");
                Err(SyncError::Timeout {
                    operation: operation.to_string(),
                    secs: self.op_timeout.as_secs(),
                })
            }
        }
    }

    fn classify(&self, operation: &str, err: anyhow::Error) -> SyncError {
        if is_timeout_error(&err) {
            SyncError::Timeout {
                operation: operation.to_string(),
                secs: self.io_timeout.as_secs(),
            }
        } else {
            SyncError::Connectivity(format!("{:#}", err))
        }
    }

    pub async fn test_connection(&self) -> Result<(), SyncError> {
        self.run("test_connection", |store| store.test_connection())
            .await?
            .map_err(|e| self.classify("test_connection", e))
    }

    pub async fn count_all(&self) -> Result<usize, SyncError> {
        self.run("count_all", |store| store.count_all())
            .await?
            .map_err(|e| self.classify("count_all", e))
    }

    pub async fn list_ids(&self) -> Result<Vec<String>, SyncError> {
        self.run("list_ids", |store| store.list_ids())
            .await?
            .map_err(|e| self.classify("list_ids", e))
    }

    /// Up to `max_count` messages not in `exclude`, oldest first.
    pub async fn fetch_unseen(
        &self,
        max_count: usize,
        exclude: HashSet<String>,
    ) -> Result<Vec<RawMessage>, SyncError> {
        self.run("fetch_unseen", move |store| {
            store.fetch_unseen(max_count, &exclude)
        })
        .await?
        .map_err(|e| self.classify("fetch_unseen", e))
    }

    pub async fn fetch_by_id(&self, id: &str) -> Result<RawMessage, SyncError> {
        let owned = id.to_string();
        self.run("fetch_by_id", move |store| store.fetch_by_id(&owned))
            .await?
            .map_err(|e| {
                if is_transport_error(&e) {
                    self.classify("fetch_by_id", e)
                } else {
                    SyncError::Fetch {
                        id: id.to_string(),
                        reason: format!("{:#}", e),
                    }
                }
            })
    }
}
