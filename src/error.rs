//! Error taxonomy for mailbox synchronization.
//!
//! Everything outside the coordinator boundary uses `anyhow`; the
//! coordinator reports failures as [`SyncError`] so callers (the HTTP layer
//! in particular) can tell a busy coordinator from a broken mailbox.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Mailbox unreachable, login rejected, or the mailbox worker is gone.
    #[error("mailbox connectivity error: {0}")]
    Connectivity(String),

    /// A mailbox operation exceeded its time bound.
    #[error("mailbox operation '{operation}' timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// One message could not be retrieved or parsed.
    #[error("failed to fetch message {id}: {reason}")]
    Fetch { id: String, reason: String },

    /// Embedding provider failure or malformed response.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector index failure.
    #[error("vector index error: {0}")]
    Index(String),

    /// Durable sync-state store failure.
    #[error("sync state store error: {0}")]
    State(String),

    /// A `sync_batch` is already running on this coordinator.
    #[error("a sync is already in progress")]
    AlreadySyncing,
}

impl SyncError {
    /// Whether the caller should treat this as "try again later" rather
    /// than a failure of the mailbox or pipeline.
    pub fn is_busy(&self) -> bool {
        matches!(self, SyncError::AlreadySyncing)
    }
}

/// Render an `anyhow` error with its full cause chain on one line.
pub fn chain_message(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = SyncError::Timeout {
            operation: "fetch_unseen".to_string(),
            secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "mailbox operation 'fetch_unseen' timed out after 30s"
        );
        assert!(SyncError::AlreadySyncing.is_busy());
        assert!(!SyncError::Index("x".into()).is_busy());
    }

    #[test]
    fn test_chain_message_includes_context() {
        let err = anyhow::anyhow!("root cause").context("outer");
        assert_eq!(chain_message(&err), "outer: root cause");
    }
}
