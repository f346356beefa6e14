//! Persistence of sync progress.
//!
//! The coordinator keeps its [`SyncState`](mailsift_core::models::SyncState)
//! in memory and writes through a [`StateStore`] after each message is
//! indexed. [`MemoryStateStore`] forgets everything on restart;
//! [`SqliteStateStore`] keeps the seen-id set and the last sync time in the
//! `seen_messages` and `sync_meta` tables, so a restarted process resumes
//! where it stopped instead of re-embedding the whole mailbox.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// What survives a restart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub seen_ids: HashSet<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<PersistedState>;

    /// Record one message as fully indexed. Re-adding an id is a no-op.
    async fn add_seen_id(&self, id: &str) -> Result<()>;

    async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<PersistedState>,
}

impl MemoryStateStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PersistedState>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("state store lock poisoned"))
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<PersistedState> {
        Ok(self.lock()?.clone())
    }

    async fn add_seen_id(&self, id: &str) -> Result<()> {
        self.lock()?.seen_ids.insert(id.to_string());
        Ok(())
    }

    async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.lock()?.last_sync_time = Some(at);
        Ok(())
    }
}

const LAST_SYNC_KEY: &str = "last_sync_time";

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Wrap a pool whose schema has already been created.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self) -> Result<PersistedState> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT message_id FROM seen_messages")
            .fetch_all(&self.pool)
            .await?;

        let last: Option<String> = sqlx::query_scalar("SELECT value FROM sync_meta WHERE key = ?")
            .bind(LAST_SYNC_KEY)
            .fetch_optional(&self.pool)
            .await?;
        let last_sync_time = match last {
            Some(s) => Some(
                DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| anyhow!("Corrupt last_sync_time '{}': {}", s, e))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(PersistedState {
            seen_ids: ids.into_iter().collect(),
            last_sync_time,
        })
    }

    async fn add_seen_id(&self, id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO seen_messages (message_id, seen_at) VALUES (?, ?)")
            .bind(id)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(LAST_SYNC_KEY)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::{db, migrate};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_accumulates() {
        let store = MemoryStateStore::default();
        assert_eq!(store.load().await.unwrap(), PersistedState::default());

        let t = Utc::now();
        store.add_seen_id("1").await.unwrap();
        store.add_seen_id("2").await.unwrap();
        store.add_seen_id("1").await.unwrap();
        store.set_last_sync_time(t).await.unwrap();
        let state = store.load().await.unwrap();
        assert_eq!(state.seen_ids.len(), 2);
        assert_eq!(state.last_sync_time, Some(t));
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let config = DbConfig {
            path: tmp.path().join("state.sqlite"),
        };
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        {
            let pool = db::connect(&config).await.unwrap();
            migrate::ensure_schema(&pool).await.unwrap();
            let store = SqliteStateStore::new(pool.clone());
            store.add_seen_id("101").await.unwrap();
            store.add_seen_id("102").await.unwrap();
            store.add_seen_id("101").await.unwrap();
            store.set_last_sync_time(at).await.unwrap();
            pool.close().await;
        }

        let pool = db::connect(&config).await.unwrap();
        let store = SqliteStateStore::new(pool);
        let state = store.load().await.unwrap();
        let expected: HashSet<String> = ["101".to_string(), "102".to_string()].into();
        assert_eq!(state.seen_ids, expected);
        assert_eq!(state.last_sync_time, Some(at));
    }
}
