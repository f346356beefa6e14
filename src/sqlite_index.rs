//! Durable [`VectorIndex`] backed by the `chunk_records` SQLite table.
//!
//! Vectors are stored as little-endian f32 BLOBs. Queries are brute force:
//! every row is decoded and scored in process, which is fine for a single
//! mailbox's worth of chunks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use mailsift_core::embedding::{blob_to_vec, cosine_similarity, euclidean_distance, vec_to_blob};
use mailsift_core::index::{Metric, ScoreKind, ScoredRecord, VectorIndex};
use mailsift_core::models::{RecordMetadata, VectorRecord};

pub struct SqliteIndex {
    pool: SqlitePool,
    metric: Metric,
}

impl SqliteIndex {
    /// Wrap a pool whose schema has already been created.
    pub fn new(pool: SqlitePool, metric: Metric) -> Self {
        Self { pool, metric }
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let meta = &record.metadata;
            sqlx::query(
                r#"
                INSERT INTO chunk_records
                    (record_id, message_id, chunk_index, text, subject, sender, date, hash, embedding, dims)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(record_id) DO UPDATE SET
                    message_id = excluded.message_id,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    subject = excluded.subject,
                    sender = excluded.sender,
                    date = excluded.date,
                    hash = excluded.hash,
                    embedding = excluded.embedding,
                    dims = excluded.dims
                "#,
            )
            .bind(&record.record_id)
            .bind(&meta.message_id)
            .bind(meta.chunk_index as i64)
            .bind(&meta.text)
            .bind(&meta.subject)
            .bind(&meta.sender)
            .bind(&meta.date)
            .bind(&meta.hash)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert record {}", record.record_id))?;
        }

        // Dropping `tx` on an earlier error rolls every row back.
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT record_id, message_id, chunk_index, text, subject, sender, date, hash, embedding
            FROM chunk_records
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<ScoredRecord> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let score = match self.metric {
                    Metric::Cosine => cosine_similarity(vector, &stored),
                    Metric::Euclidean => euclidean_distance(vector, &stored),
                } as f64;
                let chunk_index: i64 = row.get("chunk_index");
                ScoredRecord {
                    record: VectorRecord {
                        record_id: row.get("record_id"),
                        vector: stored,
                        metadata: RecordMetadata {
                            message_id: row.get("message_id"),
                            chunk_index: chunk_index.max(0) as usize,
                            text: row.get("text"),
                            subject: row.get("subject"),
                            sender: row.get("sender"),
                            date: row.get("date"),
                            hash: row.get("hash"),
                        },
                    },
                    score,
                }
            })
            .collect();

        let ascending = self.score_kind() == ScoreKind::Distance;
        hits.sort_by(|a, b| {
            let ord = if ascending {
                a.score.partial_cmp(&b.score)
            } else {
                b.score.partial_cmp(&a.score)
            };
            ord.unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.record_id.cmp(&b.record.record_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as usize)
    }

    fn score_kind(&self) -> ScoreKind {
        self.metric.score_kind()
    }
}
