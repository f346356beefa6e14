//! In-memory [`VectorIndex`] for tests and single-process deployments.
//!
//! Records live in a `HashMap` behind `std::sync::RwLock`. Queries are
//! brute force over every stored vector.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, euclidean_distance};
use crate::models::VectorRecord;

use super::{Metric, ScoreKind, ScoredRecord, VectorIndex};

pub struct InMemoryIndex {
    metric: Metric,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryIndex {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new(Metric::Cosine)
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        for record in records {
            stored.insert(record.record_id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        let stored = self.records.read().map_err(|_| poisoned())?;
        let mut hits: Vec<ScoredRecord> = stored
            .values()
            .map(|record| {
                let score = match self.metric {
                    Metric::Cosine => cosine_similarity(vector, &record.vector),
                    Metric::Euclidean => euclidean_distance(vector, &record.vector),
                } as f64;
                ScoredRecord {
                    record: record.clone(),
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
        Ok(self.records.read().map_err(|_| poisoned())?.len())
    }

    fn score_kind(&self) -> ScoreKind {
        self.metric.score_kind()
    }
}
