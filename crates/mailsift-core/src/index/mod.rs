//! Vector index abstraction.
//!
//! A [`VectorIndex`] stores [`VectorRecord`]s keyed by `record_id` and
//! answers k-nearest-neighbour queries. Backends report whether their raw
//! scores are similarities (higher is closer) or distances (lower is
//! closer) through [`ScoreKind`]; callers never rely on the backend's
//! native sort order, see [`crate::rank`].
//!
//! Implementations must be `Send + Sync` to be shared across tasks.

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::VectorRecord;

/// Direction of the raw scores an index returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    /// Higher raw score means more relevant (e.g. cosine similarity).
    Similarity,
    /// Lower raw score means more relevant (e.g. L2 distance).
    Distance,
}

impl ScoreKind {
    /// Map a raw score onto the "higher = more relevant" scale.
    ///
    /// Similarities pass through; a distance `d` becomes `1 / (1 + d)`.
    ///
    /// ```rust
    /// use mailsift_core::index::ScoreKind;
    ///
    /// assert_eq!(ScoreKind::Similarity.to_relevance(0.25), 0.25);
    /// assert_eq!(ScoreKind::Distance.to_relevance(0.0), 1.0);
    /// assert!(ScoreKind::Distance.to_relevance(1.0) > ScoreKind::Distance.to_relevance(2.0));
    /// ```
    pub fn to_relevance(&self, raw: f64) -> f64 {
        match self {
            ScoreKind::Similarity => raw,
            ScoreKind::Distance => 1.0 / (1.0 + raw.max(0.0)),
        }
    }
}

/// Distance function used by an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cosine,
    Euclidean,
}

impl Metric {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            other => bail!("Unknown index metric: {}. Use cosine or euclidean.", other),
        }
    }

    pub fn score_kind(&self) -> ScoreKind {
        match self {
            Metric::Cosine => ScoreKind::Similarity,
            Metric::Euclidean => ScoreKind::Distance,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
        }
    }
}

/// A record returned by [`VectorIndex::query`] with its raw score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f64,
}

/// Storage and k-NN lookup of embedded chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or overwrite records by `record_id`, all or none |
/// | [`query`](VectorIndex::query) | Up to `k` nearest records with raw scores |
/// | [`count`](VectorIndex::count) | Number of stored records |
/// | [`score_kind`](VectorIndex::score_kind) | Direction of the raw scores |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite records. A failed call stores none of them.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Up to `k` records closest to `vector`.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>>;

    async fn count(&self) -> Result<usize>;

    fn score_kind(&self) -> ScoreKind;
}
