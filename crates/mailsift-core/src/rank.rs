//! Turning raw index hits into ranked [`SearchResult`]s.
//!
//! Indices disagree on score direction, so ranking never trusts the order a
//! backend returned: every raw score is first mapped onto the
//! "higher = more relevant" scale via [`ScoreKind::to_relevance`], then the
//! hits are sorted here.
//!
//! Sort order: relevance (desc), then `record_id` (asc) for stable ties.

use crate::index::{ScoreKind, ScoredRecord};
use crate::models::SearchResult;

/// Rank raw hits best-first and keep at most `top_k`.
pub fn rank(hits: Vec<ScoredRecord>, kind: ScoreKind, top_k: usize) -> Vec<SearchResult> {
    let mut scored: Vec<(f64, ScoredRecord)> = hits
        .into_iter()
        .filter(|hit| hit.score.is_finite())
        .map(|hit| (kind.to_relevance(hit.score), hit))
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.record_id.cmp(&b.record.record_id))
    });
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(score, hit)| {
            let meta = hit.record.metadata;
            SearchResult {
                text: meta.text,
                message_id: meta.message_id,
                chunk_index: meta.chunk_index,
                score,
                subject: meta.subject,
                sender: meta.sender,
                date: meta.date,
            }
        })
        .collect()
}
