//! Final passage selection: re-ranked when a cross-encoder is available,
//! fused order otherwise. The variant is fixed when the retriever is built.

use std::sync::Arc;
use std::time::Duration;

use ragdb_core::traits::Reranker;
use ragdb_core::types::Degradation;

use crate::fusion::Candidate;

pub enum Ranking {
    Reranked { reranker: Arc<dyn Reranker>, timeout: Duration },
    FusedOnly,
}

/// Selected candidates in final order, each with its re-ranker score if one
/// was computed.
pub struct Selection {
    pub ranked: Vec<(Candidate, Option<f32>)>,
    pub degradation: Option<Degradation>,
}

impl Ranking {
    pub fn new(reranker: Option<Arc<dyn Reranker>>, timeout: Duration) -> Self {
        match reranker {
            Some(reranker) => Self::Reranked { reranker, timeout },
            None => Self::FusedOnly,
        }
    }

    pub fn is_reranked(&self) -> bool {
        matches!(self, Self::Reranked { .. })
    }

    /// Pick the top `top_f` of `candidates` (already in fused order).
    /// `texts[i]` is the passage text of `candidates[i]`.
    pub async fn select(&self, query: &str, candidates: Vec<Candidate>, texts: Vec<String>, top_f: usize) -> Selection {
        let (reranker, timeout) = match self {
            Self::FusedOnly => return fused_top(candidates, top_f, Degradation::RerankerUnavailable),
            Self::Reranked { reranker, timeout } => (Arc::clone(reranker), *timeout),
        };
        if candidates.is_empty() {
            return Selection { ranked: Vec::new(), degradation: None };
        }

        let query = query.to_string();
        let expected = texts.len();
        let scoring = tokio::task::spawn_blocking(move || reranker.score(&query, &texts));
        let scores = match tokio::time::timeout(timeout, scoring).await {
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "re-ranking timed out, using fused order");
                return fused_top(candidates, top_f, Degradation::RerankerTimeout);
            }
            Ok(Err(join)) => return failed(candidates, top_f, join.to_string()),
            Ok(Ok(Err(e))) => return failed(candidates, top_f, e.to_string()),
            Ok(Ok(Ok(scores))) if scores.len() != expected => {
                return failed(candidates, top_f, format!("{} scores for {expected} passages", scores.len()));
            }
            Ok(Ok(Ok(scores))) => scores,
        };

        let mut ranked: Vec<(Candidate, f32)> = candidates
            .into_iter()
            .zip(scores)
            .map(|(c, s)| (c, if s.is_nan() { f32::NEG_INFINITY } else { s }))
            .collect();
        // Stable sort: equal scores keep their fused order.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(top_f);
        Selection { ranked: ranked.into_iter().map(|(c, s)| (c, Some(s))).collect(), degradation: None }
    }
}

fn failed(candidates: Vec<Candidate>, top_f: usize, reason: String) -> Selection {
    tracing::warn!(%reason, "re-ranking failed, using fused order");
    fused_top(candidates, top_f, Degradation::RerankerFailed(reason))
}

fn fused_top(mut candidates: Vec<Candidate>, top_f: usize, degradation: Degradation) -> Selection {
    candidates.truncate(top_f);
    Selection { ranked: candidates.into_iter().map(|c| (c, None)).collect(), degradation: Some(degradation) }
}
