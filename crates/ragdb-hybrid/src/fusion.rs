//! Reciprocal-rank fusion of the lexical and vector rankings.
//!
//! Each candidate scores `sum(1 / (rank + k))` over the lists it appears in,
//! with 1-based ranks. Ties go to the higher vector similarity, then to the
//! chunk inserted first.

use std::cmp::Ordering;
use std::collections::HashMap;

use ragdb_core::types::{ChunkId, SearchHit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub k: f32,
    /// Lexical score below which a candidate is discarded before fusion.
    /// Ignored when the lexical list is empty; 0 disables it.
    pub noise_floor: f32,
    pub limit: usize,
}

/// A query-scoped ranking of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk_id: ChunkId,
    pub lexical_score: Option<f32>,
    pub vector_score: Option<f32>,
    pub fused_score: f32,
    pub seq: u64,
}

/// Fuse two ranked lists. `seq` gives a chunk's insertion sequence number;
/// hits it does not know are dropped.
pub fn fuse<F>(lexical: &[SearchHit], vector: &[SearchHit], params: FusionParams, seq: F) -> Vec<Candidate>
where
    F: Fn(&str) -> Option<u64>,
{
    let mut by_id: HashMap<&str, Candidate> = HashMap::new();
    let lists = [(lexical, true), (vector, false)];
    for (hits, is_lexical) in lists {
        for (rank, hit) in hits.iter().enumerate() {
            let Some(seq_no) = seq(&hit.id) else { continue };
            let c = by_id.entry(hit.id.as_str()).or_insert_with(|| Candidate {
                chunk_id: hit.id.clone(),
                lexical_score: None,
                vector_score: None,
                fused_score: 0.0,
                seq: seq_no,
            });
            let slot = if is_lexical { &mut c.lexical_score } else { &mut c.vector_score };
            // A list may repeat an id; only its best rank counts.
            if slot.is_none() {
                *slot = Some(hit.score);
                c.fused_score += 1.0 / (rank as f32 + 1.0 + params.k);
            }
        }
    }

    let apply_floor = !lexical.is_empty() && params.noise_floor > 0.0;
    let mut candidates: Vec<Candidate> = by_id
        .into_values()
        .filter(|c| !apply_floor || c.lexical_score.unwrap_or(0.0) >= params.noise_floor)
        .collect();
    candidates.sort_by(compare);
    candidates.truncate(params.limit);
    candidates
}

fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| {
            let av = a.vector_score.unwrap_or(f32::NEG_INFINITY);
            let bv = b.vector_score.unwrap_or(f32::NEG_INFINITY);
            bv.total_cmp(&av)
        })
        .then(a.seq.cmp(&b.seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::types::SourceKind;

    fn hits(ids: &[(&str, f32)], source: SourceKind) -> Vec<SearchHit> {
        ids.iter().map(|(id, score)| SearchHit { id: id.to_string(), score: *score, source }).collect()
    }

    fn seq_of(id: &str) -> Option<u64> {
        id.strip_prefix('c').and_then(|n| n.parse().ok())
    }

    const PARAMS: FusionParams = FusionParams { k: 60.0, noise_floor: 0.0, limit: 10 };

    #[test]
    fn candidates_in_both_lists_rank_first() {
        let lexical = hits(&[("c1", 9.0), ("c2", 5.0)], SourceKind::Lexical);
        let vector = hits(&[("c3", 0.9), ("c2", 0.8)], SourceKind::Vector);
        let fused = fuse(&lexical, &vector, PARAMS, seq_of);
        let ids: Vec<_> = fused.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c3", "c1"]);
        assert!((fused[0].fused_score - (1.0 / 62.0 + 1.0 / 62.0)).abs() < 1e-7);
        assert_eq!(fused[0].lexical_score, Some(5.0));
        assert_eq!(fused[0].vector_score, Some(0.8));
    }

    #[test]
    fn equal_fused_scores_fall_back_to_vector_then_insertion_order() {
        // c3 and c1 both sit at rank 1 of one list; c3 has vector similarity.
        let lexical = hits(&[("c1", 3.0)], SourceKind::Lexical);
        let vector = hits(&[("c3", 0.5)], SourceKind::Vector);
        let ids: Vec<_> = fuse(&lexical, &vector, PARAMS, seq_of).into_iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec!["c3", "c1"]);

        let lexical = hits(&[("c7", 3.0), ("c9", 3.0)], SourceKind::Lexical);
        let vector = hits(&[("c9", 0.5), ("c7", 0.5)], SourceKind::Vector);
        let ids: Vec<_> = fuse(&lexical, &vector, PARAMS, seq_of).into_iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec!["c7", "c9"]);
    }

    #[test]
    fn noise_floor_drops_weak_lexical_matches_unless_lexical_is_empty() {
        let params = FusionParams { noise_floor: 1.0, ..PARAMS };
        let lexical = hits(&[("c1", 4.0), ("c2", 0.2)], SourceKind::Lexical);
        let vector = hits(&[("c5", 0.9), ("c2", 0.8)], SourceKind::Vector);
        let ids: Vec<_> = fuse(&lexical, &vector, params, seq_of).into_iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec!["c1"]);

        let ids: Vec<_> = fuse(&[], &vector, params, seq_of).into_iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec!["c5", "c2"]);
    }

    #[test]
    fn unknown_ids_are_dropped_and_limit_applies() {
        let vector = hits(&[("x", 0.99), ("c1", 0.9), ("c2", 0.8), ("c3", 0.7)], SourceKind::Vector);
        let params = FusionParams { limit: 2, ..PARAMS };
        let ids: Vec<_> = fuse(&[], &vector, params, seq_of).into_iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }
}
