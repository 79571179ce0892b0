//! Reciprocal Rank Fusion for combining the branch rankings

use super::{ChunkKey, RetrievalMethod, RetrievedChunk};
use crate::retrieval::Corpus;
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeMap;

/// Merges ranked lists by `(corpus, id)` with Reciprocal Rank Fusion
#[derive(Debug, Clone, Copy)]
pub struct RankFuser {
    /// RRF K constant (typically 60)
    pub k: u32,
}

impl RankFuser {
    pub fn new(k: u32) -> Self {
        Self { k }
    }

    /// Contribution of a zero-based rank: 1 / (k + rank + 1)
    pub fn contribution(&self, rank: usize) -> f32 {
        1.0 / (self.k as f32 + rank as f32 + 1.0)
    }

    /// Fuse the lists into one ranking, best first.
    ///
    /// Each chunk's RRF score is the sum of its contributions; branch scores,
    /// methods and per-method ranks are merged onto one entry. Equal scores
    /// keep first-appearance order, and `fused_rank` records the final
    /// position.
    pub fn fuse(&self, lists: &[(RetrievalMethod, Vec<RetrievedChunk>)]) -> Vec<RetrievedChunk> {
        let mut index: AHashMap<ChunkKey, usize> = AHashMap::new();
        let mut fused: Vec<RetrievedChunk> = Vec::new();
        let mut counted: AHashSet<(usize, RetrievalMethod)> = AHashSet::new();

        for (method, chunks) in lists {
            for (rank, chunk) in chunks.iter().enumerate() {
                let contribution = self.contribution(rank);
                let slot = *index.entry(chunk.key()).or_insert_with(|| {
                    let mut fresh = chunk.clone();
                    fresh.rank_sources.clear();
                    fresh.scores.rrf = Some(0.0);
                    fused.push(fresh);
                    fused.len() - 1
                });

                // A repeat within one list only counts at its best rank
                if !counted.insert((slot, *method)) {
                    continue;
                }
                let entry = &mut fused[slot];
                entry.absorb(chunk);
                entry.rank_sources.insert(*method, rank);
                *entry.scores.rrf.get_or_insert(0.0) += contribution;
            }
        }

        sort_by_rrf(&mut fused);
        fused
    }

    /// Multiply each fused score by its corpus weight and re-rank
    pub fn apply_weights(
        &self,
        mut chunks: Vec<RetrievedChunk>,
        weights: &BTreeMap<Corpus, f32>,
    ) -> Vec<RetrievedChunk> {
        if weights.values().all(|w| *w == 1.0) {
            return chunks;
        }
        for chunk in &mut chunks {
            let weight = weights.get(&chunk.corpus).copied().unwrap_or(1.0);
            if let Some(rrf) = chunk.scores.rrf.as_mut() {
                *rrf *= weight;
            }
        }
        sort_by_rrf(&mut chunks);
        chunks
    }
}

impl Default for RankFuser {
    fn default() -> Self {
        Self::new(super::DEFAULT_RRF_K)
    }
}

fn sort_by_rrf(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        let (a, b) = (a.scores.rrf.unwrap_or(0.0), b.scores.rrf.unwrap_or(0.0));
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    });
    for (rank, chunk) in chunks.iter_mut().enumerate() {
        chunk.fused_rank = Some(rank);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoredDocument;

    fn hit(corpus: Corpus, id: &str, method: RetrievalMethod) -> RetrievedChunk {
        RetrievedChunk::from_document(StoredDocument::new(corpus, id, "", ""), method, 0.5)
    }

    fn list(method: RetrievalMethod, ids: &[&str]) -> (RetrievalMethod, Vec<RetrievedChunk>) {
        (
            method,
            ids.iter().map(|id| hit(Corpus::Laws, id, method)).collect(),
        )
    }

    #[test]
    fn test_rrf_basic() {
        let fuser = RankFuser::default();
        let fused = fuser.fuse(&[
            list(RetrievalMethod::Vector, &["a", "b", "c"]),
            list(RetrievalMethod::Keyword, &["b", "a", "d"]),
        ]);

        assert_eq!(fused.len(), 4);
        // a and b appear in both lists with mirrored ranks: tie, a came first
        assert_eq!(fused[0].id, "a");
        assert_eq!(fused[1].id, "b");
        assert_eq!(fused[0].fused_rank, Some(0));
        assert_eq!(fused[0].rank_sources[&RetrievalMethod::Keyword], 1);
    }

    #[test]
    fn test_repeat_within_one_list_counts_once() {
        let fuser = RankFuser::default();
        let fused = fuser.fuse(&[list(RetrievalMethod::Vector, &["a", "a"])]);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].rank_sources[&RetrievalMethod::Vector], 0);
        assert!((fused[0].scores.rrf.unwrap() - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_same_id_in_different_corpora_stays_apart() {
        let fuser = RankFuser::default();
        let fused = fuser.fuse(&[
            (
                RetrievalMethod::Vector,
                vec![hit(Corpus::Laws, "x", RetrievalMethod::Vector)],
            ),
            (
                RetrievalMethod::Keyword,
                vec![hit(Corpus::CourtDecisions, "x", RetrievalMethod::Keyword)],
            ),
        ]);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_weights_rerank() {
        let fuser = RankFuser::default();
        let fused = fuser.fuse(&[(
            RetrievalMethod::Vector,
            vec![
                hit(Corpus::Laws, "law", RetrievalMethod::Vector),
                hit(Corpus::CourtDecisions, "decision", RetrievalMethod::Vector),
            ],
        )]);

        let weights = BTreeMap::from([(Corpus::CourtDecisions, 2.0)]);
        let weighted = fuser.apply_weights(fused, &weights);

        assert_eq!(weighted[0].id, "decision");
        assert_eq!(weighted[0].fused_rank, Some(0));
        let expected = 2.0 * fuser.contribution(1);
        assert!((weighted[0].scores.rrf.unwrap() - expected).abs() < 1e-6);
    }
}
