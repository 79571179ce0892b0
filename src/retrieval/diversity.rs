//! Maximal Marginal Relevance re-ranking

use super::{ChunkKey, Corpus, RetrievedChunk};
use crate::embedding::cosine_similarity;
use std::collections::{BTreeMap, HashMap};

/// Greedy MMR selection over candidate embeddings
#[derive(Debug, Clone)]
pub struct Diversifier {
    /// Relevance vs. novelty trade-off in [0, 1]
    pub lambda: f32,
    pub top_k: usize,
    /// Per-corpus relevance multipliers; missing corpora weigh 1.0
    pub weights: BTreeMap<Corpus, f32>,
}

impl Diversifier {
    pub fn new(lambda: f32, top_k: usize) -> Self {
        Self {
            lambda,
            top_k,
            weights: BTreeMap::new(),
        }
    }

    pub fn with_weights(mut self, weights: BTreeMap<Corpus, f32>) -> Self {
        self.weights = weights;
        self
    }

    fn weight(&self, corpus: Corpus) -> f32 {
        self.weights.get(&corpus).copied().unwrap_or(1.0)
    }

    /// Select up to `top_k` candidates, each maximizing
    /// `λ·w·sim(d, query) − (1−λ)·max sim(d, selected)`, where `w` is the
    /// candidate's corpus weight.
    ///
    /// Candidates without an embedding in `embeddings`, or whose similarity
    /// cannot be computed, are never selected. Equal scores go to the
    /// earlier candidate. Each selected chunk carries its MMR score.
    pub fn diversify(
        &self,
        candidates: Vec<RetrievedChunk>,
        query_embedding: &[f32],
        embeddings: &HashMap<ChunkKey, Vec<f32>>,
    ) -> Vec<RetrievedChunk> {
        let total = candidates.len();
        let mut pool: Vec<(RetrievedChunk, &Vec<f32>, f32)> = candidates
            .into_iter()
            .filter_map(|chunk| {
                let embedding = embeddings.get(&chunk.key())?;
                let relevance =
                    cosine_similarity(query_embedding, embedding)? * self.weight(chunk.corpus);
                Some((chunk, embedding, relevance))
            })
            .collect();

        if pool.len() < total {
            tracing::debug!(
                skipped = total - pool.len(),
                "MMR candidates without a usable embedding skipped"
            );
        }

        let mut selected: Vec<RetrievedChunk> = Vec::new();
        let mut selected_embeddings: Vec<&Vec<f32>> = Vec::new();

        while selected.len() < self.top_k && !pool.is_empty() {
            let mut best: Option<(usize, f32)> = None;

            for (i, (_, embedding, relevance)) in pool.iter().enumerate() {
                let redundancy = selected_embeddings
                    .iter()
                    .filter_map(|s| cosine_similarity(embedding, s))
                    .fold(None, |max: Option<f32>, sim| Some(max.map_or(sim, |m| m.max(sim))))
                    .unwrap_or(0.0);

                let score = self.lambda * relevance - (1.0 - self.lambda) * redundancy;
                if !score.is_finite() {
                    continue;
                }
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((i, score));
                }
            }

            let Some((i, score)) = best else {
                break;
            };
            let (mut chunk, embedding, _) = pool.remove(i);
            chunk.scores.mmr = Some(score);
            selected.push(chunk);
            selected_embeddings.push(embedding);
        }

        selected
    }
}

impl Default for Diversifier {
    fn default() -> Self {
        Self::new(super::DEFAULT_MMR_LAMBDA, super::DEFAULT_TOP_K)
    }
}
