//! Final confidence scoring

use super::keyword::keyword_overlap;
use super::{RetrievalMethod, RetrievedChunk};
use crate::query::NormalizedQuery;
use std::cmp::Ordering;

pub const PRIMARY_WEIGHT: f32 = 0.4;
pub const GRAPH_WEIGHT: f32 = 0.3;
pub const KEYWORD_OVERLAP_WEIGHT: f32 = 0.2;
pub const CORROBORATION_WEIGHT: f32 = 0.1;

/// RRF scores are divided by this before clamping into [0, 1]
pub const RRF_SCALE: f32 = 10.0;

/// Scores, filters and orders the surviving chunks
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    pub min_confidence: f32,
}

impl ConfidenceScorer {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    /// MMR score if present, else the scaled RRF score, else the best raw
    /// branch score; clamped to [0, 1]
    pub fn primary_score(chunk: &RetrievedChunk) -> f32 {
        let scores = &chunk.scores;
        let primary = scores
            .mmr
            .or_else(|| scores.rrf.map(|rrf| (rrf / RRF_SCALE).min(1.0)))
            .or_else(|| scores.raw())
            .unwrap_or(0.0);
        primary.clamp(0.0, 1.0)
    }

    pub fn score(&self, chunk: &RetrievedChunk, query: &NormalizedQuery) -> f32 {
        let graph = if chunk.retrieval_methods.contains(&RetrievalMethod::GraphCitation) {
            1.0
        } else {
            0.0
        };
        let corroborated = if chunk.is_corroborated() { 1.0 } else { 0.0 };
        let overlap = keyword_overlap(&query.keywords, &chunk.title, &chunk.content);

        let confidence = PRIMARY_WEIGHT * Self::primary_score(chunk)
            + GRAPH_WEIGHT * graph
            + KEYWORD_OVERLAP_WEIGHT * overlap
            + CORROBORATION_WEIGHT * corroborated;
        confidence.clamp(0.0, 1.0)
    }

    /// Score every chunk, drop those below the threshold, and order by
    /// descending confidence with ties kept in fused-rank order
    pub fn apply(&self, chunks: Vec<RetrievedChunk>, query: &NormalizedQuery) -> Vec<RetrievedChunk> {
        let mut kept: Vec<RetrievedChunk> = chunks
            .into_iter()
            .filter_map(|mut chunk| {
                let confidence = self.score(&chunk, query);
                chunk.scores.confidence = Some(confidence);
                (confidence >= self.min_confidence).then_some(chunk)
            })
            .collect();

        kept.sort_by(|a, b| {
            b.confidence()
                .partial_cmp(&a.confidence())
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    let rank = |c: &RetrievedChunk| c.fused_rank.unwrap_or(usize::MAX);
                    rank(a).cmp(&rank(b))
                })
        });
        kept
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(super::DEFAULT_MIN_CONFIDENCE)
    }
}
