//! Common contract of the three retrieval branches

use super::{Corpus, RetrievalError, RetrievalMethod, RetrievedChunk};
use crate::citations::DetectedCitations;
use crate::query::NormalizedQuery;
use async_trait::async_trait;

/// Inputs shared by every branch of one request
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: NormalizedQuery,
    pub citations: DetectedCitations,
    pub corpora: Vec<Corpus>,
    pub similarity_threshold: f32,
    /// Short hash of the raw query, carried into degrade logs
    pub query_hash: String,
}

/// A branch's ranked hits, best first
#[derive(Debug, Clone, Default)]
pub struct BranchHits {
    pub chunks: Vec<RetrievedChunk>,
    /// Set by the vector branch; MMR needs it
    pub query_embedding: Option<Vec<f32>>,
}

impl BranchHits {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            query_embedding: None,
        }
    }
}

#[async_trait]
pub trait CorpusSearcher: Send + Sync {
    fn method(&self) -> RetrievalMethod;

    /// Search every corpus of the request. A failing corpus is logged and
    /// skipped; the call errors only when every corpus failed.
    async fn search(&self, request: &SearchRequest, limit: usize)
        -> Result<BranchHits, RetrievalError>;
}

/// Collect per-corpus outcomes: failures are logged, successes concatenated.
/// Errors only when there was at least one corpus and every one failed.
pub(crate) fn gather<T>(
    method: RetrievalMethod,
    query_hash: &str,
    outcomes: Vec<(Corpus, Result<Vec<T>, RetrievalError>)>,
) -> Result<Vec<T>, RetrievalError> {
    let total = outcomes.len();
    let mut failures = 0;
    let mut last_error = None;
    let mut items = Vec::new();

    for (corpus, outcome) in outcomes {
        match outcome {
            Ok(mut found) => items.append(&mut found),
            Err(e) => {
                tracing::warn!(
                    method = %method,
                    corpus = %corpus,
                    query_hash = %query_hash,
                    error = %e,
                    "Corpus query failed, skipping corpus"
                );
                failures += 1;
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if failures == total => Err(e),
        _ => Ok(items),
    }
}

/// Stable sort by descending score
pub(crate) fn sort_by_score<F>(chunks: &mut [RetrievedChunk], score: F)
where
    F: Fn(&RetrievedChunk) -> f32,
{
    chunks.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
