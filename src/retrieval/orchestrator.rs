//! End-to-end retrieval: normalize, detect, fan out, fuse, diversify, cap,
//! score, enrich

use super::searcher::{BranchHits, CorpusSearcher, SearchRequest};
use super::{
    ChunkKey, CitationGraphSearcher, ConfidenceScorer, Corpus, CorpusCapper, Diversifier,
    KeywordSearcher, MetadataEnricher, RankFuser, RetrievalError, RetrievalMethod,
    RetrievalOptions, RetrievalResult, RetrievalStats, RetrievedChunk, VectorSearcher,
};
use crate::citations::CitationDetector;
use crate::patterns::PatternRegistry;
use crate::query::QueryNormalizer;
use crate::store::{CitationGraph, Embedder, KeywordStore, VectorStore};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// First 16 hex chars of the blake3 hash of the raw query
pub fn query_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().as_str()[..16].to_string()
}

/// Aborts the branch tasks when the request future is dropped
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Stateless retrieval pipeline over the external stores
#[derive(Clone)]
pub struct Orchestrator {
    normalizer: QueryNormalizer,
    detector: CitationDetector,
    vector: Arc<dyn CorpusSearcher>,
    keyword: Arc<dyn CorpusSearcher>,
    graph: Arc<dyn CorpusSearcher>,
    vector_store: Arc<dyn VectorStore>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<PatternRegistry>,
        default_jurisdiction: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        keyword_store: Arc<dyn KeywordStore>,
        graph: Arc<dyn CitationGraph>,
    ) -> Self {
        Self {
            normalizer: QueryNormalizer::new(registry.clone(), default_jurisdiction),
            detector: CitationDetector::new(registry),
            vector: Arc::new(VectorSearcher::new(embedder, vector_store.clone())),
            keyword: Arc::new(KeywordSearcher::new(keyword_store)),
            graph: Arc::new(CitationGraphSearcher::new(graph)),
            vector_store,
        }
    }

    /// Replace the branch searchers (vector, keyword, graph)
    pub fn with_searchers(
        mut self,
        vector: Arc<dyn CorpusSearcher>,
        keyword: Arc<dyn CorpusSearcher>,
        graph: Arc<dyn CorpusSearcher>,
    ) -> Self {
        self.vector = vector;
        self.keyword = keyword;
        self.graph = graph;
        self
    }

    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<RetrievalResult, RetrievalError> {
        self.retrieve_with_cancel(query, options, &CancellationToken::new())
            .await
    }

    /// Run the pipeline. Branch failures degrade to empty branches; only
    /// cancellation and invalid options are returned as errors.
    pub async fn retrieve_with_cancel(
        &self,
        query: &str,
        options: &RetrievalOptions,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult, RetrievalError> {
        options.validate()?;
        let started = Instant::now();
        let hash = query_hash(query);

        let normalized = self.normalizer.normalize(query, &options.query_options());
        let citations = self.detector.analyze(&normalized.cleaned_text);
        tracing::debug!(
            query_hash = %hash,
            keywords = normalized.keywords.len(),
            specific_refs = citations.has_specific_refs(),
            "Query analyzed"
        );

        let request = Arc::new(SearchRequest {
            query: normalized,
            citations,
            corpora: options.corpora.iter().copied().collect(),
            similarity_threshold: options.similarity_threshold,
            query_hash: hash.clone(),
        });

        let branches = self.run_branches(&request, options, cancel).await?;

        let mut stats = RetrievalStats::default();
        let mut lists: Vec<(RetrievalMethod, Vec<RetrievedChunk>)> = Vec::new();
        let mut query_embedding = None;

        for (method, outcome) in branches {
            match outcome {
                Ok(hits) => {
                    let BranchHits {
                        mut chunks,
                        query_embedding: embedding,
                    } = hits;
                    chunks.retain(|c| options.matches_filters(c));
                    match method {
                        RetrievalMethod::Vector => {
                            stats.vector_count = chunks.len();
                            query_embedding = embedding;
                        }
                        RetrievalMethod::Keyword => stats.keyword_count = chunks.len(),
                        RetrievalMethod::GraphCitation => stats.graph_count = chunks.len(),
                    }
                    lists.push((method, chunks));
                }
                Err(e) => {
                    tracing::warn!(
                        method = %method,
                        query_hash = %hash,
                        error = %e,
                        "Retrieval branch failed, continuing without it"
                    );
                    stats.failed_methods.push(method);
                }
            }
        }

        let request = Arc::try_unwrap(request).unwrap_or_else(|shared| (*shared).clone());

        if lists.is_empty() {
            tracing::warn!(
                query_hash = %hash,
                error = %RetrievalError::AllBranchesFailed,
                "Returning empty result"
            );
            stats.all_branches_failed = true;
            stats.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(RetrievalResult {
                normalized_query: request.query,
                citations_detected: request.citations,
                chunks: Vec::new(),
                retrieval_stats: stats,
            });
        }

        let fuser = RankFuser::new(options.rrf_k);
        let fused = fuser.apply_weights(fuser.fuse(&lists), &options.weights);
        stats.merged_count = fused.len();
        tracing::debug!(query_hash = %hash, merged = fused.len(), "Branches fused");

        let ranked = match query_embedding.filter(|_| options.diversify && !fused.is_empty()) {
            Some(embedding) => {
                let embeddings =
                    cancellable(cancel, self.candidate_embeddings(&fused, &hash)).await?;
                match embeddings {
                    Some(embeddings) => Diversifier::new(options.mmr_lambda, options.top_k)
                        .with_weights(options.weights.clone())
                        .diversify(fused, &embedding, &embeddings),
                    None => truncated(fused, options.top_k),
                }
            }
            None => truncated(fused, options.top_k),
        };
        tracing::debug!(query_hash = %hash, selected = ranked.len(), "Candidates ranked");

        let capped = CorpusCapper::new(options.corpus_caps.clone()).cap(ranked);
        let mut chunks = ConfidenceScorer::new(options.min_confidence).apply(capped, &request.query);
        MetadataEnricher.enrich(&mut chunks, &request.query);

        stats.final_count = chunks.len();
        stats.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            query_hash = %hash,
            vector = stats.vector_count,
            keyword = stats.keyword_count,
            graph = stats.graph_count,
            merged = stats.merged_count,
            returned = stats.final_count,
            duration_ms = stats.duration_ms,
            "Retrieval complete"
        );

        Ok(RetrievalResult {
            normalized_query: request.query,
            citations_detected: request.citations,
            chunks,
            retrieval_stats: stats,
        })
    }

    /// Spawn the three branches, each under the optional branch timeout, and
    /// wait for all of them unless cancelled first
    async fn run_branches(
        &self,
        request: &Arc<SearchRequest>,
        options: &RetrievalOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<(RetrievalMethod, Result<BranchHits, RetrievalError>)>, RetrievalError> {
        let branches = [
            (self.vector.clone(), options.vector_limit),
            (self.keyword.clone(), options.keyword_limit),
            (self.graph.clone(), options.graph_limit),
        ];
        let timeout = options.branch_timeout();

        let mut methods = Vec::with_capacity(branches.len());
        let mut handles = Vec::with_capacity(branches.len());
        for (searcher, limit) in branches {
            let request = request.clone();
            let method = searcher.method();
            methods.push(method);
            handles.push(tokio::spawn(async move {
                match timeout {
                    Some(limit_after) => {
                        match tokio::time::timeout(limit_after, searcher.search(&request, limit))
                            .await
                        {
                            Ok(outcome) => outcome,
                            Err(_) => Err(RetrievalError::StoreTimeout {
                                method,
                                timeout_ms: limit_after.as_millis() as u64,
                            }),
                        }
                    }
                    None => searcher.search(&request, limit).await,
                }
            }));
        }

        let _guard = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());
        let joined = cancellable(cancel, join_all(handles)).await?;

        Ok(methods
            .into_iter()
            .zip(joined)
            .map(|(method, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(RetrievalError::store(method, None, format!("branch task failed: {}", e)))
                });
                (method, outcome)
            })
            .collect())
    }

    /// Stored embeddings for the fused candidates, fetched per corpus.
    /// `None` when the lookup failed, which bypasses MMR.
    async fn candidate_embeddings(
        &self,
        candidates: &[RetrievedChunk],
        hash: &str,
    ) -> Option<HashMap<ChunkKey, Vec<f32>>> {
        let mut by_corpus: BTreeMap<Corpus, Vec<String>> = BTreeMap::new();
        for chunk in candidates {
            by_corpus.entry(chunk.corpus).or_default().push(chunk.id.clone());
        }

        let fetches = by_corpus.iter().map(|(corpus, ids)| async move {
            (*corpus, self.vector_store.embeddings(*corpus, ids).await)
        });

        let mut embeddings = HashMap::new();
        for (corpus, outcome) in join_all(fetches).await {
            match outcome {
                Ok(found) => {
                    embeddings.extend(found.into_iter().map(|(id, v)| ((corpus, id), v)));
                }
                Err(e) => {
                    tracing::warn!(
                        method = %RetrievalMethod::Vector,
                        corpus = %corpus,
                        query_hash = %hash,
                        error = %e,
                        "Embedding lookup failed, using fused order"
                    );
                    return None;
                }
            }
        }
        Some(embeddings)
    }
}

fn truncated(mut chunks: Vec<RetrievedChunk>, top_k: usize) -> Vec<RetrievedChunk> {
    chunks.truncate(top_k);
    chunks
}

/// Race `fut` against the cancellation token
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, RetrievalError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RetrievalError::Cancelled),
        output = fut => Ok(output),
    }
}
