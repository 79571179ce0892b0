//! Semantic search branch

use super::searcher::{gather, sort_by_score, BranchHits, CorpusSearcher, SearchRequest};
use super::{RetrievalError, RetrievalMethod, RetrievedChunk};
use crate::store::{Embedder, VectorStore};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

/// Embeds the query once, then asks the vector store per corpus
pub struct VectorSearcher {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl VectorSearcher {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl CorpusSearcher for VectorSearcher {
    fn method(&self) -> RetrievalMethod {
        RetrievalMethod::Vector
    }

    async fn search(
        &self,
        request: &SearchRequest,
        limit: usize,
    ) -> Result<BranchHits, RetrievalError> {
        if request.query.is_empty() {
            return Ok(BranchHits::default());
        }

        let embedding = self
            .embedder
            .embed(&request.query.cleaned_text)
            .await
            .map_err(|e| RetrievalError::EmbeddingFailure(e.to_string()))?;

        let threshold = request.similarity_threshold;
        let lookups = request.corpora.iter().map(|&corpus| {
            let embedding = &embedding;
            async move {
                let outcome = self
                    .store
                    .top_k_similar(corpus, embedding, limit, threshold)
                    .await
                    .map(|hits| {
                        let mut chunks: Vec<RetrievedChunk> = hits
                            .into_iter()
                            .filter(|hit| hit.score >= threshold)
                            .map(|hit| {
                                RetrievedChunk::from_document(
                                    hit.document,
                                    RetrievalMethod::Vector,
                                    hit.score,
                                )
                            })
                            .collect();
                        sort_by_score(&mut chunks, |c| c.scores.vector.unwrap_or(0.0));
                        chunks.truncate(limit);
                        chunks
                    })
                    .map_err(|e| RetrievalError::store(RetrievalMethod::Vector, Some(corpus), e));
                (corpus, outcome)
            }
        });

        let outcomes = join_all(lookups).await;
        let mut chunks = gather(RetrievalMethod::Vector, &request.query_hash, outcomes)?;
        sort_by_score(&mut chunks, |c| c.scores.vector.unwrap_or(0.0));

        tracing::debug!(hits = chunks.len(), "Vector search complete");

        Ok(BranchHits {
            chunks,
            query_embedding: Some(embedding),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::DetectedCitations;
    use crate::query::{NormalizedQuery, QueryNormalizer, QueryOptions};
    use crate::patterns::PatternRegistry;
    use crate::retrieval::Corpus;
    use crate::store::{InMemoryStore, StaticEmbedder, StoredDocument};

    fn query(text: &str) -> NormalizedQuery {
        let registry = Arc::new(PatternRegistry::builtin().unwrap());
        QueryNormalizer::new(registry, "HR").normalize(text, &QueryOptions::default())
    }

    fn request(text: &str) -> SearchRequest {
        SearchRequest {
            query: query(text),
            citations: DetectedCitations::default(),
            corpora: Corpus::ALL.to_vec(),
            similarity_threshold: 0.7,
            query_hash: "test".to_string(),
        }
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_document(
                StoredDocument::new(Corpus::Laws, "close", "", "pretraga"),
                Some(vec![0.9, 0.1]),
            )
            .with_document(
                StoredDocument::new(Corpus::CourtDecisions, "closest", "", "pretraga"),
                Some(vec![1.0, 0.0]),
            )
            .with_document(
                StoredDocument::new(Corpus::Laws, "far", "", "drugo"),
                Some(vec![0.0, 1.0]),
            )
    }

    #[tokio::test]
    async fn test_threshold_and_ordering_across_corpora() {
        let embedder = Arc::new(StaticEmbedder::new().with_fallback(vec![1.0, 0.0]));
        let searcher = VectorSearcher::new(embedder, Arc::new(store()));

        let hits = searcher.search(&request("pretraga"), 10).await.unwrap();
        let ids: Vec<&str> = hits.chunks.iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids, vec!["closest", "close"]);
        assert_eq!(hits.query_embedding, Some(vec![1.0, 0.0]));
    }

    #[tokio::test]
    async fn test_empty_query_skips_embedding() {
        let searcher = VectorSearcher::new(Arc::new(StaticEmbedder::offline()), Arc::new(store()));
        let hits = searcher.search(&request(""), 10).await.unwrap();
        assert!(hits.chunks.is_empty());
        assert!(hits.query_embedding.is_none());
    }

    #[tokio::test]
    async fn test_embedding_failure() {
        let searcher = VectorSearcher::new(Arc::new(StaticEmbedder::offline()), Arc::new(store()));
        assert!(matches!(
            searcher.search(&request("pretraga"), 10).await,
            Err(RetrievalError::EmbeddingFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_corpus_degrades() {
        let embedder = Arc::new(StaticEmbedder::new().with_fallback(vec![1.0, 0.0]));
        let store = store().with_failing_corpus(Corpus::Laws);
        let searcher = VectorSearcher::new(embedder, Arc::new(store));

        let hits = searcher.search(&request("pretraga"), 10).await.unwrap();
        assert_eq!(hits.chunks.len(), 1);
        assert_eq!(hits.chunks[0].corpus, Corpus::CourtDecisions);
    }
}
