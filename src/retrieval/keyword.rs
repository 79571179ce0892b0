//! Keyword search branch

use super::searcher::{gather, sort_by_score, BranchHits, CorpusSearcher, SearchRequest};
use super::{RetrievalError, RetrievalMethod, RetrievedChunk};
use crate::store::KeywordStore;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

/// Fraction of `keywords` found (case-insensitively) in title + content.
/// Zero when there are no keywords.
pub fn keyword_overlap(keywords: &[String], title: &str, content: &str) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }
    let text = format!("{} {}", title, content).to_lowercase();
    let matched = keywords
        .iter()
        .filter(|k| text.contains(&k.to_lowercase()))
        .count();
    matched as f32 / keywords.len() as f32
}

/// Scores store matches by keyword coverage
pub struct KeywordSearcher {
    store: Arc<dyn KeywordStore>,
}

impl KeywordSearcher {
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CorpusSearcher for KeywordSearcher {
    fn method(&self) -> RetrievalMethod {
        RetrievalMethod::Keyword
    }

    async fn search(
        &self,
        request: &SearchRequest,
        limit: usize,
    ) -> Result<BranchHits, RetrievalError> {
        let keywords = &request.query.keywords;
        if keywords.is_empty() {
            return Ok(BranchHits::default());
        }

        let lookups = request.corpora.iter().map(|&corpus| async move {
            let outcome = self
                .store
                .match_keywords(corpus, keywords)
                .await
                .map(|docs| {
                    let mut chunks: Vec<RetrievedChunk> = docs
                        .into_iter()
                        .filter_map(|doc| {
                            let score = keyword_overlap(keywords, &doc.title, &doc.content);
                            (score > 0.0).then(|| {
                                RetrievedChunk::from_document(doc, RetrievalMethod::Keyword, score)
                            })
                        })
                        .collect();
                    sort_by_score(&mut chunks, |c| c.scores.keyword.unwrap_or(0.0));
                    chunks.truncate(limit);
                    chunks
                })
                .map_err(|e| RetrievalError::store(RetrievalMethod::Keyword, Some(corpus), e));
            (corpus, outcome)
        });

        let outcomes = join_all(lookups).await;
        let mut chunks = gather(RetrievalMethod::Keyword, &request.query_hash, outcomes)?;
        sort_by_score(&mut chunks, |c| c.scores.keyword.unwrap_or(0.0));

        tracing::debug!(hits = chunks.len(), "Keyword search complete");
        Ok(BranchHits::new(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::DetectedCitations;
    use crate::patterns::PatternRegistry;
    use crate::query::{QueryNormalizer, QueryOptions};
    use crate::retrieval::Corpus;
    use crate::store::{InMemoryStore, StoredDocument};

    fn request(text: &str) -> SearchRequest {
        let registry = Arc::new(PatternRegistry::builtin().unwrap());
        SearchRequest {
            query: QueryNormalizer::new(registry, "HR").normalize(text, &QueryOptions::default()),
            citations: DetectedCitations::default(),
            corpora: Corpus::ALL.to_vec(),
            similarity_threshold: 0.7,
            query_hash: "test".to_string(),
        }
    }

    #[test]
    fn test_keyword_overlap() {
        let keywords = vec!["nalog".to_string(), "mobitel".to_string()];
        assert_eq!(keyword_overlap(&keywords, "Nalog", "pretraga stana"), 0.5);
        assert_eq!(keyword_overlap(&keywords, "NALOG", "oduzet Mobitel"), 1.0);
        assert_eq!(keyword_overlap(&[], "nalog", "mobitel"), 0.0);
    }

    #[tokio::test]
    async fn test_scored_by_coverage() {
        let store = InMemoryStore::new()
            .with_document(StoredDocument::new(Corpus::Laws, "one", "Nalog", "tekst"), None)
            .with_document(
                StoredDocument::new(Corpus::CaseDocuments, "both", "Nalog", "oduzet mobitel"),
                None,
            )
            .with_document(StoredDocument::new(Corpus::Laws, "none", "Ostalo", "tekst"), None);
        let searcher = KeywordSearcher::new(Arc::new(store));

        let hits = searcher.search(&request("nalog mobitel"), 10).await.unwrap();
        let ids: Vec<&str> = hits.chunks.iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids, vec!["both", "one"]);
        assert_eq!(hits.chunks[0].scores.keyword, Some(1.0));
        assert_eq!(hits.chunks[1].scores.keyword, Some(0.5));
    }

    #[tokio::test]
    async fn test_limit_per_corpus() {
        let mut store = InMemoryStore::new();
        for i in 0..5 {
            store.insert(
                StoredDocument::new(Corpus::Laws, format!("law-{}", i), "", "nalog"),
                None,
            );
        }
        let searcher = KeywordSearcher::new(Arc::new(store));
        let hits = searcher.search(&request("nalog"), 3).await.unwrap();
        assert_eq!(hits.chunks.len(), 3);
        assert_eq!(hits.chunks[0].id, "law-0");
    }

    #[tokio::test]
    async fn test_no_keywords() {
        let searcher = KeywordSearcher::new(Arc::new(InMemoryStore::new()));
        assert!(searcher.search(&request(""), 10).await.unwrap().chunks.is_empty());
    }
}
