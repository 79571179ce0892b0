//! Direct citation lookups

use super::searcher::{BranchHits, CorpusSearcher, SearchRequest};
use super::{ChunkKey, RetrievalError, RetrievalMethod, RetrievedChunk};
use crate::citations::Citation;
use crate::store::CitationGraph;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

/// Score given to a document reached by a direct citation match
pub const GRAPH_MATCH_SCORE: f32 = 0.95;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    LawNumber(String),
    CaseNumber(String),
}

/// Resolves gazette references and case numbers through the citation graph
pub struct CitationGraphSearcher {
    graph: Arc<dyn CitationGraph>,
}

impl CitationGraphSearcher {
    pub fn new(graph: Arc<dyn CitationGraph>) -> Self {
        Self { graph }
    }

    /// Case ids from the query first, then case-number and gazette citations
    fn lookups(request: &SearchRequest) -> Vec<Lookup> {
        let mut lookups: Vec<Lookup> = Vec::new();
        let mut push = |lookup: Lookup| {
            if !lookups.contains(&lookup) {
                lookups.push(lookup);
            }
        };

        for id in request.query.all_case_ids() {
            push(Lookup::CaseNumber(id.clone()));
        }
        for citation in request.citations.graph_lookups() {
            match (citation, citation.lookup_key()) {
                (Citation::Gazette { .. }, Some(key)) => push(Lookup::LawNumber(key)),
                (Citation::CaseNumber { .. }, Some(key)) => push(Lookup::CaseNumber(key)),
                _ => {}
            }
        }
        lookups
    }
}

#[async_trait]
impl CorpusSearcher for CitationGraphSearcher {
    fn method(&self) -> RetrievalMethod {
        RetrievalMethod::GraphCitation
    }

    async fn search(
        &self,
        request: &SearchRequest,
        limit: usize,
    ) -> Result<BranchHits, RetrievalError> {
        let lookups = Self::lookups(request);
        if lookups.is_empty() {
            return Ok(BranchHits::default());
        }

        let results = join_all(lookups.iter().map(|lookup| async move {
            match lookup {
                Lookup::LawNumber(number) => self.graph.lookup_by_law_number(number).await,
                Lookup::CaseNumber(pattern) => self.graph.lookup_by_case_number(pattern).await,
            }
        }))
        .await;

        let total = results.len();
        let mut failures = 0;
        let mut last_error = None;
        let mut seen: HashSet<ChunkKey> = HashSet::new();
        let mut chunks = Vec::new();

        for (lookup, result) in lookups.iter().zip(results) {
            match result {
                Ok(docs) => {
                    for doc in docs {
                        if !request.corpora.contains(&doc.corpus) {
                            continue;
                        }
                        let chunk = RetrievedChunk::from_document(
                            doc,
                            RetrievalMethod::GraphCitation,
                            GRAPH_MATCH_SCORE,
                        );
                        if seen.insert(chunk.key()) {
                            chunks.push(chunk);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        method = %RetrievalMethod::GraphCitation,
                        lookup = ?lookup,
                        query_hash = %request.query_hash,
                        error = %e,
                        "Citation lookup failed, skipping"
                    );
                    failures += 1;
                    last_error = Some(RetrievalError::store(
                        RetrievalMethod::GraphCitation,
                        None,
                        e,
                    ));
                }
            }
        }

        if let Some(e) = last_error {
            if failures == total {
                return Err(e);
            }
        }

        chunks.truncate(limit);
        tracing::debug!(lookups = total, hits = chunks.len(), "Citation lookups complete");
        Ok(BranchHits::new(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::CitationDetector;
    use crate::patterns::PatternRegistry;
    use crate::query::{QueryNormalizer, QueryOptions};
    use crate::retrieval::Corpus;
    use crate::store::{InMemoryStore, StoredDocument, LAW_NUMBER_KEY};

    fn request(text: &str, corpora: Vec<Corpus>) -> SearchRequest {
        let registry = Arc::new(PatternRegistry::builtin().unwrap());
        let query = QueryNormalizer::new(registry.clone(), "HR").normalize(text, &QueryOptions::default());
        let citations = CitationDetector::new(registry).analyze(&query.cleaned_text);
        SearchRequest {
            query,
            citations,
            corpora,
            similarity_threshold: 0.7,
            query_hash: "test".to_string(),
        }
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_document(
                StoredDocument::new(Corpus::Laws, "zkp", "Zakon o kaznenom postupku", "")
                    .with_metadata(LAW_NUMBER_KEY, "70/2017"),
                None,
            )
            .with_document(
                StoredDocument::new(Corpus::CaseDocuments, "Pp-2343/2025-nalog", "Nalog", ""),
                None,
            )
            .with_document(
                StoredDocument::new(Corpus::CourtDecisions, "Pp-2343/2025-rjesenje", "Rješenje", ""),
                None,
            )
    }

    #[tokio::test]
    async fn test_case_and_gazette_lookup() {
        let searcher = CitationGraphSearcher::new(Arc::new(store()));
        let hits = searcher
            .search(&request("Pp-2343/2025 prema ZKP (NN 70/17)", Corpus::ALL.to_vec()), 20)
            .await
            .unwrap();

        let ids: Vec<&str> = hits.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["Pp-2343/2025-nalog", "Pp-2343/2025-rjesenje", "zkp"]);
        assert!(hits
            .chunks
            .iter()
            .all(|c| c.scores.graph_boost == Some(GRAPH_MATCH_SCORE)));
    }

    #[tokio::test]
    async fn test_corpus_filter_and_limit() {
        let searcher = CitationGraphSearcher::new(Arc::new(store()));

        let hits = searcher
            .search(&request("Pp-2343/2025", vec![Corpus::CourtDecisions]), 20)
            .await
            .unwrap();
        assert_eq!(hits.chunks.len(), 1);

        let hits = searcher
            .search(&request("Pp-2343/2025", Corpus::ALL.to_vec()), 1)
            .await
            .unwrap();
        assert_eq!(hits.chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_no_citations() {
        let searcher = CitationGraphSearcher::new(Arc::new(store()));
        let hits = searcher
            .search(&request("pretraga mobitela", Corpus::ALL.to_vec()), 20)
            .await
            .unwrap();
        assert!(hits.chunks.is_empty());
    }
}
