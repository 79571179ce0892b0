//! Integration Test: end-to-end retrieval
//!
//! Runs the full pipeline (normalize, detect, fan out, fuse, diversify,
//! cap, score, enrich) against in-memory collaborators.

use async_trait::async_trait;
use lexfuse::patterns::PatternRegistry;
use lexfuse::retrieval::{
    BranchHits, Corpus, CorpusSearcher, Orchestrator, RetrievalError, RetrievalMethod,
    RetrievalOptions, SearchRequest, CORPUS_TYPE_KEY, QUERY_CASE_ID_KEY,
};
use lexfuse::store::{InMemoryStore, StaticEmbedder, StoredDocument};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const QUERY: &str = "Pp-2343/2025 mobitel";

fn registry() -> Arc<PatternRegistry> {
    Arc::new(PatternRegistry::builtin().unwrap())
}

/// Two statutes close to the query vector and one court decision that is
/// semantically further away but cited by case number
fn store() -> InMemoryStore {
    InMemoryStore::new()
        .with_document(
            StoredDocument::new(
                Corpus::Laws,
                "zkp-240",
                "ZKP čl. 240",
                "Pretraga doma i drugih prostorija",
            ),
            Some(vec![0.9, 0.1, 0.0]),
        )
        .with_document(
            StoredDocument::new(
                Corpus::Laws,
                "zkp-261",
                "ZKP čl. 261",
                "Privremeno oduzimanje predmeta",
            ),
            Some(vec![0.8, 0.6, 0.0]),
        )
        .with_document(
            StoredDocument::new(
                Corpus::CourtDecisions,
                "Pp-2343/2025-1",
                "Rješenje",
                "Nalog za pretragu uređaja mobitel u predmetu Pp-2343/2025",
            )
            .with_metadata("court", "Općinski sud u Zagrebu"),
            Some(vec![0.6, 0.0, 0.8]),
        )
}

fn embedder() -> StaticEmbedder {
    StaticEmbedder::new().with_fallback(vec![1.0, 0.0, 0.0])
}

fn orchestrator(store: InMemoryStore, embedder: StaticEmbedder) -> Orchestrator {
    let store = Arc::new(store);
    Orchestrator::new(
        registry(),
        "HR",
        Arc::new(embedder),
        store.clone(),
        store.clone(),
        store,
    )
}

fn permissive() -> RetrievalOptions {
    RetrievalOptions {
        min_confidence: 0.0,
        ..RetrievalOptions::default()
    }
}

fn ids(result: &lexfuse::RetrievalResult) -> Vec<&str> {
    result.chunks.iter().map(|c| c.id.as_str()).collect()
}

#[tokio::test]
async fn test_cited_case_ranks_first() {
    let result = orchestrator(store(), embedder())
        .retrieve(QUERY, &permissive())
        .await
        .unwrap();

    let stats = &result.retrieval_stats;
    assert_eq!(stats.vector_count, 2);
    assert_eq!(stats.keyword_count, 1);
    assert_eq!(stats.graph_count, 1);
    assert_eq!(stats.merged_count, 3);
    assert!(stats.failed_methods.is_empty());
    assert!(!stats.all_branches_failed);

    assert_eq!(ids(&result), vec!["Pp-2343/2025-1", "zkp-240", "zkp-261"]);
    assert_eq!(result.normalized_query.case_id.as_deref(), Some("Pp-2343/2025"));

    let top = &result.chunks[0];
    let methods: BTreeSet<RetrievalMethod> =
        [RetrievalMethod::Keyword, RetrievalMethod::GraphCitation].into();
    assert_eq!(top.retrieval_methods, methods);
    assert!(top.confidence() > 0.5);
    assert_eq!(top.metadata[QUERY_CASE_ID_KEY], "Pp-2343/2025");
    assert_eq!(top.metadata[CORPUS_TYPE_KEY], "court_decisions");

    for pair in result.chunks.windows(2) {
        assert!(pair[0].confidence() >= pair[1].confidence());
    }
    for chunk in &result.chunks {
        assert!(chunk.scores.mmr.is_some());
        assert!(chunk.scores.rrf.is_some());
    }
}

#[tokio::test]
async fn test_case_and_imei_query() {
    let result = orchestrator(store(), embedder())
        .retrieve("Pp-2343/2025 mobitel IMEI 356789101234567", &permissive())
        .await
        .unwrap();

    let query = &result.normalized_query;
    assert_eq!(query.case_id.as_deref(), Some("Pp-2343/2025"));
    assert_eq!(query.identifiers.imei, vec!["356789101234567"]);

    assert_eq!(result.chunks[0].id, "Pp-2343/2025-1");
    assert!(result.chunks[0]
        .retrieval_methods
        .contains(&RetrievalMethod::GraphCitation));
    for pair in result.chunks.windows(2) {
        assert!(pair[0].confidence() >= pair[1].confidence());
    }
}

#[tokio::test]
async fn test_corpus_weight_changes_diversified_output() {
    let orchestrator = orchestrator(store(), embedder());
    let unweighted = RetrievalOptions {
        min_confidence: 0.1,
        ..RetrievalOptions::default()
    };
    let weighted = RetrievalOptions {
        weights: [(Corpus::Laws, 0.0)].into(),
        ..unweighted.clone()
    };
    assert!(unweighted.diversify);

    let plain = orchestrator.retrieve(QUERY, &unweighted).await.unwrap();
    assert_eq!(ids(&plain), vec!["Pp-2343/2025-1", "zkp-240"]);

    // Zero weight leaves the statutes no relevance, only redundancy
    let result = orchestrator.retrieve(QUERY, &weighted).await.unwrap();
    assert_eq!(ids(&result), vec!["Pp-2343/2025-1"]);
    assert_eq!(result.retrieval_stats.merged_count, 3);
}

#[tokio::test]
async fn test_default_threshold_keeps_confident_chunks() {
    let result = orchestrator(store(), embedder())
        .retrieve(QUERY, &RetrievalOptions::default())
        .await
        .unwrap();

    assert!(!result.chunks.is_empty());
    for chunk in &result.chunks {
        assert!(chunk.confidence() >= 0.3);
    }
    assert_eq!(result.chunks[0].id, "Pp-2343/2025-1");
    assert_eq!(result.retrieval_stats.final_count, result.chunks.len());
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let orchestrator = orchestrator(store(), embedder());
    let options = permissive();

    let first = orchestrator.retrieve(QUERY, &options).await.unwrap();
    let second = orchestrator.retrieve(QUERY, &options).await.unwrap();

    assert_eq!(ids(&first), ids(&second));
    for (a, b) in first.chunks.iter().zip(&second.chunks) {
        assert_eq!(a.scores, b.scores);
        assert_eq!(a.fused_rank, b.fused_rank);
    }
}

#[tokio::test]
async fn test_empty_query() {
    let result = orchestrator(store(), embedder())
        .retrieve("   ", &permissive())
        .await
        .unwrap();

    assert!(result.chunks.is_empty());
    assert_eq!(result.retrieval_stats.final_count, 0);
    assert!(!result.retrieval_stats.all_branches_failed);
    assert!(result.normalized_query.keywords.is_empty());
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_other_branches() {
    let result = orchestrator(store(), StaticEmbedder::offline())
        .retrieve(QUERY, &permissive())
        .await
        .unwrap();

    let stats = &result.retrieval_stats;
    assert_eq!(stats.failed_methods, vec![RetrievalMethod::Vector]);
    assert_eq!(stats.vector_count, 0);
    assert!(!stats.all_branches_failed);
    assert_eq!(ids(&result), vec!["Pp-2343/2025-1"]);
    // No query embedding, so the fused order is used as-is
    assert!(result.chunks[0].scores.mmr.is_none());
}

#[tokio::test]
async fn test_failing_corpus_keeps_the_rest() {
    let store = store().with_failing_corpus(Corpus::Laws);
    let result = orchestrator(store, embedder())
        .retrieve(QUERY, &permissive())
        .await
        .unwrap();

    // Court decisions still answer, so no branch fails outright
    assert!(result.retrieval_stats.failed_methods.is_empty());
    assert!(result.chunks.iter().all(|c| c.corpus != Corpus::Laws));
    assert_eq!(result.chunks[0].id, "Pp-2343/2025-1");
}

struct FailingSearcher(RetrievalMethod);

#[async_trait]
impl CorpusSearcher for FailingSearcher {
    fn method(&self) -> RetrievalMethod {
        self.0
    }

    async fn search(
        &self,
        _request: &SearchRequest,
        _limit: usize,
    ) -> Result<BranchHits, RetrievalError> {
        Err(RetrievalError::StoreQueryError {
            method: self.0,
            corpus: None,
            message: "connection refused".to_string(),
        })
    }
}

#[tokio::test]
async fn test_all_branches_failed() {
    let orchestrator = orchestrator(store(), embedder()).with_searchers(
        Arc::new(FailingSearcher(RetrievalMethod::Vector)),
        Arc::new(FailingSearcher(RetrievalMethod::Keyword)),
        Arc::new(FailingSearcher(RetrievalMethod::GraphCitation)),
    );

    let result = orchestrator.retrieve(QUERY, &permissive()).await.unwrap();

    assert!(result.chunks.is_empty());
    assert!(result.retrieval_stats.all_branches_failed);
    assert_eq!(result.retrieval_stats.failed_methods.len(), 3);
    assert_eq!(result.normalized_query.case_id.as_deref(), Some("Pp-2343/2025"));
}

#[tokio::test]
async fn test_slow_branch_times_out() {
    let slow = Arc::new(store().with_latency(Duration::from_millis(500)));
    let fast = Arc::new(store());
    let orchestrator = Orchestrator::new(
        registry(),
        "HR",
        Arc::new(embedder()),
        slow,
        fast.clone(),
        fast,
    );

    let options = RetrievalOptions {
        branch_timeout_ms: Some(50),
        ..permissive()
    };
    let result = orchestrator.retrieve(QUERY, &options).await.unwrap();

    assert_eq!(result.retrieval_stats.failed_methods, vec![RetrievalMethod::Vector]);
    assert_eq!(ids(&result), vec!["Pp-2343/2025-1"]);
}

#[tokio::test]
async fn test_cancelled_request() {
    let orchestrator = orchestrator(store().with_latency(Duration::from_millis(200)), embedder());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = orchestrator
        .retrieve_with_cancel(QUERY, &permissive(), &cancel)
        .await;

    assert_eq!(result.unwrap_err(), RetrievalError::Cancelled);
}

#[tokio::test]
async fn test_invalid_options_rejected() {
    let options = RetrievalOptions {
        mmr_lambda: 1.5,
        ..RetrievalOptions::default()
    };
    let result = orchestrator(store(), embedder()).retrieve(QUERY, &options).await;
    assert!(matches!(result, Err(RetrievalError::InvalidOptions(_))));

    let options = RetrievalOptions {
        corpora: BTreeSet::new(),
        ..RetrievalOptions::default()
    };
    let result = orchestrator(store(), embedder()).retrieve(QUERY, &options).await;
    assert!(matches!(result, Err(RetrievalError::InvalidOptions(_))));
}

#[tokio::test]
async fn test_corpus_selection_caps_and_filters() {
    let orchestrator = orchestrator(store(), embedder());

    let laws_only = RetrievalOptions {
        corpora: [Corpus::Laws].into(),
        ..permissive()
    };
    let result = orchestrator.retrieve(QUERY, &laws_only).await.unwrap();
    assert!(!result.chunks.is_empty());
    assert!(result.chunks.iter().all(|c| c.corpus == Corpus::Laws));

    let capped = RetrievalOptions {
        corpus_caps: [(Corpus::Laws, 1)].into(),
        ..permissive()
    };
    let result = orchestrator.retrieve(QUERY, &capped).await.unwrap();
    let laws = result.chunks.iter().filter(|c| c.corpus == Corpus::Laws).count();
    assert_eq!(laws, 1);
    assert_eq!(result.chunks.len(), 2);

    let filtered = RetrievalOptions {
        filters: [("court".to_string(), "Općinski sud u Zagrebu".to_string())].into(),
        ..permissive()
    };
    let result = orchestrator.retrieve(QUERY, &filtered).await.unwrap();
    assert_eq!(ids(&result), vec!["Pp-2343/2025-1"]);
}

#[tokio::test]
async fn test_without_diversification() {
    let options = RetrievalOptions {
        diversify: false,
        top_k: 2,
        ..permissive()
    };
    let result = orchestrator(store(), embedder())
        .retrieve(QUERY, &options)
        .await
        .unwrap();

    assert!(result.chunks.len() <= 2);
    assert!(result.chunks.iter().all(|c| c.scores.mmr.is_none()));
    // Fused order: the doubly-found decision, then the best vector hit
    let mut fused: Vec<_> = result.chunks.iter().map(|c| c.fused_rank).collect();
    fused.sort();
    assert_eq!(fused, vec![Some(0), Some(1)]);
}
