//! Integration Test: ranking stages
//!
//! Fusion, diversification, capping and confidence scoring through the
//! public API, without any store behind them.

use lexfuse::patterns::PatternRegistry;
use lexfuse::query::{NormalizedQuery, QueryNormalizer, QueryOptions};
use lexfuse::retrieval::{
    ChunkKey, ConfidenceScorer, Corpus, CorpusCapper, Diversifier, RankFuser, RetrievalMethod,
    RetrievedChunk,
};
use lexfuse::store::StoredDocument;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn hit(corpus: Corpus, id: &str, method: RetrievalMethod, score: f32) -> RetrievedChunk {
    RetrievedChunk::from_document(
        StoredDocument::new(corpus, id, format!("Naslov {}", id), "sadržaj"),
        method,
        score,
    )
}

fn query(text: &str) -> NormalizedQuery {
    let registry = Arc::new(PatternRegistry::builtin().unwrap());
    QueryNormalizer::new(registry, "HR").normalize(text, &QueryOptions::default())
}

#[test]
fn test_rrf_over_three_lists() {
    let vector = vec![
        hit(Corpus::Laws, "a", RetrievalMethod::Vector, 0.9),
        hit(Corpus::Laws, "b", RetrievalMethod::Vector, 0.8),
        hit(Corpus::CourtDecisions, "c", RetrievalMethod::Vector, 0.75),
    ];
    let keyword = vec![
        hit(Corpus::Laws, "b", RetrievalMethod::Keyword, 0.6),
        hit(Corpus::Laws, "a", RetrievalMethod::Keyword, 0.4),
    ];
    let graph = vec![hit(Corpus::CourtDecisions, "c", RetrievalMethod::GraphCitation, 0.95)];

    let fuser = RankFuser::new(60);
    let fused = fuser.fuse(&[
        (RetrievalMethod::Vector, vector),
        (RetrievalMethod::Keyword, keyword),
        (RetrievalMethod::GraphCitation, graph),
    ]);

    let ids: Vec<&str> = fused.iter().map(|c| c.id.as_str()).collect();
    // a and b tie on 1/61 + 1/62; a was seen first
    assert_eq!(ids, vec!["a", "b", "c"]);

    let expected_a = 1.0 / 61.0 + 1.0 / 62.0;
    let expected_c = 1.0 / 63.0 + 1.0 / 61.0;
    assert!((fused[0].scores.rrf.unwrap() - expected_a).abs() < 1e-6);
    assert!((fused[2].scores.rrf.unwrap() - expected_c).abs() < 1e-6);

    let a = &fused[0];
    assert_eq!(a.scores.vector, Some(0.9));
    assert_eq!(a.scores.keyword, Some(0.4));
    assert_eq!(a.rank_sources[&RetrievalMethod::Vector], 0);
    assert_eq!(a.rank_sources[&RetrievalMethod::Keyword], 1);
    assert!(a.is_corroborated());

    let c = &fused[2];
    assert_eq!(c.scores.graph_boost, Some(0.95));
    assert_eq!(c.fused_rank, Some(2));
}

#[test]
fn test_item_found_by_every_branch_outranks_single_hits() {
    let vector = vec![hit(Corpus::CourtDecisions, "c", RetrievalMethod::Vector, 0.7)];
    let keyword = vec![
        hit(Corpus::Laws, "k0", RetrievalMethod::Keyword, 0.9),
        hit(Corpus::CourtDecisions, "c", RetrievalMethod::Keyword, 0.5),
    ];
    let graph = vec![
        hit(Corpus::CaseDocuments, "g0", RetrievalMethod::GraphCitation, 1.0),
        hit(Corpus::Laws, "g1", RetrievalMethod::GraphCitation, 1.0),
        hit(Corpus::CourtDecisions, "c", RetrievalMethod::GraphCitation, 1.0),
    ];

    let fused = RankFuser::new(60).fuse(&[
        (RetrievalMethod::Vector, vector),
        (RetrievalMethod::Keyword, keyword),
        (RetrievalMethod::GraphCitation, graph),
    ]);

    let c = &fused[0];
    assert_eq!(c.id, "c");
    let expected_c = 1.0 / 61.0 + 1.0 / 62.0 + 1.0 / 63.0;
    assert!((c.scores.rrf.unwrap() - expected_c).abs() < 1e-6);
    assert_eq!(c.retrieval_methods.len(), 3);

    for single in ["k0", "g0"] {
        let chunk = fused.iter().find(|f| f.id == single).unwrap();
        assert!((chunk.scores.rrf.unwrap() - 1.0 / 61.0).abs() < 1e-6);
        assert!(c.scores.rrf.unwrap() > chunk.scores.rrf.unwrap());
    }
}

#[test]
fn test_corpus_weights_reorder() {
    let fuser = RankFuser::default();
    let fused = fuser.fuse(&[(
        RetrievalMethod::Vector,
        vec![
            hit(Corpus::Laws, "law", RetrievalMethod::Vector, 0.9),
            hit(Corpus::CourtDecisions, "decision", RetrievalMethod::Vector, 0.8),
        ],
    )]);

    let weights = BTreeMap::from([(Corpus::CourtDecisions, 2.0)]);
    let weighted = fuser.apply_weights(fused, &weights);

    assert_eq!(weighted[0].id, "decision");
    assert_eq!(weighted[0].fused_rank, Some(0));
    assert_eq!(weighted[1].id, "law");
}

#[test]
fn test_mmr_prefers_distinct_over_duplicate() {
    let candidates = vec![
        hit(Corpus::Laws, "dup1", RetrievalMethod::Vector, 0.7),
        hit(Corpus::Laws, "dup2", RetrievalMethod::Vector, 0.7),
        hit(Corpus::Laws, "distinct", RetrievalMethod::Vector, 0.7),
    ];
    let embeddings: HashMap<ChunkKey, Vec<f32>> = HashMap::from([
        ((Corpus::Laws, "dup1".to_string()), vec![1.0, 0.0, 0.0]),
        ((Corpus::Laws, "dup2".to_string()), vec![1.0, 0.0, 0.0]),
        ((Corpus::Laws, "distinct".to_string()), vec![0.0, 1.0, 0.0]),
    ]);
    let query_vec = [1.0, 1.0, 0.0];

    let selected = Diversifier::new(0.5, 2).diversify(candidates, &query_vec, &embeddings);

    let ids: Vec<&str> = selected.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["dup1", "distinct"]);
    assert!(selected.iter().all(|c| c.scores.mmr.is_some()));
}

#[test]
fn test_cap_invariant() {
    let chunks: Vec<RetrievedChunk> = (0..9)
        .map(|i| {
            let corpus = Corpus::ALL[i % 3];
            hit(corpus, &format!("d{}", i), RetrievalMethod::Vector, 0.9)
        })
        .collect();
    let caps = BTreeMap::from([(Corpus::Laws, 1), (Corpus::CourtDecisions, 2)]);

    let capped = CorpusCapper::new(caps.clone()).cap(chunks.clone());

    for (corpus, cap) in &caps {
        assert!(capped.iter().filter(|c| c.corpus == *corpus).count() <= *cap);
    }
    // Uncapped corpus passes through untouched
    let cases = |list: &[RetrievedChunk]| {
        list.iter()
            .filter(|c| c.corpus == Corpus::CaseDocuments)
            .count()
    };
    assert_eq!(cases(&capped), cases(&chunks));

    // Survivors keep their relative order
    let positions: Vec<usize> = capped
        .iter()
        .map(|c| chunks.iter().position(|o| o.id == c.id).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_confidence_monotonic_in_evidence() {
    let query = query("pretraga mobitel");
    let scorer = ConfidenceScorer::new(0.0);

    let base = hit(Corpus::Laws, "zkp", RetrievalMethod::Vector, 0.8);
    let mut with_graph = base.clone();
    with_graph.absorb(&hit(Corpus::Laws, "zkp", RetrievalMethod::GraphCitation, 0.95));

    let mut with_keywords = base.clone();
    with_keywords.content = "pretraga uređaja mobitel".to_string();

    let plain = scorer.score(&base, &query);
    assert!(scorer.score(&with_graph, &query) > plain);
    assert!(scorer.score(&with_keywords, &query) > plain);
}

#[test]
fn test_confidence_threshold_and_order() {
    let query = query("pretraga");
    let chunks = vec![
        hit(Corpus::Laws, "weak", RetrievalMethod::Vector, 0.1),
        hit(Corpus::Laws, "strong", RetrievalMethod::GraphCitation, 0.95),
    ];

    let kept = ConfidenceScorer::new(0.3).apply(chunks, &query);

    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, "strong");
    assert!(kept[0].confidence() >= 0.3);
}
