//! Hybrid retrieval over laws, case documents and court decisions
//!
//! Three branches (vector, keyword, citation graph) run concurrently, their
//! rankings are merged with Reciprocal Rank Fusion, diversified with MMR,
//! capped per corpus, scored for confidence and annotated.

mod capping;
mod chunk;
mod confidence;
mod diversity;
mod enrichment;
mod error;
mod fusion;
mod graph;
mod keyword;
mod options;
mod orchestrator;
mod searcher;
mod vector;

pub use capping::CorpusCapper;
pub use chunk::{ChunkKey, ChunkScores, Corpus, RetrievalMethod, RetrievedChunk};
pub use confidence::{
    ConfidenceScorer, CORROBORATION_WEIGHT, GRAPH_WEIGHT, KEYWORD_OVERLAP_WEIGHT,
    PRIMARY_WEIGHT, RRF_SCALE,
};
pub use diversity::Diversifier;
pub use enrichment::{
    MetadataEnricher, CHUNK_LENGTH_KEY, CORPUS_TYPE_KEY, JURISDICTION_MATCH_KEY,
    QUERY_CASE_ID_KEY, QUERY_JURISDICTION_KEY,
};
pub use error::RetrievalError;
pub use fusion::RankFuser;
pub use graph::{CitationGraphSearcher, GRAPH_MATCH_SCORE};
pub use keyword::{keyword_overlap, KeywordSearcher};
pub use options::{
    RetrievalOptions, RetrievalResult, RetrievalStats, DEFAULT_BRANCH_TIMEOUT_MS,
    DEFAULT_GRAPH_LIMIT, DEFAULT_KEYWORD_LIMIT, DEFAULT_MIN_CONFIDENCE, DEFAULT_MMR_LAMBDA,
    DEFAULT_RRF_K, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K, DEFAULT_VECTOR_LIMIT,
};
pub use orchestrator::{query_hash, Orchestrator};
pub use searcher::{BranchHits, CorpusSearcher, SearchRequest};
pub use vector::VectorSearcher;
