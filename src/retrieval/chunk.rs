//! Retrieved chunks and their per-stage scores

use crate::store::StoredDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Document collection a chunk belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corpus {
    Laws,
    CaseDocuments,
    CourtDecisions,
}

impl Corpus {
    pub const ALL: [Corpus; 3] = [Corpus::Laws, Corpus::CaseDocuments, Corpus::CourtDecisions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Laws => "laws",
            Corpus::CaseDocuments => "case_documents",
            Corpus::CourtDecisions => "court_decisions",
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Corpus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "laws" | "law" => Ok(Corpus::Laws),
            "case_documents" | "cases" => Ok(Corpus::CaseDocuments),
            "court_decisions" | "decisions" => Ok(Corpus::CourtDecisions),
            other => Err(format!(
                "unknown corpus '{}' (expected laws, case_documents or court_decisions)",
                other
            )),
        }
    }
}

/// Retrieval branch that produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    Vector,
    Keyword,
    GraphCitation,
}

impl RetrievalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::Vector => "vector",
            RetrievalMethod::Keyword => "keyword",
            RetrievalMethod::GraphCitation => "graph_citation",
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores gathered as a chunk moves through the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_boost: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmr: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl ChunkScores {
    /// Highest branch score (vector, keyword or graph)
    pub fn raw(&self) -> Option<f32> {
        [self.vector, self.keyword, self.graph_boost]
            .into_iter()
            .flatten()
            .fold(None, |best, s| Some(best.map_or(s, |b: f32| b.max(s))))
    }

    fn merge(&mut self, other: &ChunkScores) {
        fn max(a: Option<f32>, b: Option<f32>) -> Option<f32> {
            match (a, b) {
                (Some(x), Some(y)) => Some(x.max(y)),
                (x, y) => x.or(y),
            }
        }
        self.vector = max(self.vector, other.vector);
        self.keyword = max(self.keyword, other.keyword);
        self.graph_boost = max(self.graph_boost, other.graph_boost);
    }
}

/// Dedup identity of a chunk
pub type ChunkKey = (Corpus, String);

/// The unit passed between pipeline stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub corpus: Corpus,
    pub title: String,
    pub content: String,
    pub chunk_index: i64,
    pub metadata: BTreeMap<String, Value>,
    pub scores: ChunkScores,
    pub retrieval_methods: BTreeSet<RetrievalMethod>,
    /// Zero-based rank in each branch list the chunk appeared in
    pub rank_sources: BTreeMap<RetrievalMethod, usize>,
    /// Position in the fused (and weighted) ranking
    pub fused_rank: Option<usize>,
}

impl RetrievedChunk {
    /// Wrap a stored document as a hit of `method` with `score`
    pub fn from_document(document: StoredDocument, method: RetrievalMethod, score: f32) -> Self {
        let mut scores = ChunkScores::default();
        match method {
            RetrievalMethod::Vector => scores.vector = Some(score),
            RetrievalMethod::Keyword => scores.keyword = Some(score),
            RetrievalMethod::GraphCitation => scores.graph_boost = Some(score),
        }

        Self {
            id: document.id,
            corpus: document.corpus,
            title: document.title,
            content: document.content,
            chunk_index: document.chunk_index,
            metadata: document.metadata,
            scores,
            retrieval_methods: BTreeSet::from([method]),
            rank_sources: BTreeMap::new(),
            fused_rank: None,
        }
    }

    pub fn key(&self) -> ChunkKey {
        (self.corpus, self.id.clone())
    }

    /// Fold another hit for the same key into this one: branch scores keep
    /// their maximum, methods and rank sources are unioned
    pub fn absorb(&mut self, other: &RetrievedChunk) {
        self.scores.merge(&other.scores);
        self.retrieval_methods
            .extend(other.retrieval_methods.iter().copied());
        for (method, rank) in &other.rank_sources {
            self.rank_sources.entry(*method).or_insert(*rank);
        }
    }

    pub fn confidence(&self) -> f32 {
        self.scores.confidence.unwrap_or(0.0)
    }

    pub fn is_corroborated(&self) -> bool {
        self.retrieval_methods.len() > 1
    }

    /// Get a short preview of the content (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            self.content.clone()
        } else {
            let truncated: String = self.content.chars().take(max_chars).collect();
            format!("{}...", truncated)
        }
    }

    /// Metadata value rendered as plain text for equality filtering
    pub fn metadata_text(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}
