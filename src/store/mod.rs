//! External collaborators consumed by the retrieval core
//!
//! The orchestrator never owns documents or embeddings. It talks to:
//! - [`Embedder`]: text → vector
//! - [`VectorStore`]: similarity search and embedding lookup per corpus
//! - [`KeywordStore`]: keyword matching per corpus
//! - [`CitationGraph`]: direct lookup by gazette (law) number or case number
//!
//! Two reference implementations ship with the crate: [`InMemoryStore`] and
//! the SQLite-backed [`SqliteStore`].

mod memory;
mod sqlite;

pub use memory::{InMemoryStore, StaticEmbedder};
pub use sqlite::{DbPool, SqliteStore, StoreStats};

use crate::retrieval::Corpus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Metadata key holding a law's gazette number ("70/2017")
pub const LAW_NUMBER_KEY: &str = "law_number";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// A stored chunk as the collaborators return it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub corpus: Corpus,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub chunk_index: i64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl StoredDocument {
    pub fn new(
        corpus: Corpus,
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            corpus,
            title: title.into(),
            content: content.into(),
            chunk_index: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn law_number(&self) -> Option<&str> {
        self.metadata.get(LAW_NUMBER_KEY).and_then(Value::as_str)
    }

    /// Lower-cased title and content, the text keyword matching runs against
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.content).to_lowercase()
    }
}

/// Document with a similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: StoredDocument,
    pub score: f32,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `k` documents of `corpus` with cosine similarity ≥ `threshold`,
    /// best first
    async fn top_k_similar(
        &self,
        corpus: Corpus,
        vector: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>, StoreError>;

    /// Stored embeddings for the given ids; ids without one are absent
    async fn embeddings(
        &self,
        corpus: Corpus,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<f32>>, StoreError>;
}

#[async_trait]
pub trait KeywordStore: Send + Sync {
    /// Documents of `corpus` whose title or content contains any keyword
    async fn match_keywords(
        &self,
        corpus: Corpus,
        keywords: &[String],
    ) -> Result<Vec<StoredDocument>, StoreError>;
}

#[async_trait]
pub trait CitationGraph: Send + Sync {
    /// Laws whose gazette number equals `number`
    async fn lookup_by_law_number(&self, number: &str) -> Result<Vec<StoredDocument>, StoreError>;

    /// Case documents and decisions whose id contains `pattern`
    async fn lookup_by_case_number(&self, pattern: &str)
        -> Result<Vec<StoredDocument>, StoreError>;
}

/// Little-endian f32 encoding used for embedding blobs
pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
