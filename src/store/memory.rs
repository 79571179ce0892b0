//! In-process store with brute-force cosine similarity

use super::{
    CitationGraph, Embedder, KeywordStore, ScoredDocument, StoreError, StoredDocument,
    VectorStore,
};
use crate::embedding::cosine_similarity;
use crate::retrieval::Corpus;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Document table held in memory. Implements every store trait, so one
/// instance can back all three retrieval branches.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    documents: Vec<(StoredDocument, Option<Vec<f32>>)>,
    failing: HashSet<Corpus>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document (keyed by corpus and id)
    pub fn insert(&mut self, document: StoredDocument, embedding: Option<Vec<f32>>) {
        match self
            .documents
            .iter_mut()
            .find(|(d, _)| d.corpus == document.corpus && d.id == document.id)
        {
            Some(slot) => *slot = (document, embedding),
            None => self.documents.push((document, embedding)),
        }
    }

    pub fn with_document(mut self, document: StoredDocument, embedding: Option<Vec<f32>>) -> Self {
        self.insert(document, embedding);
        self
    }

    /// Every query against `corpus` fails
    pub fn with_failing_corpus(mut self, corpus: Corpus) -> Self {
        self.failing.insert(corpus);
        self
    }

    /// Every query sleeps before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    async fn enter(&self, corpus: Option<Corpus>) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match corpus {
            Some(c) if self.failing.contains(&c) => {
                Err(StoreError::Unavailable(format!("corpus {} is offline", c)))
            }
            _ => Ok(()),
        }
    }

    fn in_corpus(&self, corpus: Corpus) -> impl Iterator<Item = &(StoredDocument, Option<Vec<f32>>)> {
        self.documents.iter().filter(move |(d, _)| d.corpus == corpus)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn top_k_similar(
        &self,
        corpus: Corpus,
        vector: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        self.enter(Some(corpus)).await?;

        let mut hits: Vec<ScoredDocument> = self
            .in_corpus(corpus)
            .filter_map(|(doc, embedding)| {
                let score = cosine_similarity(vector, embedding.as_deref()?)?;
                (score >= threshold).then(|| ScoredDocument {
                    document: doc.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn embeddings(
        &self,
        corpus: Corpus,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<f32>>, StoreError> {
        self.enter(Some(corpus)).await?;

        Ok(self
            .in_corpus(corpus)
            .filter(|(doc, _)| ids.contains(&doc.id))
            .filter_map(|(doc, embedding)| Some((doc.id.clone(), embedding.clone()?)))
            .collect())
    }
}

#[async_trait]
impl KeywordStore for InMemoryStore {
    async fn match_keywords(
        &self,
        corpus: Corpus,
        keywords: &[String],
    ) -> Result<Vec<StoredDocument>, StoreError> {
        self.enter(Some(corpus)).await?;

        Ok(self
            .in_corpus(corpus)
            .filter(|(doc, _)| {
                let text = doc.searchable_text();
                keywords.iter().any(|k| text.contains(&k.to_lowercase()))
            })
            .map(|(doc, _)| doc.clone())
            .collect())
    }
}

#[async_trait]
impl CitationGraph for InMemoryStore {
    async fn lookup_by_law_number(&self, number: &str) -> Result<Vec<StoredDocument>, StoreError> {
        self.enter(Some(Corpus::Laws)).await?;

        Ok(self
            .in_corpus(Corpus::Laws)
            .filter(|(doc, _)| doc.law_number() == Some(number))
            .map(|(doc, _)| doc.clone())
            .collect())
    }

    async fn lookup_by_case_number(
        &self,
        pattern: &str,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        self.enter(None).await?;
        let pattern = pattern.to_lowercase();

        Ok(self
            .documents
            .iter()
            .filter(|(doc, _)| doc.corpus != Corpus::Laws && !self.failing.contains(&doc.corpus))
            .filter(|(doc, _)| doc.id.to_lowercase().contains(&pattern))
            .map(|(doc, _)| doc.clone())
            .collect())
    }
}

/// Embedder answering from a fixed text → vector table
#[derive(Debug, Default, Clone)]
pub struct StaticEmbedder {
    table: HashMap<String, Vec<f32>>,
    fallback: Option<Vec<f32>>,
    offline: bool,
}

impl StaticEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.table.insert(text.into(), vector);
        self
    }

    /// Vector returned for any text missing from the table
    pub fn with_fallback(mut self, vector: Vec<f32>) -> Self {
        self.fallback = Some(vector);
        self
    }

    /// An embedder whose every call fails
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("embedding service offline".to_string()));
        }
        self.table
            .get(text)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| StoreError::Embedding(format!("no vector for '{}'", text)))
    }
}
