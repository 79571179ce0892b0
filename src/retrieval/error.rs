//! Errors raised while answering a retrieval request

use super::{Corpus, RetrievalMethod};
use thiserror::Error;

/// Failures inside the retrieval pipeline
///
/// Branch-level variants (embedding, timeout, store query) are logged and
/// degraded to an empty branch; only `Cancelled` and `InvalidOptions`
/// are ever returned from `retrieve`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailure(String),

    #[error("{method} search timed out after {timeout_ms}ms")]
    StoreTimeout {
        method: RetrievalMethod,
        timeout_ms: u64,
    },

    #[error("{method} query failed (corpus: {corpus:?}): {message}")]
    StoreQueryError {
        method: RetrievalMethod,
        corpus: Option<Corpus>,
        message: String,
    },

    #[error("All retrieval methods failed")]
    AllBranchesFailed,

    #[error("Retrieval cancelled")]
    Cancelled,

    #[error("Invalid retrieval options: {0}")]
    InvalidOptions(String),
}

impl RetrievalError {
    pub(crate) fn store(method: RetrievalMethod, corpus: Option<Corpus>, err: impl ToString) -> Self {
        RetrievalError::StoreQueryError {
            method,
            corpus,
            message: err.to_string(),
        }
    }
}
