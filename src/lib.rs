//! Lexfuse - Hybrid Legal Retrieval
//!
//! Normalizes a free-text legal query, detects the citations it contains and
//! searches laws, case documents and court decisions three ways at once
//! (semantic vectors, keywords, the citation graph). The rankings are fused,
//! diversified, capped per corpus and scored for confidence before being
//! handed to whatever answers the question.

pub mod citations;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod patterns;
pub mod query;
pub mod retrieval;
pub mod store;

pub use error::{LexfuseError, Result};
pub use retrieval::{Orchestrator, RetrievalOptions, RetrievalResult};
