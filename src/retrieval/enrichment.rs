//! Query-relative metadata on the final chunks

use super::RetrievedChunk;
use crate::query::NormalizedQuery;
use serde_json::Value;

pub const QUERY_JURISDICTION_KEY: &str = "query_jurisdiction";
pub const QUERY_CASE_ID_KEY: &str = "query_case_id";
pub const CHUNK_LENGTH_KEY: &str = "chunk_length";
pub const CORPUS_TYPE_KEY: &str = "corpus_type";
pub const JURISDICTION_MATCH_KEY: &str = "jurisdiction_match";

/// Chunk metadata key compared against the query jurisdiction
const JURISDICTION_KEY: &str = "jurisdiction";

/// Annotates chunks in place; never drops or reorders
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataEnricher;

impl MetadataEnricher {
    pub fn enrich(&self, chunks: &mut [RetrievedChunk], query: &NormalizedQuery) {
        for chunk in chunks.iter_mut() {
            let jurisdiction_match = chunk
                .metadata_text(JURISDICTION_KEY)
                .map(|j| j.eq_ignore_ascii_case(&query.jurisdiction));

            let metadata = &mut chunk.metadata;
            metadata.insert(
                QUERY_JURISDICTION_KEY.to_string(),
                Value::String(query.jurisdiction.clone()),
            );
            metadata.insert(
                QUERY_CASE_ID_KEY.to_string(),
                query.case_id.clone().map_or(Value::Null, Value::String),
            );
            metadata.insert(
                CHUNK_LENGTH_KEY.to_string(),
                Value::from(chunk.content.chars().count()),
            );
            metadata.insert(
                CORPUS_TYPE_KEY.to_string(),
                Value::String(chunk.corpus.as_str().to_string()),
            );
            if let Some(matched) = jurisdiction_match {
                metadata.insert(JURISDICTION_MATCH_KEY.to_string(), Value::Bool(matched));
            }
        }
    }
}
