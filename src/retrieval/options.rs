//! Per-request options, results and stats

use super::{Corpus, RetrievalError, RetrievalMethod, RetrievedChunk};
use crate::citations::DetectedCitations;
use crate::config::RetrievalConfig;
use crate::query::{DateRange, NormalizedQuery, QueryOptions, MAX_FOLLOW_UP_QUESTIONS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;
pub const DEFAULT_VECTOR_LIMIT: usize = 50;
pub const DEFAULT_KEYWORD_LIMIT: usize = 30;
pub const DEFAULT_GRAPH_LIMIT: usize = 20;
pub const DEFAULT_TOP_K: usize = 20;
pub const DEFAULT_MMR_LAMBDA: f32 = 0.5;
pub const DEFAULT_RRF_K: u32 = 60;
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_BRANCH_TIMEOUT_MS: u64 = 5000;

/// Options for one `retrieve` call
///
/// Every field has a default; `Default` gives the documented values with
/// all three corpora enabled, no caps, unit weights and a 5 s branch timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    pub corpora: BTreeSet<Corpus>,
    /// Multiplies the fused score and the MMR relevance per corpus;
    /// missing corpora weigh 1.0
    pub weights: BTreeMap<Corpus, f32>,
    /// Metadata equality filters applied to every branch's hits
    pub filters: BTreeMap<String, String>,
    pub top_k: usize,
    pub mmr_lambda: f32,
    pub rrf_k: u32,
    /// Missing corpora are uncapped
    pub corpus_caps: BTreeMap<Corpus, usize>,
    pub min_confidence: f32,
    pub similarity_threshold: f32,
    pub vector_limit: usize,
    pub keyword_limit: usize,
    pub graph_limit: usize,
    /// MMR re-ranking; off means the fused order truncated to `top_k`
    pub diversify: bool,
    pub branch_timeout_ms: Option<u64>,
    pub jurisdiction: Option<String>,
    pub date_range: Option<DateRange>,
    pub max_follow_up_questions: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            corpora: Corpus::ALL.into_iter().collect(),
            weights: BTreeMap::new(),
            filters: BTreeMap::new(),
            top_k: DEFAULT_TOP_K,
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            rrf_k: DEFAULT_RRF_K,
            corpus_caps: BTreeMap::new(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            vector_limit: DEFAULT_VECTOR_LIMIT,
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            graph_limit: DEFAULT_GRAPH_LIMIT,
            diversify: true,
            branch_timeout_ms: Some(DEFAULT_BRANCH_TIMEOUT_MS),
            jurisdiction: None,
            date_range: None,
            max_follow_up_questions: MAX_FOLLOW_UP_QUESTIONS,
        }
    }
}

impl RetrievalOptions {
    /// Options seeded from the `[retrieval]` config section
    pub fn from_config(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        let options = Self {
            weights: by_corpus(&config.corpus_weights)?,
            corpus_caps: by_corpus(&config.corpus_caps)?,
            top_k: config.top_k,
            mmr_lambda: config.mmr_lambda,
            rrf_k: config.rrf_k,
            min_confidence: config.min_confidence,
            similarity_threshold: config.similarity_threshold,
            vector_limit: config.vector_limit,
            keyword_limit: config.keyword_limit,
            graph_limit: config.graph_limit,
            diversify: config.diversify,
            branch_timeout_ms: (config.branch_timeout_ms > 0).then_some(config.branch_timeout_ms),
            ..Self::default()
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        let invalid = |msg: String| Err(RetrievalError::InvalidOptions(msg));

        if self.corpora.is_empty() {
            return invalid("at least one corpus must be enabled".to_string());
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return invalid(format!("mmr_lambda must be in [0, 1], got {}", self.mmr_lambda));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return invalid(format!(
                "min_confidence must be in [0, 1], got {}",
                self.min_confidence
            ));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return invalid(format!(
                "similarity_threshold must be in [-1, 1], got {}",
                self.similarity_threshold
            ));
        }
        if self.rrf_k == 0 {
            return invalid("rrf_k must be greater than 0".to_string());
        }
        if self.top_k == 0 {
            return invalid("top_k must be greater than 0".to_string());
        }
        if let Some((corpus, weight)) = self
            .weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return invalid(format!("weight for {} must be non-negative, got {}", corpus, weight));
        }
        if self.branch_timeout_ms == Some(0) {
            return invalid("branch_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn weight(&self, corpus: Corpus) -> f32 {
        self.weights.get(&corpus).copied().unwrap_or(1.0)
    }

    pub fn branch_timeout(&self) -> Option<Duration> {
        self.branch_timeout_ms.map(Duration::from_millis)
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            jurisdiction: self.jurisdiction.clone(),
            date_range: self.date_range,
            max_follow_up_questions: self.max_follow_up_questions,
        }
    }

    /// True when every filter matches the chunk's metadata
    pub fn matches_filters(&self, chunk: &RetrievedChunk) -> bool {
        self.filters
            .iter()
            .all(|(key, expected)| chunk.metadata_text(key).as_deref() == Some(expected.as_str()))
    }
}

fn by_corpus<V: Copy>(map: &BTreeMap<String, V>) -> Result<BTreeMap<Corpus, V>, RetrievalError> {
    map.iter()
        .map(|(name, value)| {
            name.parse::<Corpus>()
                .map(|corpus| (corpus, *value))
                .map_err(RetrievalError::InvalidOptions)
        })
        .collect()
}

/// Counts recorded along the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub vector_count: usize,
    pub keyword_count: usize,
    pub graph_count: usize,
    pub merged_count: usize,
    pub final_count: usize,
    pub failed_methods: Vec<RetrievalMethod>,
    pub all_branches_failed: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub normalized_query: NormalizedQuery,
    pub citations_detected: DetectedCitations,
    pub chunks: Vec<RetrievedChunk>,
    pub retrieval_stats: RetrievalStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoredDocument;

    #[test]
    fn test_defaults() {
        let options = RetrievalOptions::default();
        assert_eq!(options.corpora.len(), 3);
        assert_eq!(options.top_k, 20);
        assert_eq!(options.rrf_k, 60);
        assert_eq!(options.weight(Corpus::Laws), 1.0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_default_timeout_matches_config() {
        let from_config = RetrievalOptions::from_config(&RetrievalConfig::default()).unwrap();

        assert_eq!(
            RetrievalOptions::default().branch_timeout(),
            Some(Duration::from_millis(5000))
        );
        assert_eq!(RetrievalOptions::default(), from_config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            RetrievalOptions {
                mmr_lambda: 1.5,
                ..Default::default()
            },
            RetrievalOptions {
                rrf_k: 0,
                ..Default::default()
            },
            RetrievalOptions {
                corpora: BTreeSet::new(),
                ..Default::default()
            },
            RetrievalOptions {
                weights: BTreeMap::from([(Corpus::Laws, -1.0)]),
                ..Default::default()
            },
        ];
        for options in bad {
            assert!(matches!(
                options.validate(),
                Err(RetrievalError::InvalidOptions(_))
            ));
        }
    }

    #[test]
    fn test_from_config() {
        let mut config = RetrievalConfig::default();
        config.corpus_caps.insert("laws".to_string(), 5);
        config.corpus_weights.insert("court_decisions".to_string(), 1.5);
        config.branch_timeout_ms = 2000;

        let options = RetrievalOptions::from_config(&config).unwrap();
        assert_eq!(options.corpus_caps[&Corpus::Laws], 5);
        assert_eq!(options.weight(Corpus::CourtDecisions), 1.5);
        assert_eq!(options.branch_timeout(), Some(Duration::from_millis(2000)));

        config.corpus_caps.insert("statutes".to_string(), 1);
        assert!(RetrievalOptions::from_config(&config).is_err());
    }

    #[test]
    fn test_filters() {
        let chunk = RetrievedChunk::from_document(
            StoredDocument::new(Corpus::CourtDecisions, "d1", "", "tekst")
                .with_metadata("court", "Vrhovni sud")
                .with_metadata("year", 2024),
            RetrievalMethod::Keyword,
            1.0,
        );

        let mut options = RetrievalOptions::default();
        assert!(options.matches_filters(&chunk));

        options.filters.insert("year".to_string(), "2024".to_string());
        assert!(options.matches_filters(&chunk));

        options.filters.insert("court".to_string(), "Županijski sud".to_string());
        assert!(!options.matches_filters(&chunk));
    }
}
