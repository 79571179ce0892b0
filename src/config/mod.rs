//! Configuration management for lexfuse
//!
//! TOML on disk, environment overrides on top, validated as a whole before
//! anything uses it.

use crate::embedding::DEFAULT_MODEL;
use crate::error::{LexfuseError, Result};
use crate::query::MAX_FOLLOW_UP_QUESTIONS;
use crate::retrieval::{
    DEFAULT_BRANCH_TIMEOUT_MS, DEFAULT_GRAPH_LIMIT, DEFAULT_KEYWORD_LIMIT, DEFAULT_MIN_CONFIDENCE,
    DEFAULT_MMR_LAMBDA, DEFAULT_RRF_K, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K,
    DEFAULT_VECTOR_LIMIT,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::{ConfigValidator, SCHEMA_VERSION};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: current_timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("~/.lexfuse/lexfuse.db"),
            pool_size: 8,
        }
    }
}

impl StorageConfig {
    /// Database path with a leading `~` expanded
    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        expand_home(&self.database_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            dimension: 384,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_jurisdiction: String,
    pub max_follow_up_questions: usize,
    /// Pattern table to load instead of the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns_file: Option<PathBuf>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_jurisdiction: "HR".to_string(),
            max_follow_up_questions: MAX_FOLLOW_UP_QUESTIONS,
            patterns_file: None,
        }
    }
}

/// Defaults for every retrieval request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub similarity_threshold: f32,
    pub vector_limit: usize,
    pub keyword_limit: usize,
    pub graph_limit: usize,
    pub top_k: usize,
    pub mmr_lambda: f32,
    pub rrf_k: u32,
    pub min_confidence: f32,
    /// 0 disables the per-branch timeout
    pub branch_timeout_ms: u64,
    pub diversify: bool,
    /// Corpus name → max results
    pub corpus_caps: BTreeMap<String, usize>,
    /// Corpus name → fused-score multiplier
    pub corpus_weights: BTreeMap<String, f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            vector_limit: DEFAULT_VECTOR_LIMIT,
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            graph_limit: DEFAULT_GRAPH_LIMIT,
            top_k: DEFAULT_TOP_K,
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            rrf_k: DEFAULT_RRF_K,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            branch_timeout_ms: DEFAULT_BRANCH_TIMEOUT_MS,
            diversify: true,
            corpus_caps: BTreeMap::new(),
            corpus_weights: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LexfuseError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LexfuseError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load the file if present, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(LexfuseError::ConfigNotFound { path }) => {
                tracing::warn!("No config at {:?}, using defaults", path);
                let mut config = Config::default();
                config.apply_env_overrides();
                ConfigValidator::validate(&config)?;
                Ok(config)
            }
            other => other,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LexfuseError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LexfuseError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LEXFUSE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("LEXFUSE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    pub fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let r = &mut self.retrieval;
        match path {
            "STORAGE__DATABASE_PATH" => self.storage.database_path = PathBuf::from(value),
            "STORAGE__POOL_SIZE" => self.storage.pool_size = parse_value(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse_value(path, value)?,
            "QUERY__DEFAULT_JURISDICTION" => self.query.default_jurisdiction = value.to_string(),
            "QUERY__PATTERNS_FILE" => self.query.patterns_file = Some(PathBuf::from(value)),
            "RETRIEVAL__SIMILARITY_THRESHOLD" => r.similarity_threshold = parse_value(path, value)?,
            "RETRIEVAL__VECTOR_LIMIT" => r.vector_limit = parse_value(path, value)?,
            "RETRIEVAL__KEYWORD_LIMIT" => r.keyword_limit = parse_value(path, value)?,
            "RETRIEVAL__GRAPH_LIMIT" => r.graph_limit = parse_value(path, value)?,
            "RETRIEVAL__TOP_K" => r.top_k = parse_value(path, value)?,
            "RETRIEVAL__MMR_LAMBDA" => r.mmr_lambda = parse_value(path, value)?,
            "RETRIEVAL__RRF_K" => r.rrf_k = parse_value(path, value)?,
            "RETRIEVAL__MIN_CONFIDENCE" => r.min_confidence = parse_value(path, value)?,
            "RETRIEVAL__BRANCH_TIMEOUT_MS" => r.branch_timeout_ms = parse_value(path, value)?,
            "RETRIEVAL__DIVERSIFY" => r.diversify = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LexfuseError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("lexfuse").join("config.toml"))
    }
}

fn parse_value<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| LexfuseError::InvalidConfigValue {
        path: path.to_string(),
        message: format!(
            "Cannot parse '{}' as {}",
            value,
            std::any::type_name::<T>()
        ),
    })
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| LexfuseError::Config("Cannot determine home directory".to_string()))?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
