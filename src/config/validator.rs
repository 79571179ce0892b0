use crate::config::Config;
use crate::error::{LexfuseError, Result, ValidationError};
use crate::retrieval::Corpus;

/// Config schema this build understands
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every violation at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_query(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LexfuseError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_path",
                "Database path cannot be empty",
            ));
        }
        if config.storage.pool_size == 0 {
            errors.push(ValidationError::new(
                "storage.pool_size",
                "Pool size must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.trim().is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }
    }

    fn validate_query(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.query.default_jurisdiction.trim().is_empty() {
            errors.push(ValidationError::new(
                "query.default_jurisdiction",
                "Jurisdiction cannot be empty",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.retrieval;

        Self::check_unit_range(
            "retrieval.similarity_threshold",
            r.similarity_threshold,
            errors,
        );
        Self::check_unit_range("retrieval.mmr_lambda", r.mmr_lambda, errors);
        Self::check_unit_range("retrieval.min_confidence", r.min_confidence, errors);

        for (path, value) in [
            ("retrieval.vector_limit", r.vector_limit),
            ("retrieval.keyword_limit", r.keyword_limit),
            ("retrieval.graph_limit", r.graph_limit),
            ("retrieval.top_k", r.top_k),
            ("retrieval.rrf_k", r.rrf_k as usize),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }

        for name in r.corpus_caps.keys() {
            if let Err(e) = name.parse::<Corpus>() {
                errors.push(ValidationError::new(
                    format!("retrieval.corpus_caps.{}", name),
                    e,
                ));
            }
        }
        for (name, weight) in &r.corpus_weights {
            if let Err(e) = name.parse::<Corpus>() {
                errors.push(ValidationError::new(
                    format!("retrieval.corpus_weights.{}", name),
                    e,
                ));
            } else if !weight.is_finite() || *weight < 0.0 {
                errors.push(ValidationError::new(
                    format!("retrieval.corpus_weights.{}", name),
                    format!("Weight must be non-negative, got {}", weight),
                ));
            }
        }
    }

    fn check_unit_range(path: &str, value: f32, errors: &mut Vec<ValidationError>) {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::new(
                path,
                format!("Must be between 0.0 and 1.0, got {}", value),
            ));
        }
    }
}
