use crate::config::{Config, MAX_CACHE_TTL_SECS};
use crate::error::{Result, RetrieverError, ValidationError};

const EMBEDDING_PROVIDERS: [&str; 2] = ["fastembed", "openai"];
const RERANKER_BACKENDS: [&str; 2] = ["llm", "cross_encoder"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_reranker(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_cache(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RetrieverError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if !EMBEDDING_PROVIDERS.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    EMBEDDING_PROVIDERS, provider
                ),
            ));
        }

        if provider == "openai" {
            Self::require_env(&config.embedding.api_key_env, "embedding.api_key_env", errors);
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_reranker(config: &Config, errors: &mut Vec<ValidationError>) {
        let reranker = &config.reranker;

        if !RERANKER_BACKENDS.contains(&reranker.backend.as_str()) {
            errors.push(ValidationError::new(
                "reranker.backend",
                format!(
                    "Backend must be one of {:?}, got '{}'",
                    RERANKER_BACKENDS, reranker.backend
                ),
            ));
        }

        // Credentials only matter when the LLM oracle will actually be built
        if reranker.enabled && reranker.backend == "llm" {
            Self::require_env(&reranker.api_key_env, "reranker.api_key_env", errors);
        }

        if !(0.0..=2.0).contains(&reranker.temperature) {
            errors.push(ValidationError::new(
                "reranker.temperature",
                format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    reranker.temperature
                ),
            ));
        }

        if reranker.max_passage_chars == 0 {
            errors.push(ValidationError::new(
                "reranker.max_passage_chars",
                "Passage length must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.rrf_k < 0.0 || !retrieval.rrf_k.is_finite() {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must be a non-negative number, got {}", retrieval.rrf_k),
            ));
        }

        if retrieval.confidence_scale <= 0.0 || !retrieval.confidence_scale.is_finite() {
            errors.push(ValidationError::new(
                "retrieval.confidence_scale",
                "Confidence scale must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&retrieval.mmr_lambda) {
            errors.push(ValidationError::new(
                "retrieval.mmr_lambda",
                format!(
                    "MMR lambda must be between 0.0 and 1.0, got {}",
                    retrieval.mmr_lambda
                ),
            ));
        }

        if retrieval.diversity_cap == 0 {
            errors.push(ValidationError::new(
                "retrieval.diversity_cap",
                "Diversity cap must be greater than 0",
            ));
        }

        for (path, value) in [
            ("retrieval.lexical_confidence", retrieval.lexical_confidence),
            ("retrieval.entity_confidence", retrieval.entity_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(ValidationError::new(
                    path,
                    format!("Confidence must be between 0.0 and 1.0, got {}", value),
                ));
            }
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.cache.ttl_secs > MAX_CACHE_TTL_SECS {
            errors.push(ValidationError::new(
                "cache.ttl_secs",
                format!(
                    "Cache TTL must be at most {} seconds, got {}",
                    MAX_CACHE_TTL_SECS, config.cache.ttl_secs
                ),
            ));
        }
    }

    fn require_env(env_var: &str, path: &str, errors: &mut Vec<ValidationError>) {
        match std::env::var(env_var) {
            Ok(key) if !key.is_empty() => {}
            Ok(_) => errors.push(ValidationError::new(
                path,
                format!("Environment variable {} is empty", env_var),
            )),
            Err(_) => errors.push(ValidationError::new(
                path,
                format!("Environment variable {} is not set", env_var),
            )),
        }
    }
}
