//! Configuration management for the knowledge retriever
//!
//! Loads a TOML file, applies `KRET_` environment overrides and validates the
//! result before anything is constructed from it.

use crate::error::{Result, RetrieverError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Fixed confidence given to every lexical hit (full-text search has no usable rank score)
pub const DEFAULT_LEXICAL_CONFIDENCE: f32 = 0.7;

/// Fixed confidence given to every entity-grounded hit
pub const DEFAULT_ENTITY_CONFIDENCE: f32 = 0.8;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "fastembed" (local model) or "openai"
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub batch_size: usize,
}

/// Reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub enabled: bool,
    /// "llm" or "cross_encoder"
    pub backend: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub temperature: f32,
    /// Passages are cut to this many characters in the ranking prompt
    pub max_passage_chars: usize,
    /// Require a `{"ranking": [...]}` JSON answer instead of scraping integers
    pub strict_response: bool,
}

/// Which strategies honour the caller's pack filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackFilterScope {
    /// Only the semantic strategy filters by pack
    #[default]
    SemanticOnly,
    /// Lexical and entity hits are post-filtered by pack as well
    AllStrategies,
}

/// Tunables for the retrieval pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,
    /// Fused confidence = min(rrf_sum * confidence_scale, 1)
    pub confidence_scale: f32,
    /// MMR trade-off between relevance (1.0) and novelty (0.0)
    pub mmr_lambda: f32,
    /// Hard cap on the diversified list, independent of top_k
    pub diversity_cap: usize,
    pub semantic_limit: usize,
    pub lexical_limit: usize,
    pub entity_match_limit: usize,
    pub entity_content_limit: usize,
    pub lexical_confidence: f32,
    pub entity_confidence: f32,
    pub pack_filter_scope: PackFilterScope,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            confidence_scale: 2.0,
            mmr_lambda: 0.5,
            diversity_cap: 10,
            semantic_limit: 20,
            lexical_limit: 20,
            entity_match_limit: 5,
            entity_content_limit: 5,
            lexical_confidence: DEFAULT_LEXICAL_CONFIDENCE,
            entity_confidence: DEFAULT_ENTITY_CONFIDENCE,
            pack_filter_scope: PackFilterScope::SemanticOnly,
        }
    }
}

/// Longest accepted cache TTL, one year
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RetrieverError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RetrieverError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RetrieverError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: KRET_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("KRET_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "RERANKER__ENABLED" => {
                self.reranker.enabled =
                    value
                        .parse()
                        .map_err(|_| RetrieverError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as boolean", value),
                        })?;
            }
            "RERANKER__MODEL" => {
                self.reranker.model = value.to_string();
            }
            "EMBEDDING__PROVIDER" => {
                self.embedding.provider = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "CACHE__TTL_SECS" => {
                self.cache.ttl_secs =
                    value
                        .parse()
                        .map_err(|_| RetrieverError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as seconds", value),
                        })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            RetrieverError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("kret").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| RetrieverError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".kret"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.kret"),
            },
            embedding: EmbeddingConfig {
                provider: "fastembed".to_string(),
                model: "all-MiniLM-L6-v2".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                batch_size: 32,
            },
            reranker: RerankerConfig {
                enabled: false,
                backend: "llm".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                temperature: 0.0,
                max_passage_chars: 200,
                strict_response: true,
            },
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.pack_filter_scope = PackFilterScope::AllStrategies;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(
            loaded.retrieval.pack_filter_scope,
            PackFilterScope::AllStrategies
        );
        assert_eq!(loaded.cache.ttl_secs, 3600);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let content = r#"
            [_meta]
            schema_version = "1.0.0"

            [storage]
            data_dir = "/tmp/kret"

            [embedding]
            provider = "fastembed"
            model = "all-MiniLM-L6-v2"
            api_key_env = "OPENAI_API_KEY"
            base_url = "https://api.openai.com/v1"
            batch_size = 16

            [reranker]
            enabled = false
            backend = "llm"
            model = "gpt-4o-mini"
            api_key_env = "OPENAI_API_KEY"
            base_url = "https://api.openai.com/v1"
            temperature = 0.0
            max_passage_chars = 200
            strict_response = true
        "#;

        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.retrieval.lexical_confidence, DEFAULT_LEXICAL_CONFIDENCE);
        assert_eq!(config.retrieval.entity_confidence, DEFAULT_ENTITY_CONFIDENCE);
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_reranker_is_opt_in_by_default() {
        let config = Config::default();
        assert!(!config.reranker.enabled);
        assert_eq!(config.reranker.backend, "llm");
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(&temp.path().join("nope.toml"));
        assert!(matches!(result, Err(RetrieverError::ConfigNotFound { .. })));
    }
}
