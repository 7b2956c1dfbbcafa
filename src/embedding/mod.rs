mod batch;
mod keyword_index;
mod openai;
/// Embedding & Indexing
///
/// Query embedding plus the local index backends behind the retrieval
/// strategies:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - OpenAiEmbeddingProvider for hosted embedding
/// - HNSW for vector similarity search
/// - Tantivy for keyword search
/// - BatchIndexer for loading a pre-chunked corpus
mod provider;
mod vector_index;

pub use batch::{BatchIndexer, CorpusRecord, IndexReport};
pub use keyword_index::{KeywordIndex, KeywordIndexError};
pub use openai::OpenAiEmbeddingProvider;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{ChunkEntry, VectorIndex, VectorIndexError};

use crate::config::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for HNSW vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// HNSW construction parameter (higher = better recall, slower build)
    pub hnsw_ef_construction: usize,
    /// HNSW M parameter (number of connections per layer)
    pub hnsw_m: usize,
    /// Search breadth used at query time
    pub ef_search: usize,
    /// Upper bound on stored vectors
    pub max_elements: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw_ef_construction: 200,
            hnsw_m: 16,
            ef_search: 64,
            max_elements: 100_000,
        }
    }
}

/// Build the embedding provider named by `config.provider`
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        "openai" => Ok(Arc::new(OpenAiEmbeddingProvider::from_config(config)?)),
        other => Err(EmbeddingError::InitializationError(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}
