//! Interfaces for the external collaborators the retriever reads from

use crate::retrieval::{Candidate, CitationInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index backend failed: {0}")]
    Backend(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Index unavailable: {0}")]
    Unavailable(String),
}

/// Named entity matched against query text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    /// Name as it matched the query
    pub entity_name: String,

    /// Canonical name used to look up mentioning content
    pub canonical_name: String,

    /// Fuzzy match strength in [0, 1]
    pub score: f32,
}

/// Vector similarity index
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Nearest chunks to `vector`, optionally restricted to one pack.
    /// Candidate scores are similarities.
    async fn query(
        &self,
        vector: &[f32],
        pack: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Candidate>, IndexError>;
}

/// Full-text index
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, IndexError>;
}

/// Named-entity index
#[async_trait]
pub trait EntityIndex: Send + Sync {
    async fn match_entities(&self, text: &str, limit: usize)
        -> Result<Vec<EntityMatch>, IndexError>;

    async fn content_by_entity(
        &self,
        canonical_name: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, IndexError>;
}

/// Parent-document metadata lookup for citations
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// `Ok(None)` when the chunk or its document is unknown
    async fn citation_info(&self, chunk_id: &str) -> Result<Option<CitationInfo>, IndexError>;
}
