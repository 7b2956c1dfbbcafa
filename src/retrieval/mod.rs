//! Hybrid Retrieval & Reranking
//!
//! Fans a query out to semantic, lexical and entity-graph strategies, fuses
//! the lists with Reciprocal Rank Fusion, optionally reranks, diversifies with
//! MMR, filters by confidence and attaches citations.

mod cache;
mod citations;
mod diversity;
mod fusion;
mod logger;
mod provenance;
mod reranker;
mod retriever;
mod sources;
mod strategies;

pub use cache::{cache_key, CacheEntry, CacheError, MemoryCache, ResultCache};
pub use citations::{attach_citations, filter_and_limit};
pub use diversity::{maximal_marginal_relevance, text_similarity, DiversityConfig};
pub use fusion::{reciprocal_rank_fusion, FusionConfig, FusionError};
pub use logger::{LogError, NoopRetrievalLog, ResultSummary, RetrievalLog, RetrievalRecord};
pub use provenance::{Candidate, Citation, CitationInfo, FusedResult, SearchResult, StrategyKind};
pub use reranker::{
    apply_ranking, build_ranking_prompt, parse_ranking, reranker_from_config,
    CrossEncoderReranker, LlmReranker, RerankError, Reranker,
};
pub use retriever::{KnowledgeRetriever, KnowledgeRetrieverBuilder};
pub use sources::{EntityIndex, EntityMatch, IndexError, LexicalIndex, MetadataStore, SemanticIndex};
pub use strategies::{
    soft_fail, EntityGraphStrategy, LexicalStrategy, SemanticStrategy, StrategyError,
};

use serde::{Deserialize, Serialize};

/// Tunable behavior of a single retrieval
///
/// `domains` and `max_age` are accepted and take part in the cache key but
/// do not filter anything yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalOptions {
    /// Maximum number of results returned
    pub top_k: usize,

    /// Pack filter; only the first pack is applied
    pub packs: Vec<String>,

    /// Reserved domain filter
    pub domains: Vec<String>,

    /// Results below this confidence are dropped
    pub min_confidence: f32,

    /// Attach citations to results
    pub include_sources: bool,

    /// Reserved freshness filter, in days
    pub max_age: Option<u32>,

    /// Run the reranker on the fused list
    pub rerank: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            packs: Vec::new(),
            domains: Vec::new(),
            min_confidence: 0.7,
            include_sources: true,
            max_age: None,
            rerank: true,
        }
    }
}

impl RetrievalOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_packs(mut self, packs: Vec<String>) -> Self {
        self.packs = packs;
        self
    }

    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = domains;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_include_sources(mut self, include_sources: bool) -> Self {
        self.include_sources = include_sources;
        self
    }

    pub fn with_max_age(mut self, days: u32) -> Self {
        self.max_age = Some(days);
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = rerank;
        self
    }

    /// The single pack the semantic index is restricted to
    pub fn pack_filter(&self) -> Option<&str> {
        self.packs.first().map(String::as_str)
    }

    /// Check values the pipeline cannot interpret
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!(
                "minConfidence must be between 0.0 and 1.0, got {}",
                self.min_confidence
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RetrievalOptions::default();
        assert_eq!(options.top_k, 10);
        assert_eq!(options.min_confidence, 0.7);
        assert!(options.include_sources);
        assert!(options.rerank);
        assert!(options.pack_filter().is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: RetrievalOptions =
            serde_json::from_str(r#"{"topK": 5, "packs": ["tax", "payroll"]}"#).unwrap();

        assert_eq!(options.top_k, 5);
        assert_eq!(options.pack_filter(), Some("tax"));
        assert_eq!(options.min_confidence, 0.7);
        assert!(options.rerank);
    }

    #[test]
    fn test_validate_min_confidence() {
        assert!(RetrievalOptions::default().validate().is_ok());
        assert!(RetrievalOptions::default()
            .with_min_confidence(1.0)
            .validate()
            .is_ok());
        assert!(RetrievalOptions::default()
            .with_min_confidence(1.5)
            .validate()
            .is_err());
    }
}
