//! The retrieval pipeline
//!
//! cache check -> concurrent strategies -> fuse -> rerank -> diversify ->
//! filter/limit -> citations -> cache store -> log

use crate::config::{RetrievalConfig, MAX_CACHE_TTL_SECS};
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrieverError};
use crate::retrieval::{
    apply_ranking, attach_citations, cache_key, filter_and_limit,
    maximal_marginal_relevance, reciprocal_rank_fusion, soft_fail, DiversityConfig,
    EntityGraphStrategy, EntityIndex, FusedResult, FusionConfig, LexicalIndex, LexicalStrategy,
    MemoryCache, MetadataStore, NoopRetrievalLog, Reranker, ResultCache, RetrievalLog,
    RetrievalOptions, RetrievalRecord, SearchResult, SemanticIndex, SemanticStrategy,
    StrategyKind,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Knowledge retriever combining semantic, lexical and entity-graph search
///
/// `retrieve` only returns an error for an unusable query or options; every
/// collaborator failure during the pipeline degrades the result instead.
pub struct KnowledgeRetriever {
    semantic: SemanticStrategy,
    lexical: LexicalStrategy,
    entity: EntityGraphStrategy,
    reranker: Option<Arc<dyn Reranker>>,
    metadata: Arc<dyn MetadataStore>,
    cache: Arc<dyn ResultCache>,
    log: Arc<dyn RetrievalLog>,
    fusion: FusionConfig,
    diversity: DiversityConfig,
    cache_ttl: Duration,
}

impl KnowledgeRetriever {
    pub fn builder() -> KnowledgeRetrieverBuilder {
        KnowledgeRetrieverBuilder::default()
    }

    /// Retrieve ranked, diversified, cited results for `query`
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(RetrieverError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        options.validate().map_err(RetrieverError::InvalidOptions)?;

        // Step 1: Cache lookup
        let key = match cache_key(query, options) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Cache key unavailable, bypassing cache: {}", e);
                None
            }
        };

        if let Some(key) = &key {
            match self.cache.get(key).await {
                Ok(Some(hit)) => {
                    debug!("Cache hit for '{}' ({} results)", query, hit.len());
                    return Ok(hit);
                }
                Ok(None) => debug!("Cache miss for '{}'", query),
                Err(e) => warn!("Cache read failed: {}", e),
            }
        }

        // Step 2: Concurrent strategies, each failing soft
        let (semantic, lexical, entity) = tokio::join!(
            self.semantic.search(query, options),
            self.lexical.search(query, options),
            self.entity.search(query, options),
        );

        let candidate_lists = vec![
            soft_fail(StrategyKind::Semantic, semantic),
            soft_fail(StrategyKind::Lexical, lexical),
            soft_fail(StrategyKind::Entity, entity),
        ];

        // Step 3: Reciprocal Rank Fusion
        let fused = reciprocal_rank_fusion(candidate_lists, &self.fusion);
        debug!("Fused {} distinct candidates", fused.len());

        // Step 4: Optional rerank
        let ranked = if options.rerank && !fused.is_empty() {
            self.rerank(query, fused).await
        } else {
            fused
        };

        // Step 5: Diversify, then filter before limiting
        let diversified = maximal_marginal_relevance(ranked, &self.diversity);
        let limited = filter_and_limit(diversified, options.min_confidence, options.top_k);

        let mut results: Vec<SearchResult> = limited.into_iter().map(SearchResult::from).collect();

        // Step 6: Citations
        if options.include_sources {
            attach_citations(&mut results, self.metadata.as_ref()).await;
        }

        // Step 7: Cache store and log, both best-effort
        if let Some(key) = &key {
            if let Err(e) = self.cache.set(key, results.clone(), self.cache_ttl).await {
                warn!("Cache write failed: {}", e);
            }
        }

        self.log_retrieval(query, &results).await;

        info!("Retrieved {} results for '{}'", results.len(), query);
        Ok(results)
    }

    async fn rerank(&self, query: &str, fused: Vec<FusedResult>) -> Vec<FusedResult> {
        let Some(reranker) = &self.reranker else {
            warn!("Rerank requested but no reranker configured, keeping fused order");
            return fused;
        };

        match reranker.rerank(query, &fused).await {
            Ok(indices) if indices.iter().any(|&i| i < fused.len()) => {
                debug!("{} reordered {} candidates", reranker.name(), indices.len());
                apply_ranking(fused, &indices)
            }
            Ok(_) => {
                warn!("Reranker returned no valid indices, keeping fused order");
                fused
            }
            Err(e) => {
                warn!("Reranking failed, keeping fused order: {}", e);
                fused
            }
        }
    }

    async fn log_retrieval(&self, query: &str, results: &[SearchResult]) {
        let query_hash = blake3::hash(query.as_bytes()).to_hex().to_string();
        let ttl = chrono::Duration::from_std(self.cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let record = RetrievalRecord::new(query_hash, query, results, chrono::Utc::now() + ttl);

        if let Err(e) = self.log.append(record).await {
            warn!("Retrieval log write failed: {}", e);
        }
    }
}

/// Builder wiring collaborators into a [`KnowledgeRetriever`]
#[derive(Default)]
pub struct KnowledgeRetrieverBuilder {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    semantic_index: Option<Arc<dyn SemanticIndex>>,
    lexical_index: Option<Arc<dyn LexicalIndex>>,
    entity_index: Option<Arc<dyn EntityIndex>>,
    metadata: Option<Arc<dyn MetadataStore>>,
    reranker: Option<Arc<dyn Reranker>>,
    cache: Option<Arc<dyn ResultCache>>,
    log: Option<Arc<dyn RetrievalLog>>,
    config: RetrievalConfig,
    cache_ttl: Option<Duration>,
}

impl KnowledgeRetrieverBuilder {
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn semantic_index(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.semantic_index = Some(index);
        self
    }

    pub fn lexical_index(mut self, index: Arc<dyn LexicalIndex>) -> Self {
        self.lexical_index = Some(index);
        self
    }

    pub fn entity_index(mut self, index: Arc<dyn EntityIndex>) -> Self {
        self.entity_index = Some(index);
        self
    }

    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Defaults to a fresh [`MemoryCache`]
    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Defaults to [`NoopRetrievalLog`]
    pub fn retrieval_log(mut self, log: Arc<dyn RetrievalLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to one hour
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn build(self) -> Result<KnowledgeRetriever> {
        let config = self.config;

        let fusion = FusionConfig::new(config.rrf_k, config.confidence_scale)
            .map_err(|e| RetrieverError::Config(e.to_string()))?;

        if !(0.0..=1.0).contains(&config.mmr_lambda) {
            return Err(RetrieverError::InvalidConfigValue {
                path: "retrieval.mmr_lambda".to_string(),
                message: format!("must be between 0.0 and 1.0, got {}", config.mmr_lambda),
            });
        }
        if config.diversity_cap == 0 {
            return Err(RetrieverError::InvalidConfigValue {
                path: "retrieval.diversity_cap".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        let cache_ttl = self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL);
        if cache_ttl > Duration::from_secs(MAX_CACHE_TTL_SECS) {
            return Err(RetrieverError::InvalidConfigValue {
                path: "cache.ttl_secs".to_string(),
                message: format!(
                    "must be at most {} seconds, got {}",
                    MAX_CACHE_TTL_SECS,
                    cache_ttl.as_secs()
                ),
            });
        }

        let embedder = require(self.embedder, "embedding provider")?;
        let semantic_index = require(self.semantic_index, "semantic index")?;
        let lexical_index = require(self.lexical_index, "lexical index")?;
        let entity_index = require(self.entity_index, "entity index")?;
        let metadata = require(self.metadata, "metadata store")?;

        Ok(KnowledgeRetriever {
            semantic: SemanticStrategy::new(embedder, semantic_index, config.semantic_limit),
            lexical: LexicalStrategy::new(
                lexical_index,
                config.lexical_limit,
                config.lexical_confidence,
                config.pack_filter_scope,
            ),
            entity: EntityGraphStrategy::new(
                entity_index,
                config.entity_match_limit,
                config.entity_content_limit,
                config.entity_confidence,
                config.pack_filter_scope,
            ),
            reranker: self.reranker,
            metadata,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(MemoryCache::new())),
            log: self.log.unwrap_or_else(|| Arc::new(NoopRetrievalLog)),
            fusion,
            diversity: DiversityConfig {
                lambda: config.mmr_lambda,
                cap: config.diversity_cap,
            },
            cache_ttl,
        })
    }
}

fn require<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| RetrieverError::Config(format!("No {} configured", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_collaborators() {
        match KnowledgeRetriever::builder().build() {
            Err(RetrieverError::Config(message)) => {
                assert!(message.contains("embedding provider"))
            }
            other => panic!("expected configuration error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_build_rejects_invalid_lambda() {
        let config = RetrievalConfig {
            mmr_lambda: 2.0,
            ..RetrievalConfig::default()
        };

        let result = KnowledgeRetriever::builder().config(config).build();
        assert!(matches!(
            result,
            Err(RetrieverError::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_build_rejects_unbounded_cache_ttl() {
        let result = KnowledgeRetriever::builder()
            .cache_ttl(Duration::from_secs(u64::MAX))
            .build();

        match result {
            Err(RetrieverError::InvalidConfigValue { path, .. }) => {
                assert_eq!(path, "cache.ttl_secs")
            }
            other => panic!("expected invalid TTL, got {:?}", other.err()),
        }
    }
}
