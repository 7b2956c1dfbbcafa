//! Adapters turning each collaborator index into a ranked candidate list

use crate::config::PackFilterScope;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::retrieval::{
    Candidate, EntityIndex, IndexError, LexicalIndex, RetrievalOptions, SemanticIndex,
    StrategyKind,
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index query failed: {0}")]
    Index(#[from] IndexError),
}

/// Collapse a strategy failure into "no candidates from this strategy"
pub fn soft_fail(kind: StrategyKind, result: Result<Vec<Candidate>, StrategyError>) -> Vec<Candidate> {
    match result {
        Ok(candidates) => {
            debug!("{} strategy returned {} candidates", kind, candidates.len());
            candidates
        }
        Err(e) => {
            warn!("{} strategy failed, continuing without it: {}", kind, e);
            Vec::new()
        }
    }
}

fn retain_pack(candidates: &mut Vec<Candidate>, scope: PackFilterScope, pack: Option<&str>) {
    if let (PackFilterScope::AllStrategies, Some(pack)) = (scope, pack) {
        candidates.retain(|c| c.source.as_deref() == Some(pack));
    }
}

/// Vector search: embeds the query, then asks the semantic index
pub struct SemanticStrategy {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SemanticIndex>,
    limit: usize,
}

impl SemanticStrategy {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SemanticIndex>,
        limit: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            limit,
        }
    }

    /// Candidate scores are the index similarities. Only the first pack is used.
    pub async fn search(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<Candidate>, StrategyError> {
        let vector = self.embedder.embed(query).await?;

        let mut candidates = self
            .index
            .query(&vector, options.pack_filter(), self.limit)
            .await?;

        candidates.truncate(self.limit);
        for candidate in &mut candidates {
            candidate.strategy = StrategyKind::Semantic;
            candidate.score = candidate.score.clamp(0.0, 1.0);
        }

        Ok(candidates)
    }
}

/// Full-text search on the raw query
pub struct LexicalStrategy {
    index: Arc<dyn LexicalIndex>,
    limit: usize,
    confidence: f32,
    pack_scope: PackFilterScope,
}

impl LexicalStrategy {
    pub fn new(
        index: Arc<dyn LexicalIndex>,
        limit: usize,
        confidence: f32,
        pack_scope: PackFilterScope,
    ) -> Self {
        Self {
            index,
            limit,
            confidence,
            pack_scope,
        }
    }

    /// Every hit gets the same fixed confidence; index order is the rank.
    pub async fn search(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<Candidate>, StrategyError> {
        let mut candidates = self.index.query(query, self.limit).await?;

        candidates.truncate(self.limit);
        retain_pack(&mut candidates, self.pack_scope, options.pack_filter());
        for candidate in &mut candidates {
            candidate.strategy = StrategyKind::Lexical;
            candidate.score = self.confidence;
        }

        Ok(candidates)
    }
}

/// Entity-grounded search: match entities, then fetch content mentioning them
pub struct EntityGraphStrategy {
    index: Arc<dyn EntityIndex>,
    match_limit: usize,
    content_limit: usize,
    confidence: f32,
    pack_scope: PackFilterScope,
}

impl EntityGraphStrategy {
    pub fn new(
        index: Arc<dyn EntityIndex>,
        match_limit: usize,
        content_limit: usize,
        confidence: f32,
        pack_scope: PackFilterScope,
    ) -> Self {
        Self {
            index,
            match_limit,
            content_limit,
            confidence,
            pack_scope,
        }
    }

    /// Entities are visited in match order; a failed content lookup for one
    /// entity skips that entity only. The same chunk may appear once per
    /// entity that mentions it.
    pub async fn search(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<Candidate>, StrategyError> {
        let mut entities = self.index.match_entities(query, self.match_limit).await?;
        entities.truncate(self.match_limit);

        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for entity in entities {
            let mut chunks = match self
                .index
                .content_by_entity(&entity.canonical_name, self.content_limit)
                .await
            {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(
                        "Content lookup for entity '{}' failed: {}",
                        entity.canonical_name, e
                    );
                    continue;
                }
            };

            chunks.truncate(self.content_limit);
            for mut chunk in chunks {
                chunk.strategy = StrategyKind::Entity;
                chunk.score = self.confidence;
                if let Value::Object(map) = &mut chunk.metadata {
                    map.insert(
                        "entity".to_string(),
                        Value::String(entity.entity_name.clone()),
                    );
                } else {
                    chunk.metadata = serde_json::json!({ "entity": entity.entity_name });
                }
                candidates.push(chunk);
            }
        }

        retain_pack(&mut candidates, self.pack_scope, options.pack_filter());
        Ok(candidates)
    }
}
