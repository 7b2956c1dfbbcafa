//! Candidate, fused and final result structures with their provenance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Retrieval strategy that produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Semantic,
    Lexical,
    Entity,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Semantic => "semantic",
            StrategyKind::Lexical => "lexical",
            StrategyKind::Entity => "entity",
        };
        f.write_str(name)
    }
}

/// One strategy's hit, before fusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Chunk ID, the join key across strategies
    pub id: String,

    /// Chunk text
    pub content: String,

    /// Parent document title, when the strategy knows it
    pub title: Option<String>,

    /// Pack the parent document belongs to
    pub source: Option<String>,

    /// Strategy-local score (similarity or fixed default confidence)
    pub score: f32,

    /// Free-form metadata carried from the index
    pub metadata: Value,

    /// Strategy that produced this hit
    pub strategy: StrategyKind,
}

impl Candidate {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        score: f32,
        strategy: StrategyKind,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            title: None,
            source: None,
            score,
            metadata: Value::Object(Default::default()),
            strategy,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get a short preview of the content (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            self.content.clone()
        } else {
            let head: String = self.content.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }

    /// Fill fields this candidate lacks from another hit on the same id
    pub(crate) fn absorb(&mut self, other: &Candidate) {
        if self.title.is_none() {
            self.title = other.title.clone();
        }
        if self.source.is_none() {
            self.source = other.source.clone();
        }
        if let (Value::Object(mine), Value::Object(theirs)) = (&mut self.metadata, &other.metadata)
        {
            for (key, value) in theirs {
                mine.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
}

/// Candidate after Reciprocal Rank Fusion, one per distinct id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    pub candidate: Candidate,

    /// Normalized fused confidence in [0, 1]
    pub confidence: f32,

    /// Strategies whose lists contained this id, in first-seen order
    pub matched_by: Vec<StrategyKind>,
}

impl FusedResult {
    pub fn id(&self) -> &str {
        &self.candidate.id
    }

    pub fn content(&self) -> &str {
        &self.candidate.content
    }
}

/// Parent-document metadata used to build a citation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationInfo {
    pub title: String,
    pub source: String,
    pub url: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Provenance record attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub title: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    pub confidence: f32,
}

impl Citation {
    pub fn from_info(id: impl Into<String>, info: CitationInfo, confidence: f32) -> Self {
        Self {
            id: id.into(),
            title: info.title,
            source: info.source,
            url: info.url,
            date: info.date,
            confidence,
        }
    }
}

/// Final output item returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub title: Option<String>,
    pub source: Option<String>,

    /// Relevance in [0, 1]
    pub confidence: f32,
    pub metadata: Value,
    pub citations: Vec<Citation>,
}

impl From<FusedResult> for SearchResult {
    fn from(fused: FusedResult) -> Self {
        let Candidate {
            id,
            content,
            title,
            source,
            metadata,
            ..
        } = fused.candidate;

        Self {
            id,
            content,
            title,
            source,
            confidence: fused.confidence.clamp(0.0, 1.0),
            metadata,
            citations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preview_respects_char_boundaries() {
        let candidate = Candidate::new("c1", "déduction de loyer", 0.5, StrategyKind::Lexical);
        assert_eq!(candidate.preview(3), "déd...");
        assert_eq!(candidate.preview(100), "déduction de loyer");
    }

    #[test]
    fn test_absorb_fills_only_missing_fields() {
        let mut first = Candidate::new("c1", "text", 0.9, StrategyKind::Semantic)
            .with_metadata(json!({"section": "intro"}));
        let second = Candidate::new("c1", "text", 0.7, StrategyKind::Lexical)
            .with_title("Home office guide")
            .with_source("tax")
            .with_metadata(json!({"section": "other", "page": 4}));

        first.absorb(&second);

        assert_eq!(first.title.as_deref(), Some("Home office guide"));
        assert_eq!(first.source.as_deref(), Some("tax"));
        assert_eq!(first.metadata["section"], "intro");
        assert_eq!(first.metadata["page"], 4);
        assert_eq!(first.strategy, StrategyKind::Semantic);
    }

    #[test]
    fn test_search_result_clamps_confidence() {
        let fused = FusedResult {
            candidate: Candidate::new("c1", "text", 0.9, StrategyKind::Semantic),
            confidence: 1.3,
            matched_by: vec![StrategyKind::Semantic],
        };

        let result = SearchResult::from(fused);
        assert_eq!(result.confidence, 1.0);
        assert!(result.citations.is_empty());
    }
}
