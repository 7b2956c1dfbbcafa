//! Entity graph linking named entities to the chunks that mention them
//!
//! Entities are matched against query text by surface form (canonical name
//! or alias). Content for a matched entity comes from a full-text phrase
//! search of its canonical name.

use crate::retrieval::{Candidate, EntityIndex, EntityMatch, IndexError, LexicalIndex};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Surface forms need at least this share of their tokens in the query
const MIN_MATCH_SCORE: f32 = 0.5;

/// Entity as declared on a corpus record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Everything known about one canonical entity
#[derive(Debug, Clone, Default)]
pub struct EntityInfo {
    pub canonical_name: String,
    pub aliases: HashSet<String>,
    /// Chunks declaring this entity
    pub chunks: HashSet<String>,
}

impl EntityInfo {
    fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Entity graph backed by a full-text index for content lookup
pub struct EntityGraph {
    /// Keyed by lower-cased canonical name
    entities: RwLock<HashMap<String, EntityInfo>>,
    content: Arc<dyn LexicalIndex>,
}

impl EntityGraph {
    pub fn new(content: Arc<dyn LexicalIndex>) -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            content,
        }
    }

    /// Record that `chunk_id` mentions `mention`
    pub fn add_mention(&self, chunk_id: &str, mention: &EntityMention) {
        let name = mention.name.trim();
        if name.is_empty() {
            return;
        }

        let Ok(mut entities) = self.entities.write() else {
            tracing::warn!("Entity graph lock poisoned, dropping mention of '{}'", name);
            return;
        };

        let info = entities
            .entry(name.to_lowercase())
            .or_insert_with(|| EntityInfo {
                canonical_name: name.to_string(),
                ..EntityInfo::default()
            });

        info.chunks.insert(chunk_id.to_string());
        for alias in &mention.aliases {
            let alias = alias.trim();
            if !alias.is_empty() && !alias.eq_ignore_ascii_case(&info.canonical_name) {
                info.aliases.insert(alias.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entities.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an entity by canonical name, case-insensitively
    pub fn get(&self, canonical_name: &str) -> Option<EntityInfo> {
        self.entities
            .read()
            .ok()?
            .get(&canonical_name.to_lowercase())
            .cloned()
    }

    /// Best-scoring entities for `text`, strongest first
    ///
    /// An entity scores the largest share of any surface form's tokens found
    /// in the text. Ties go to the alphabetically first canonical name.
    pub fn find(&self, text: &str, limit: usize) -> Result<Vec<EntityMatch>, IndexError> {
        let query_tokens = tokenize(text);
        if query_tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let entities = self
            .entities
            .read()
            .map_err(|_| IndexError::Unavailable("Entity graph lock poisoned".to_string()))?;

        let mut matches: Vec<EntityMatch> = entities
            .values()
            .filter_map(|info| best_surface_match(info, &query_tokens))
            .filter(|m| m.score >= MIN_MATCH_SCORE)
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        });
        matches.truncate(limit);

        Ok(matches)
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn best_surface_match(info: &EntityInfo, query_tokens: &HashSet<String>) -> Option<EntityMatch> {
    info.surface_forms()
        .filter_map(|form| {
            let tokens = tokenize(form);
            if tokens.is_empty() {
                return None;
            }
            let hits = tokens.iter().filter(|t| query_tokens.contains(*t)).count();
            Some((form, hits as f32 / tokens.len() as f32))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(form, score)| EntityMatch {
            entity_name: form.to_string(),
            canonical_name: info.canonical_name.clone(),
            score,
        })
}

#[async_trait]
impl EntityIndex for EntityGraph {
    async fn match_entities(&self, text: &str, limit: usize) -> Result<Vec<EntityMatch>, IndexError> {
        self.find(text, limit)
    }

    async fn content_by_entity(
        &self,
        canonical_name: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        let phrase = canonical_name.replace('"', " ");
        if phrase.trim().is_empty() {
            return Err(IndexError::InvalidInput("Empty entity name".to_string()));
        }

        self.content
            .query(&format!("\"{}\"", phrase.trim()), limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::StrategyKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingIndex {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LexicalIndex for RecordingIndex {
        async fn query(&self, text: &str, _limit: usize) -> Result<Vec<Candidate>, IndexError> {
            self.queries.lock().unwrap().push(text.to_string());
            Ok(vec![Candidate::new("c1", "office rent", 1.0, StrategyKind::Lexical)])
        }
    }

    fn mention(name: &str, aliases: &[&str]) -> EntityMention {
        EntityMention {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn graph() -> EntityGraph {
        let graph = EntityGraph::new(Arc::new(RecordingIndex::default()));
        graph.add_mention("c1", &mention("Home Office Deduction", &["home office"]));
        graph.add_mention("c2", &mention("Rent", &[]));
        graph.add_mention("c3", &mention("Payroll Tax", &[]));
        graph.add_mention("c4", &mention("rent", &["lease"]));
        graph
    }

    #[test]
    fn test_mentions_merge_by_canonical_name() {
        let graph = graph();
        assert_eq!(graph.len(), 3);

        let rent = graph.get("RENT").unwrap();
        assert_eq!(rent.canonical_name, "Rent");
        assert_eq!(rent.chunks.len(), 2);
        assert!(rent.aliases.contains("lease"));
    }

    #[test]
    fn test_find_scores_by_token_overlap() {
        let graph = graph();
        let matches = graph.find("Can I deduct office rent at home?", 5).unwrap();

        let names: Vec<&str> = matches.iter().map(|m| m.canonical_name.as_str()).collect();
        assert_eq!(names, vec!["Home Office Deduction", "Rent"]);
        assert_eq!(matches[0].entity_name, "home office");
        assert_eq!(matches[0].score, 1.0);
    }

    #[test]
    fn test_find_respects_limit_and_threshold() {
        let graph = graph();
        assert_eq!(graph.find("office rent at home", 1).unwrap().len(), 1);
        assert!(graph.find("quarterly estimates", 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_content_lookup_is_phrase_search() {
        let index = Arc::new(RecordingIndex::default());
        let graph = EntityGraph::new(index.clone());

        let chunks = graph.content_by_entity("Home Office", 5).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(index.queries.lock().unwrap()[0], "\"Home Office\"");
    }
}
