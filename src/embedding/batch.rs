/// Batch indexer loading a pre-chunked corpus into the local backends
use super::{EmbeddingProvider, KeywordIndex, VectorIndex};
use crate::embedding::ChunkEntry;
use crate::entities::{EntityGraph, EntityMention};
use crate::error::{Result, RetrieverError};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One chunk of the corpus, as read from a JSONL line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: String,
    pub document_id: String,
    pub title: String,
    pub pack: String,
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub entities: Vec<EntityMention>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl CorpusRecord {
    /// Read a JSONL corpus; blank lines are ignored
    pub fn read_jsonl(path: &Path) -> Result<Vec<Self>> {
        let content = std::fs::read_to_string(path).map_err(|e| RetrieverError::Io {
            source: e,
            context: format!("Failed to read corpus file: {}", path.display()),
        })?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| RetrieverError::Json {
                    source: e,
                    context: format!("{}:{}", path.display(), n + 1),
                })
            })
            .collect()
    }
}

/// Outcome of an indexing run
#[derive(Debug, Default)]
pub struct IndexReport {
    pub indexed: usize,
    /// Empty or repeated chunks
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Embeds corpus chunks and feeds the vector, keyword and entity indexes
///
/// Chunks are embedded `batch_size` at a time. A failed batch is counted and
/// skipped; the rest of the corpus is still indexed.
pub struct BatchIndexer {
    provider: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<VectorIndex>,
    keyword_index: Arc<KeywordIndex>,
    entity_graph: Arc<EntityGraph>,
    database: Option<Database>,
    batch_size: usize,
}

impl BatchIndexer {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<VectorIndex>,
        keyword_index: Arc<KeywordIndex>,
        entity_graph: Arc<EntityGraph>,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            vector_index,
            keyword_index,
            entity_graph,
            database: None,
            batch_size: batch_size.max(1),
        }
    }

    /// Also persist document and chunk metadata for citations
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub async fn index(&self, records: Vec<CorpusRecord>) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let mut report = IndexReport::default();

        info!("Indexing {} corpus records", records.len());

        let mut seen = HashSet::new();
        let records: Vec<CorpusRecord> = records
            .into_iter()
            .filter(|r| {
                let keep = !r.content.trim().is_empty() && seen.insert(r.id.clone());
                if !keep {
                    report.skipped += 1;
                }
                keep
            })
            .collect();

        for batch in records.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|r| r.content.clone()).collect();

            let vectors = match self.provider.embed_batch(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => vectors,
                Ok(vectors) => {
                    warn!(
                        "Embedding batch returned {} vectors for {} chunks",
                        vectors.len(),
                        batch.len()
                    );
                    report.failed += batch.len();
                    continue;
                }
                Err(e) => {
                    warn!("Failed to embed batch: {}", e);
                    report.failed += batch.len();
                    continue;
                }
            };

            for (record, vector) in batch.iter().zip(vectors) {
                match self.index_record(record, &vector) {
                    Ok(()) => report.indexed += 1,
                    Err(e) => {
                        warn!("Failed to index chunk {}: {}", record.id, e);
                        report.failed += 1;
                    }
                }
            }
            debug!("Indexed batch of {} chunks", batch.len());
        }

        self.keyword_index.commit().map_err(anyhow::Error::from)?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Indexing complete: {} indexed, {} skipped, {} failed, {}ms",
            report.indexed, report.skipped, report.failed, report.duration_ms
        );

        Ok(report)
    }

    fn index_record(&self, record: &CorpusRecord, vector: &[f32]) -> Result<()> {
        let entry = ChunkEntry {
            id: record.id.clone(),
            title: record.title.clone(),
            pack: record.pack.clone(),
            content: record.content.clone(),
            metadata: record.metadata.clone(),
        };

        self.vector_index
            .insert(entry, vector)
            .map_err(anyhow::Error::from)?;
        self.keyword_index
            .insert(record)
            .map_err(anyhow::Error::from)?;

        for mention in &record.entities {
            self.entity_graph.add_mention(&record.id, mention);
        }

        if let Some(database) = &self.database {
            database.upsert_record(record)?;
        }

        Ok(())
    }
}
