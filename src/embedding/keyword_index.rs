/// Tantivy keyword index for full-text search
use crate::embedding::CorpusRecord;
use crate::retrieval::{Candidate, IndexError, LexicalIndex, StrategyKind};
use async_trait::async_trait;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError, Term};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

impl From<KeywordIndexError> for IndexError {
    fn from(e: KeywordIndexError) -> Self {
        IndexError::Backend(e.to_string())
    }
}

/// Tantivy keyword index over corpus chunks
///
/// Provides full-text search with BM25 ranking over chunk titles and content.
/// Writes are buffered until [`KeywordIndex::commit`].
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    title_field: Field,
    pack_field: Field,
    content_field: Field,
    metadata_field: Field,
}

impl KeywordIndex {
    /// Create an empty in-memory index
    pub fn in_memory() -> Result<Self, KeywordIndexError> {
        let mut schema_builder = Schema::builder();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let title_field = schema_builder.add_text_field("title", TEXT | STORED);
        let pack_field = schema_builder.add_text_field("pack", STRING | STORED);
        let content_field = schema_builder.add_text_field("content", TEXT | STORED);
        let metadata_field = schema_builder.add_text_field("metadata", STORED);

        let index = Index::create_in_ram(schema_builder.build());

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            title_field,
            pack_field,
            content_field,
            metadata_field,
        })
    }

    /// Add or replace a chunk
    pub fn insert(&self, record: &CorpusRecord) -> Result<(), KeywordIndexError> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        let writer = self.writer.lock().map_err(|_| {
            KeywordIndexError::InsertError("Index writer lock poisoned".to_string())
        })?;

        writer.delete_term(Term::from_field_text(self.id_field, &record.id));
        writer
            .add_document(doc!(
                self.id_field => record.id.as_str(),
                self.title_field => record.title.as_str(),
                self.pack_field => record.pack.as_str(),
                self.content_field => record.content.as_str(),
                self.metadata_field => metadata,
            ))
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        Ok(())
    }

    /// Commit pending writes and make them visible to searches
    pub fn commit(&self) -> Result<(), KeywordIndexError> {
        let mut writer = self.writer.lock().map_err(|_| {
            KeywordIndexError::InsertError("Index writer lock poisoned".to_string())
        })?;

        writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// Number of searchable chunks
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Search titles and content; best BM25 match first
    ///
    /// Query syntax errors are tolerated: whatever parses is searched.
    pub fn search(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, KeywordIndexError> {
        if text.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser =
            QueryParser::for_index(&self.index, vec![self.title_field, self.content_field]);
        let (query, errors) = query_parser.parse_query_lenient(text);
        if !errors.is_empty() {
            tracing::debug!("Ignored {} query syntax errors in '{}'", errors.len(), text);
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let field_text = |field: Field| {
                retrieved
                    .get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };

            let id = field_text(self.id_field);
            if id.is_empty() {
                return Err(KeywordIndexError::SearchError(
                    "Missing id field".to_string(),
                ));
            }

            let metadata = serde_json::from_str(&field_text(self.metadata_field))
                .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));

            let mut candidate =
                Candidate::new(id, field_text(self.content_field), score, StrategyKind::Lexical)
                    .with_metadata(metadata);

            let title = field_text(self.title_field);
            if !title.is_empty() {
                candidate = candidate.with_title(title);
            }
            let pack = field_text(self.pack_field);
            if !pack.is_empty() {
                candidate = candidate.with_source(pack);
            }

            results.push(candidate);
        }

        Ok(results)
    }
}

#[async_trait]
impl LexicalIndex for KeywordIndex {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, IndexError> {
        Ok(self.search(text, limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, pack: &str, title: &str, content: &str) -> CorpusRecord {
        CorpusRecord {
            id: id.to_string(),
            document_id: format!("doc-{}", id),
            title: title.to_string(),
            pack: pack.to_string(),
            content: content.to_string(),
            url: None,
            updated_at: None,
            metadata: serde_json::json!({ "section": id }),
            entities: Vec::new(),
        }
    }

    fn populated() -> KeywordIndex {
        let index = KeywordIndex::in_memory().unwrap();
        index
            .insert(&record(
                "c1",
                "tax",
                "Home office",
                "You may deduct office rent for a dedicated workspace.",
            ))
            .unwrap();
        index
            .insert(&record(
                "c2",
                "payroll",
                "Withholding",
                "Employers withhold income tax from wages.",
            ))
            .unwrap();
        index.commit().unwrap();
        index
    }

    #[test]
    fn test_search_ranks_matching_chunk() {
        let index = populated();
        assert_eq!(index.len(), 2);

        let results = index.search("office rent", 10).unwrap();
        assert_eq!(results[0].id, "c1");
        assert_eq!(results[0].source.as_deref(), Some("tax"));
        assert_eq!(results[0].title.as_deref(), Some("Home office"));
        assert_eq!(results[0].metadata["section"], "c1");
    }

    #[test]
    fn test_malformed_query_is_tolerated() {
        let index = populated();
        let results = index.search("rent AND (", 10).unwrap();
        assert!(results.iter().any(|c| c.id == "c1"));
    }

    #[test]
    fn test_reinsert_replaces_chunk() {
        let index = populated();
        index
            .insert(&record("c1", "tax", "Home office", "Mileage logs for vehicles."))
            .unwrap();
        index.commit().unwrap();

        assert_eq!(index.len(), 2);
        assert!(index.search("rent", 10).unwrap().is_empty());
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let index = populated();
        assert!(index.search("   ", 10).unwrap().is_empty());
    }
}
