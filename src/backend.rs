//! Local, self-contained collaborator set for the retriever
//!
//! In-memory HNSW and tantivy indexes plus the entity graph, populated from a
//! pre-chunked corpus, with citations and the retrieval log in SQLite.

use crate::embedding::{
    BatchIndexer, CorpusRecord, EmbeddingProvider, IndexConfig, IndexReport, KeywordIndex,
    VectorIndex,
};
use crate::entities::EntityGraph;
use crate::error::Result;
use crate::retrieval::KnowledgeRetrieverBuilder;
use crate::storage::{Database, SqliteMetadataStore, SqliteRetrievalLog};
use std::sync::Arc;

pub struct LocalBackend {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<VectorIndex>,
    keyword_index: Arc<KeywordIndex>,
    entity_graph: Arc<EntityGraph>,
    database: Database,
}

impl LocalBackend {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        database: Database,
        index_config: &IndexConfig,
    ) -> Result<Self> {
        let vector_index = Arc::new(VectorIndex::new(embedder.dimension(), index_config));
        let keyword_index = Arc::new(KeywordIndex::in_memory().map_err(anyhow::Error::from)?);
        let entity_graph = Arc::new(EntityGraph::new(keyword_index.clone()));

        Ok(Self {
            embedder,
            vector_index,
            keyword_index,
            entity_graph,
            database,
        })
    }

    /// Embed and index `records`
    pub async fn load(&self, records: Vec<CorpusRecord>, batch_size: usize) -> Result<IndexReport> {
        BatchIndexer::new(
            self.embedder.clone(),
            self.vector_index.clone(),
            self.keyword_index.clone(),
            self.entity_graph.clone(),
            batch_size,
        )
        .with_database(self.database.clone())
        .index(records)
        .await
    }

    /// A builder with every collaborator wired; reranker, cache and config
    /// are left to the caller
    pub fn retriever_builder(&self) -> KnowledgeRetrieverBuilder {
        KnowledgeRetrieverBuilder::default()
            .embedder(self.embedder.clone())
            .semantic_index(self.vector_index.clone())
            .lexical_index(self.keyword_index.clone())
            .entity_index(self.entity_graph.clone())
            .metadata_store(Arc::new(SqliteMetadataStore::new(self.database.clone())))
            .retrieval_log(Arc::new(SqliteRetrievalLog::new(self.database.clone())))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn entity_graph(&self) -> &EntityGraph {
        &self.entity_graph
    }
}
