//! Storage layer
//!
//! SQLite-backed corpus metadata and retrieval log, exposed to the retriever
//! through its collaborator traits

pub mod database;

use crate::error::{Result, RetrieverError};
use crate::retrieval::{CitationInfo, IndexError, LogError, MetadataStore, RetrievalLog, RetrievalRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use database::{Database, DbPool, DbStats, LoggedRetrieval};

/// Owns the data directory and the database inside it
pub struct StorageManager {
    pub database: Database,
    base_path: PathBuf,
}

impl StorageManager {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path).map_err(|e| RetrieverError::Io {
            source: e,
            context: format!("Failed to create data directory: {}", base_path.display()),
        })?;

        let database = Database::new(&base_path.join("db.sqlite"))?;

        Ok(Self {
            database,
            base_path,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn metadata_store(&self) -> SqliteMetadataStore {
        SqliteMetadataStore::new(self.database.clone())
    }

    pub fn retrieval_log(&self) -> SqliteRetrievalLog {
        SqliteRetrievalLog::new(self.database.clone())
    }
}

/// Citation metadata read from the documents table
#[derive(Clone)]
pub struct SqliteMetadataStore {
    database: Database,
}

impl SqliteMetadataStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn citation_info(&self, chunk_id: &str) -> std::result::Result<Option<CitationInfo>, IndexError> {
        let database = self.database.clone();
        let chunk_id = chunk_id.to_string();

        tokio::task::spawn_blocking(move || database.citation_info(&chunk_id))
            .await
            .map_err(|e| IndexError::Backend(format!("Lookup task failed: {}", e)))?
            .map_err(|e| IndexError::Backend(e.to_string()))
    }
}

/// Retrieval log persisted in SQLite, one row per distinct query
#[derive(Clone)]
pub struct SqliteRetrievalLog {
    database: Database,
}

impl SqliteRetrievalLog {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl RetrievalLog for SqliteRetrievalLog {
    async fn append(&self, record: RetrievalRecord) -> std::result::Result<(), LogError> {
        let database = self.database.clone();

        tokio::task::spawn_blocking(move || database.upsert_retrieval(&record))
            .await
            .map_err(|e| LogError::Write(format!("Log task failed: {}", e)))?
            .map_err(|e| LogError::Write(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_storage_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("data");
        let storage = StorageManager::new(base.clone()).unwrap();

        assert_eq!(storage.base_path(), base.as_path());
        assert!(base.join("db.sqlite").exists());
    }

    #[tokio::test]
    async fn test_trait_adapters() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();

        let store = storage.metadata_store();
        assert!(store.citation_info("missing").await.unwrap().is_none());

        let log = storage.retrieval_log();
        log.append(RetrievalRecord::new("h", "rent", &[], Utc::now()))
            .await
            .unwrap();

        let entries = storage.database.recent_retrievals(5).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.query_hash, "h");
    }
}
