//! SQLite database management with migrations
//!
//! Provides structured storage for corpus documents, chunks, entities and the
//! retrieval log

use crate::embedding::CorpusRecord;
use crate::error::{Result, RetrieverError};
use crate::retrieval::{CitationInfo, RetrievalRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RetrieverError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| RetrieverError::Config(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| RetrieverError::Config(format!("Failed to get connection: {}", e)))?;

            // WAL mode persists in the database file
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| RetrieverError::Config(format!("Failed to get connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Store a corpus chunk with its parent document and declared entities
    ///
    /// Re-storing a chunk replaces its content and entity rows.
    pub fn upsert_record(&self, record: &CorpusRecord) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let metadata = serde_json::to_string(&record.metadata).map_err(|e| RetrieverError::Json {
            source: e,
            context: format!("Failed to encode metadata for chunk {}", record.id),
        })?;

        tx.execute(
            "INSERT INTO documents (id, title, pack, url, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                pack = excluded.pack,
                url = COALESCE(excluded.url, documents.url),
                updated_at = COALESCE(excluded.updated_at, documents.updated_at)",
            params![
                record.document_id,
                record.title,
                record.pack,
                record.url,
                record.updated_at.map(|d| d.to_rfc3339()),
            ],
        )?;

        tx.execute(
            "INSERT INTO chunks (id, document_id, content, metadata)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                document_id = excluded.document_id,
                content = excluded.content,
                metadata = excluded.metadata",
            params![record.id, record.document_id, record.content, metadata],
        )?;

        tx.execute("DELETE FROM entities WHERE chunk_id = ?1", params![record.id])?;
        for entity in &record.entities {
            tx.execute(
                "INSERT INTO entities (chunk_id, name) VALUES (?1, ?2)",
                params![record.id, entity.name],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Citation fields of the document owning `chunk_id`
    pub fn citation_info(&self, chunk_id: &str) -> Result<Option<CitationInfo>> {
        let conn = self.get_conn()?;

        let row = conn
            .query_row(
                "SELECT d.title, d.pack, d.url, d.updated_at
                 FROM chunks c JOIN documents d ON d.id = c.document_id
                 WHERE c.id = ?1",
                params![chunk_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(title, source, url, updated_at)| CitationInfo {
            title,
            source,
            url,
            date: updated_at.as_deref().and_then(parse_timestamp),
        }))
    }

    /// Insert or replace the log entry for `record.query_hash`
    pub fn upsert_retrieval(&self, record: &RetrievalRecord) -> Result<()> {
        let conn = self.get_conn()?;

        let results = serde_json::to_string(&record.results).map_err(|e| RetrieverError::Json {
            source: e,
            context: "Failed to encode retrieval results".to_string(),
        })?;

        conn.execute(
            "INSERT INTO retrieval_log (query_hash, query_text, results, expires_at, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(query_hash) DO UPDATE SET
                query_text = excluded.query_text,
                results = excluded.results,
                expires_at = excluded.expires_at,
                logged_at = excluded.logged_at",
            params![
                record.query_hash,
                record.query_text,
                results,
                record.expires_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;

        Ok(())
    }

    /// Most recently logged retrievals, newest first
    pub fn recent_retrievals(&self, limit: usize) -> Result<Vec<LoggedRetrieval>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT query_hash, query_text, results, expires_at, logged_at
             FROM retrieval_log
             ORDER BY logged_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (query_hash, query_text, results, expires_at, logged_at) = row?;

            let results = serde_json::from_str(&results).map_err(|e| RetrieverError::Json {
                source: e,
                context: format!("Corrupt results for query {}", query_hash),
            })?;

            entries.push(LoggedRetrieval {
                record: RetrievalRecord {
                    query_hash,
                    query_text,
                    results,
                    expires_at: parse_timestamp(&expires_at).unwrap_or_else(Utc::now),
                },
                logged_at: parse_timestamp(&logged_at).unwrap_or_else(Utc::now),
            });
        }

        Ok(entries)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(DbStats {
            document_count: count("documents")?,
            chunk_count: count("chunks")?,
            entity_count: count("entities")?,
            retrieval_count: count("retrieval_log")?,
        })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// A retrieval log row
#[derive(Debug, Clone)]
pub struct LoggedRetrieval {
    pub record: RetrievalRecord,
    pub logged_at: DateTime<Utc>,
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub retrieval_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Corpus schema
    r#"
    CREATE TABLE documents (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        pack TEXT NOT NULL,
        url TEXT,
        updated_at TEXT
    );

    CREATE INDEX idx_documents_pack ON documents(pack);

    CREATE TABLE chunks (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT,  -- JSON metadata
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_chunks_document ON chunks(document_id);

    CREATE TABLE entities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chunk_id TEXT NOT NULL,
        name TEXT NOT NULL,
        FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_entities_chunk ON entities(chunk_id);
    CREATE INDEX idx_entities_name ON entities(name);
    "#,
    // Migration 2: Retrieval log
    r#"
    CREATE TABLE retrieval_log (
        query_hash TEXT PRIMARY KEY,
        query_text TEXT NOT NULL,
        results TEXT NOT NULL,  -- JSON [{id, confidence}]
        expires_at TEXT NOT NULL,
        logged_at TEXT NOT NULL
    );

    CREATE INDEX idx_retrieval_log_logged_at ON retrieval_log(logged_at);
    "#,
];
