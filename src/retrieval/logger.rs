//! Retrieval telemetry for feedback-loop analytics

use crate::retrieval::SearchResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Log write failed: {0}")]
    Write(String),

    #[error("Log serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Compact per-result entry in a log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub id: String,
    pub confidence: f32,
}

/// One retrieval, as written to the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRecord {
    pub query_hash: String,
    pub query_text: String,
    pub results: Vec<ResultSummary>,
    pub expires_at: DateTime<Utc>,
}

impl RetrievalRecord {
    pub fn new(
        query_hash: impl Into<String>,
        query_text: impl Into<String>,
        results: &[SearchResult],
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            query_hash: query_hash.into(),
            query_text: query_text.into(),
            results: results
                .iter()
                .map(|r| ResultSummary {
                    id: r.id.clone(),
                    confidence: r.confidence,
                })
                .collect(),
            expires_at,
        }
    }
}

/// Durable sink for retrieval records
#[async_trait]
pub trait RetrievalLog: Send + Sync {
    async fn append(&self, record: RetrievalRecord) -> Result<(), LogError>;
}

/// Log that discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRetrievalLog;

#[async_trait]
impl RetrievalLog for NoopRetrievalLog {
    async fn append(&self, record: RetrievalRecord) -> Result<(), LogError> {
        tracing::trace!("Discarding retrieval record for '{}'", record.query_text);
        Ok(())
    }
}
