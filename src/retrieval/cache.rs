//! Memoization of whole retrievals by (query, options)
//!
//! Entries are written once and replaced wholesale on the next miss. Expiry
//! is checked lazily on lookup; nothing evicts in the background, so a
//! long-running process keeps stale entries until `purge_expired` is called.

use crate::retrieval::{RetrievalOptions, SearchResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache key serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache backend failed: {0}")]
    Backend(String),
}

/// Deterministic key for a (query, options) pair
///
/// BLAKE3 over the query text and the JSON-serialized options.
pub fn cache_key(query: &str, options: &RetrievalOptions) -> Result<String, CacheError> {
    let serialized = serde_json::to_vec(options)?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(query.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(&serialized);

    Ok(hasher.finalize().to_hex().to_string())
}

/// Storage for memoized retrievals
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Unexpired entry for `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Vec<SearchResult>>, CacheError>;

    /// Store `value` under `key`, replacing any previous entry
    async fn set(&self, key: &str, value: Vec<SearchResult>, ttl: Duration)
        -> Result<(), CacheError>;
}

/// Memoized response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub results: Arc<Vec<SearchResult>>,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Single-process cache backed by a shared map
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry and return how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<SearchResult>>, CacheError> {
        let entries = self.entries.read().await;

        match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => {
                Ok(Some(entry.results.as_ref().clone()))
            }
            Some(_) => {
                debug!("Cache entry {} expired", key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<SearchResult>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Backend(format!("TTL of {:?} overflows the clock", ttl)))?;

        let entry = CacheEntry {
            results: Arc::new(value),
            expires_at,
        };

        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(id: &str) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            content: "content".to_string(),
            title: None,
            source: None,
            confidence: 0.9,
            metadata: json!({}),
            citations: Vec::new(),
        }
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let options = RetrievalOptions::default();
        assert_eq!(
            cache_key("office rent", &options).unwrap(),
            cache_key("office rent", &options).unwrap()
        );
    }

    #[test]
    fn test_cache_key_depends_on_query_and_options() {
        let base = RetrievalOptions::default();
        let other = RetrievalOptions::default().with_top_k(5);

        let key = cache_key("office rent", &base).unwrap();
        assert_ne!(key, cache_key("office rent deduction", &base).unwrap());
        assert_ne!(key, cache_key("office rent", &other).unwrap());
    }

    #[tokio::test]
    async fn test_get_set() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").await.unwrap().is_none());

        cache
            .set("k", vec![result("1")], Duration::from_secs(60))
            .await
            .unwrap();

        let hit = cache.get("k").await.unwrap().unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].id, "1");
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses_but_kept() {
        let cache = MemoryCache::new();
        cache
            .set("k", vec![result("1")], Duration::ZERO)
            .await
            .unwrap();

        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.len().await, 1);

        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_rejected() {
        let cache = MemoryCache::new();
        let result = cache
            .set("k", vec![result("1")], Duration::from_secs(u64::MAX))
            .await;

        assert!(matches!(result, Err(CacheError::Backend(_))));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_overwrites_wholesale() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("k", vec![result("1"), result("2")], ttl).await.unwrap();
        cache.set("k", vec![result("3")], ttl).await.unwrap();

        let hit = cache.get("k").await.unwrap().unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].id, "3");
    }
}
