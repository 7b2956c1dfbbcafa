/// HNSW vector index for similarity search
use crate::embedding::IndexConfig;
use crate::retrieval::{Candidate, IndexError, SemanticIndex, StrategyKind};
use ahash::AHashMap;
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use std::sync::RwLock;
use thiserror::Error;

const MAX_LAYERS: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Duplicate chunk id: {0}")]
    DuplicateId(String),
}

impl From<VectorIndexError> for IndexError {
    fn from(e: VectorIndexError) -> Self {
        match e {
            VectorIndexError::InvalidDimension { .. } => IndexError::InvalidInput(e.to_string()),
            other => IndexError::Backend(other.to_string()),
        }
    }
}

/// Chunk payload stored alongside its vector
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub id: String,
    pub title: String,
    pub pack: String,
    pub content: String,
    pub metadata: serde_json::Value,
}

impl ChunkEntry {
    fn to_candidate(&self, similarity: f32) -> Candidate {
        Candidate::new(&self.id, &self.content, similarity, StrategyKind::Semantic)
            .with_title(&self.title)
            .with_source(&self.pack)
            .with_metadata(self.metadata.clone())
    }
}

/// HNSW vector index wrapper
///
/// Provides approximate nearest neighbor search using cosine distance.
/// Each HNSW point id is the position of its [`ChunkEntry`].
pub struct VectorIndex {
    index: RwLock<Hnsw<'static, f32, DistCosine>>,
    entries: RwLock<Vec<ChunkEntry>>,
    positions: RwLock<AHashMap<String, usize>>,
    dimension: usize,
    ef_search: usize,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension`
    pub fn new(dimension: usize, config: &IndexConfig) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            config.hnsw_m,
            config.max_elements,
            MAX_LAYERS,
            config.hnsw_ef_construction,
            DistCosine,
        );

        Self {
            index: RwLock::new(index),
            entries: RwLock::new(Vec::new()),
            positions: RwLock::new(AHashMap::new()),
            dimension,
            ef_search: config.ef_search,
        }
    }

    /// Insert a chunk vector; chunk ids must be unique
    pub fn insert(&self, entry: ChunkEntry, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut positions = self.positions.write().map_err(poisoned_insert)?;
        if positions.contains_key(&entry.id) {
            return Err(VectorIndexError::DuplicateId(entry.id));
        }

        let mut entries = self.entries.write().map_err(poisoned_insert)?;
        let position = entries.len();

        self.index
            .write()
            .map_err(poisoned_insert)?
            .insert((vector, position));

        positions.insert(entry.id.clone(), position);
        entries.push(entry);

        Ok(())
    }

    /// Nearest chunks to `query`, most similar first
    ///
    /// With a pack filter the whole index is searched before filtering, so a
    /// small pack is never crowded out by closer chunks from other packs.
    pub fn search(
        &self,
        query: &[f32],
        pack: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Candidate>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let entries = self.entries.read().map_err(poisoned_search)?;
        if entries.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let k = if pack.is_some() { entries.len() } else { limit };
        let neighbours = self
            .index
            .read()
            .map_err(poisoned_search)?
            .search(query, k, self.ef_search.max(k));

        let results = neighbours
            .into_iter()
            .filter_map(|n| entries.get(n.d_id).map(|entry| (entry, n.distance)))
            .filter(|(entry, _)| pack.map_or(true, |p| entry.pack == p))
            .take(limit)
            .map(|(entry, distance)| entry.to_candidate((1.0 - distance).clamp(0.0, 1.0)))
            .collect();

        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn poisoned_insert<T>(_: T) -> VectorIndexError {
    VectorIndexError::InsertError("Index lock poisoned".to_string())
}

fn poisoned_search<T>(_: T) -> VectorIndexError {
    VectorIndexError::SearchError("Index lock poisoned".to_string())
}

#[async_trait]
impl SemanticIndex for VectorIndex {
    async fn query(
        &self,
        vector: &[f32],
        pack: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        Ok(self.search(vector, pack, limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, pack: &str) -> ChunkEntry {
        ChunkEntry {
            id: id.to_string(),
            title: format!("Title {}", id),
            pack: pack.to_string(),
            content: format!("Content {}", id),
            metadata: serde_json::json!({}),
        }
    }

    fn axis(dim: usize, hot: &[(usize, f32)]) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        for (i, x) in hot {
            v[*i] = *x;
        }
        v
    }

    fn populated() -> VectorIndex {
        let index = VectorIndex::new(8, &IndexConfig::default());
        index.insert(entry("a", "tax"), &axis(8, &[(0, 1.0)])).unwrap();
        index.insert(entry("b", "payroll"), &axis(8, &[(1, 1.0)])).unwrap();
        index
            .insert(entry("c", "payroll"), &axis(8, &[(0, 0.9), (1, 0.1)]))
            .unwrap();
        index
    }

    #[test]
    fn test_insert_and_search() {
        let index = populated();
        assert_eq!(index.len(), 3);

        let results = index.search(&axis(8, &[(0, 1.0)]), None, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > 0.9);
        assert_eq!(results[0].strategy, StrategyKind::Semantic);
    }

    #[test]
    fn test_pack_filter() {
        let index = populated();

        let results = index
            .search(&axis(8, &[(0, 1.0)]), Some("payroll"), 5)
            .unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().all(|c| c.source.as_deref() == Some("payroll")));
        assert_eq!(results[0].id, "c");
    }

    #[test]
    fn test_dimension_validation() {
        let index = populated();
        assert!(matches!(
            index.insert(entry("d", "tax"), &[1.0; 3]),
            Err(VectorIndexError::InvalidDimension { .. })
        ));
        assert!(index.search(&[1.0; 3], None, 1).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let index = populated();
        assert!(matches!(
            index.insert(entry("a", "tax"), &axis(8, &[(2, 1.0)])),
            Err(VectorIndexError::DuplicateId(_))
        ));
    }
}
