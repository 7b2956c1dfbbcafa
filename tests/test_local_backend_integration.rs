//! Integration Test: local backend
//!
//! Loads a small corpus into the HNSW, tantivy, entity-graph and SQLite
//! backends and retrieves through the full pipeline. A hashed bag-of-words
//! embedder stands in for the neural model so no download is needed.

use async_trait::async_trait;
use knowledge_retriever::backend::LocalBackend;
use knowledge_retriever::config::RetrievalConfig;
use knowledge_retriever::embedding::{CorpusRecord, EmbeddingError, EmbeddingProvider, IndexConfig};
use knowledge_retriever::entities::EntityMention;
use knowledge_retriever::retrieval::RetrievalOptions;
use knowledge_retriever::storage::StorageManager;
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 256;

struct HashedBagOfWords;

#[async_trait]
impl EmbeddingProvider for HashedBagOfWords {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; DIM];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bucket = u16::from_le_bytes([hash.as_bytes()[0], hash.as_bytes()[1]]) as usize % DIM;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(EmbeddingError::InvalidInput("No tokens".to_string()));
        }
        Ok(vector.into_iter().map(|x| x / norm).collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "hashed-bow"
    }
}

fn record(id: &str, pack: &str, content: &str, entities: &[&str]) -> CorpusRecord {
    CorpusRecord {
        id: id.to_string(),
        document_id: format!("doc-{}", pack),
        title: format!("{} handbook", pack),
        pack: pack.to_string(),
        content: content.to_string(),
        url: Some(format!("https://example.com/{}", pack)),
        updated_at: None,
        metadata: serde_json::json!({}),
        entities: entities
            .iter()
            .map(|name| EntityMention {
                name: name.to_string(),
                aliases: Vec::new(),
            })
            .collect(),
    }
}

fn corpus() -> Vec<CorpusRecord> {
    vec![
        record(
            "c1",
            "tax",
            "Self-employed taxpayers can claim a home office deduction for the share of rent that covers a dedicated workspace.",
            &["Home Office", "Rent"],
        ),
        record(
            "c2",
            "tax",
            "Quarterly estimated payments are due in April, June, September and January.",
            &["Estimated Payments"],
        ),
        record(
            "c3",
            "tax",
            "Keep a mileage log for business use of a vehicle.",
            &[],
        ),
        record(
            "c4",
            "payroll",
            "Employers must withhold federal income tax from employee wages each pay period.",
            &["Withholding"],
        ),
    ]
}

async fn loaded(temp: &TempDir) -> LocalBackend {
    let storage = StorageManager::new(temp.path().to_path_buf()).unwrap();
    let backend = LocalBackend::new(
        Arc::new(HashedBagOfWords),
        storage.database.clone(),
        &IndexConfig::default(),
    )
    .unwrap();

    let report = backend.load(corpus(), 2).await.unwrap();
    assert_eq!(report.indexed, 4);
    assert_eq!(report.failed, 0);

    backend
}

#[tokio::test]
async fn test_office_rent_deduction_end_to_end() {
    let temp = TempDir::new().unwrap();
    let backend = loaded(&temp).await;

    let retriever = backend
        .retriever_builder()
        .config(RetrievalConfig {
            confidence_scale: 30.0,
            ..RetrievalConfig::default()
        })
        .build()
        .unwrap();

    let options = RetrievalOptions::default()
        .with_packs(vec!["tax".to_string()])
        .with_top_k(5)
        .with_min_confidence(0.7);

    let results = retriever
        .retrieve("office rent deduction", &options)
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.len() <= 5);
    assert_eq!(results[0].id, "c1");
    assert!(results.iter().all(|r| r.confidence >= 0.7));

    let citation = &results[0].citations[0];
    assert_eq!(citation.title, "tax handbook");
    assert_eq!(citation.source, "tax");
    assert_eq!(citation.url.as_deref(), Some("https://example.com/tax"));

    let logged = backend.database().recent_retrievals(10).unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].record.query_text, "office rent deduction");
    assert_eq!(logged[0].record.results[0].id, "c1");
}

#[tokio::test]
async fn test_entities_are_registered() {
    let temp = TempDir::new().unwrap();
    let backend = loaded(&temp).await;

    let rent = backend.entity_graph().get("rent").unwrap();
    assert!(rent.chunks.contains("c1"));

    let stats = backend.database().stats().unwrap();
    assert_eq!(stats.chunk_count, 4);
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.entity_count, 4);
}

#[tokio::test]
async fn test_semantic_pack_filter_applies() {
    let temp = TempDir::new().unwrap();
    let backend = loaded(&temp).await;
    let retriever = backend.retriever_builder().build().unwrap();

    let options = RetrievalOptions::default()
        .with_packs(vec!["payroll".to_string()])
        .with_min_confidence(0.0)
        .with_rerank(false);

    let results = retriever
        .retrieve("withhold income tax from wages", &options)
        .await
        .unwrap();

    assert_eq!(results[0].id, "c4");
    assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.confidence)));
}
