//! Hosted embeddings over an OpenAI-compatible `/embeddings` endpoint

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddingProvider {
    /// Read the API key from the environment variable named in `config`
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| EmbeddingError::MissingCredentials(config.api_key_env.clone()))?;

        Ok(Self::with_api_key(api_key, &config.base_url, &config.model))
    }

    pub fn with_api_key(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!("Requesting {} embeddings from {}", input.len(), self.model);

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": input }))
            .send()
            .await?
            .error_for_status()?;

        let mut body: EmbeddingsResponse = response.json().await?;
        if body.data.len() != input.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                input.len(),
                body.data.len()
            )));
        }

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        self.request(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty data array".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn dimension(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }]
            })))
            .mount(&server)
            .await;

        let provider =
            OpenAiEmbeddingProvider::with_api_key("test-key", server.uri(), "text-embedding-3-small");
        let embedding = provider.embed("office rent").await.unwrap();

        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_batch_restores_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "index": 1, "embedding": [2.0] },
                    { "index": 0, "embedding": [1.0] }
                ]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddingProvider::with_api_key("k", server.uri(), "m");
        let embeddings = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(embeddings, vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddingProvider::with_api_key("k", server.uri(), "m");
        assert!(matches!(
            provider.embed("rent").await,
            Err(EmbeddingError::Http(_))
        ));
    }

    #[test]
    fn test_missing_key_fails_construction() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "KRET_TEST_UNSET_EMBEDDING_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            batch_size: 32,
        };

        assert!(matches!(
            OpenAiEmbeddingProvider::from_config(&config),
            Err(EmbeddingError::MissingCredentials(_))
        ));
    }
}
