//! Relevance reranking of the fused list
//!
//! Two backends share the [`Reranker`] contract: an LLM oracle reached over
//! an OpenAI-compatible chat endpoint, and a local FastEmbed cross-encoder.
//! Either may fail; the pipeline falls back to the fused order when it does.

use crate::config::RerankerConfig;
use crate::retrieval::FusedResult;
use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid ranking response: {0}")]
    InvalidResponse(String),

    #[error("Missing credentials: environment variable {0} is not set")]
    MissingCredentials(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Relevance-ordering oracle
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Order `candidates` by relevance to `query`.
    ///
    /// Returns 0-based indices into `candidates`, most relevant first.
    /// Candidates absent from the returned list are dropped by the caller.
    async fn rerank(&self, query: &str, candidates: &[FusedResult])
        -> Result<Vec<usize>, RerankError>;

    fn name(&self) -> &str;
}

/// Reorder `fused` by `indices`, ignoring out-of-range and repeated indices
pub fn apply_ranking(fused: Vec<FusedResult>, indices: &[usize]) -> Vec<FusedResult> {
    let mut slots: Vec<Option<FusedResult>> = fused.into_iter().map(Some).collect();

    indices
        .iter()
        .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
        .collect()
}

/// Render the numbered ranking prompt (1-based passage numbers)
pub fn build_ranking_prompt(query: &str, candidates: &[FusedResult], max_chars: usize) -> String {
    let passages: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let snippet: String = c.content().chars().take(max_chars).collect();
            format!("{}. {}", i + 1, snippet.replace('\n', " "))
        })
        .collect();

    format!(
        "Query: \"{}\"\n\n\
         Rank these passages by relevance to the query, most relevant first:\n\
         {}\n\n\
         Respond with JSON only, in the form {{\"ranking\": [passage numbers, most relevant first]}}.",
        query,
        passages.join("\n")
    )
}

#[derive(Debug, Deserialize)]
struct RankingResponse {
    ranking: Vec<i64>,
}

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("static regex is valid"))
}

/// Parse an oracle answer into 0-based indices
///
/// Strict mode accepts only a `{"ranking": [...]}` object (code fences and
/// surrounding prose are tolerated). Lenient mode falls back to every integer
/// in the text. Numbers are 1-based passage positions; anything outside
/// `1..=count` is dropped, as are repeats.
pub fn parse_ranking(response: &str, count: usize, strict: bool) -> Result<Vec<usize>, RerankError> {
    let numbers: Vec<i64> = match parse_ranking_json(response) {
        Some(ranking) => ranking,
        None if strict => {
            return Err(RerankError::InvalidResponse(format!(
                "expected {{\"ranking\": [...]}}, got: {}",
                response.chars().take(120).collect::<String>()
            )));
        }
        None => integer_pattern()
            .find_iter(response)
            .filter_map(|m| m.as_str().parse().ok())
            .collect(),
    };

    let mut seen = vec![false; count];
    let indices: Vec<usize> = numbers
        .into_iter()
        .filter(|n| *n >= 1 && (*n as u64) <= count as u64)
        .map(|n| (n - 1) as usize)
        .filter(|&i| !std::mem::replace(&mut seen[i], true))
        .collect();

    Ok(indices)
}

fn parse_ranking_json(response: &str) -> Option<Vec<i64>> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<RankingResponse>(&response[start..=end])
        .ok()
        .map(|r| r.ranking)
}

/// LLM-backed reranker over an OpenAI-compatible chat completions API
pub struct LlmReranker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_passage_chars: usize,
    strict_response: bool,
}

impl LlmReranker {
    /// Build from configuration, reading the API key from `api_key_env`
    ///
    /// Fails when the key is absent so misconfiguration surfaces at startup.
    pub fn new(config: &RerankerConfig) -> Result<Self, RerankError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RerankError::MissingCredentials(config.api_key_env.clone()))?;

        Ok(Self::with_api_key(config, api_key))
    }

    /// Build with an explicit API key
    pub fn with_api_key(config: &RerankerConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_passage_chars: config.max_passage_chars,
            strict_response: config.strict_response,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[FusedResult],
    ) -> Result<Vec<usize>, RerankError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_ranking_prompt(query, candidates, self.max_passage_chars);

        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if self.strict_response {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        debug!(
            "Requesting LLM ranking of {} passages with model {}",
            candidates.len(),
            self.model
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RerankError::RerankingError(format!(
                "API error {}: {}",
                status, error_text
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RerankError::InvalidResponse("No content in response".to_string()))?;

        parse_ranking(&content, candidates.len(), self.strict_response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Cross-encoder reranking using FastEmbed
pub struct CrossEncoderReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl CrossEncoderReranker {
    /// Create a new reranker with specified model
    ///
    /// # Arguments
    /// * `model_name` - Model name (currently "bge-reranker-base")
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        let reranker_model = match model_name {
            "bge-reranker-base" | "BAAI/bge-reranker-base" => RerankerModel::BGERerankerBase,
            _ => {
                return Err(RerankError::InitializationError(format!(
                    "Unsupported cross-encoder: {}. Supported: bge-reranker-base",
                    model_name
                )));
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options =
            RerankInitOptions::new(reranker_model).with_show_download_progress(true);

        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }

    /// Create reranker with default model
    pub fn with_default_model() -> Result<Self, RerankError> {
        Self::new("bge-reranker-base")
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[FusedResult],
    ) -> Result<Vec<usize>, RerankError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        if query.is_empty() {
            return Err(RerankError::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }

        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents: Vec<String> = candidates.iter().map(|c| c.content().to_string()).collect();

        let results = tokio::task::spawn_blocking(move || {
            model.rerank(query, documents, false, None)
        })
        .await
        .map_err(|e| RerankError::RerankingError(e.to_string()))?
        .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        let mut scored: Vec<(usize, f32)> =
            results.into_iter().map(|r| (r.index, r.score)).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored.into_iter().map(|(index, _)| index).collect())
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

/// Build the reranker selected by `config`, or `None` when reranking is off
pub fn reranker_from_config(config: &RerankerConfig) -> Result<Option<Arc<dyn Reranker>>, RerankError> {
    if !config.enabled {
        return Ok(None);
    }

    match config.backend.as_str() {
        "llm" => Ok(Some(Arc::new(LlmReranker::new(config)?))),
        "cross_encoder" => Ok(Some(Arc::new(CrossEncoderReranker::new(&config.model)?))),
        other => Err(RerankError::InitializationError(format!(
            "Unknown reranker backend: {}",
            other
        ))),
    }
}
