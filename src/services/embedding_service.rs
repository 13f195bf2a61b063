use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::services::providers::EmbeddingProvider;
use crate::utils::error::ApiError;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI embeddings adapter. Rate-limit and timeout failures retry up to
/// three times with exponential backoff (1 s, 2 s, 4 s); other API errors
/// fail fast.
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    pub dimension: usize,
}

impl EmbeddingService {
    pub fn new(llm: &LlmConfig, config: &EmbeddingConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: llm.base_url.clone(),
            api_key: llm.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/v1/embeddings", self.base_url);

        for attempt in 0..MAX_ATTEMPTS {
            let request = EmbeddingRequest {
                input: texts.to_vec(),
                model: self.model.clone(),
            };

            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            let retryable = match result {
                Ok(response) if response.status().is_success() => {
                    return self.parse_response(response, texts.len()).await;
                }
                Ok(response) if response.status().as_u16() == 429 => {
                    warn!(
                        "Embedding API rate limit hit (attempt {}/{})",
                        attempt + 1,
                        MAX_ATTEMPTS
                    );
                    true
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!("Embedding API error ({}): {}", status, body);
                    return Err(ApiError::EmbeddingFailure(format!(
                        "embedding API returned status {}",
                        status
                    )));
                }
                Err(e) if e.is_timeout() => {
                    warn!(
                        "Embedding API timeout (attempt {}/{})",
                        attempt + 1,
                        MAX_ATTEMPTS
                    );
                    true
                }
                Err(e) => {
                    warn!("Embedding API transport error: {}", e);
                    return Err(ApiError::EmbeddingFailure(
                        "failed to reach embedding API".to_string(),
                    ));
                }
            };

            if retryable && attempt + 1 < MAX_ATTEMPTS {
                let wait = RETRY_BASE_DELAY * 2u32.pow(attempt);
                debug!("Retrying embedding request in {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }

        Err(ApiError::EmbeddingFailure(format!(
            "embedding API failed after {} attempts",
            MAX_ATTEMPTS
        )))
    }

    async fn parse_response(
        &self,
        response: reqwest::Response,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, ApiError> {
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ApiError::EmbeddingFailure(format!("malformed embedding response: {}", e)))?;

        if body.data.len() != expected {
            return Err(ApiError::EmbeddingFailure(format!(
                "embedding count mismatch: expected {}, got {}",
                expected,
                body.data.len()
            )));
        }

        // The API reports positions explicitly; order by them so batch
        // output always lines up with batch input.
        let mut data = body.data;
        data.sort_by_key(|item| item.index);

        for item in &data {
            if item.embedding.len() != self.dimension {
                return Err(ApiError::EmbeddingFailure(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    item.embedding.len()
                )));
            }
        }

        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        if text.trim().is_empty() {
            return Err(ApiError::EmbeddingFailure(
                "cannot generate embedding for empty text".to_string(),
            ));
        }

        debug!("Generating embedding for {} chars", text.len());

        let mut embeddings = self.request_embeddings(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| ApiError::EmbeddingFailure("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(ApiError::EmbeddingFailure(
                "cannot generate embeddings for empty texts".to_string(),
            ));
        }

        debug!("Generating batch embeddings for {} texts", texts.len());
        self.request_embeddings(&texts).await
    }
}
