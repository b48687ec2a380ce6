use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Embedder;
use crate::error::{IngestError, Result};
use crate::retry::{with_backoff, AttemptError};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// OpenAI accepts at most this many inputs per request
const MAX_INPUTS_PER_REQUEST: usize = 2048;

/// Request structure for OpenAI embeddings API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response structure from OpenAI embeddings API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in API response
#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI embeddings client
///
/// Sends each upsert batch as one request (split further only above the API
/// input limit) and retries rate-limit and server errors with backoff.
pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_retries: usize,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "text-embedding-ada-002")
    /// * `max_retries` - Retries for 429 and 5xx responses
    pub fn new(api_key: String, model: String, max_retries: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IngestError::Embedding(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint: OPENAI_EMBEDDINGS_URL.to_string(),
            max_retries,
        })
    }

    /// Point the client at an OpenAI-compatible endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Internal method to make a single API request
    async fn request(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, AttemptError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(AttemptError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(AttemptError::from_status(status, &body));
        }

        let mut result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::fatal(format!("Failed to parse response: {}", e)))?;

        result.data.sort_by_key(|d| d.index);
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for group in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            let embeddings = with_backoff(
                "OpenAI embeddings",
                self.max_retries,
                Duration::from_secs(1),
                || self.request(group),
            )
            .await
            .map_err(|e| IngestError::Embedding(e.message))?;

            if embeddings.len() != group.len() {
                return Err(IngestError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    group.len(),
                    embeddings.len()
                )));
            }
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }
}
