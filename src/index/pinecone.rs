use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::{VectorIndex, VectorRecord};
use crate::error::{IngestError, Result};
use crate::retry::{with_backoff, AttemptError};

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

/// Pinecone data-plane client for a single index host
pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
    max_retries: usize,
}

impl PineconeIndex {
    pub fn new(host: &str, api_key: String, max_retries: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IngestError::Index(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: normalize_host(host),
            api_key,
            max_retries,
        })
    }

    fn upsert_url(&self) -> String {
        format!("{}/vectors/upsert", self.host)
    }

    async fn request(&self, body: &UpsertRequest<'_>) -> std::result::Result<usize, AttemptError> {
        let response = self
            .client
            .post(self.upsert_url())
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(AttemptError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(AttemptError::from_status(status, &text));
        }

        let parsed: UpsertResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::fatal(format!("Failed to parse response: {}", e)))?;
        Ok(parsed.upserted_count)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let body = UpsertRequest {
            vectors: records
                .iter()
                .map(|r| PineconeVector {
                    id: &r.id,
                    values: &r.values,
                    metadata: &r.metadata,
                })
                .collect(),
            namespace,
        };

        let upserted = with_backoff("Pinecone upsert", self.max_retries, Duration::from_secs(1), || {
            self.request(&body)
        })
        .await
        .map_err(|e| IngestError::Index(e.message))?;

        log::debug!("Pinecone upserted {} vectors into {}", upserted, namespace);
        Ok(())
    }
}

/// Accept hosts with or without scheme and trailing slash
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}
