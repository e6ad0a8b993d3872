use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::traits::{AiClientError, Embedder};

const EMBED_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the content-embedding service: `POST /embed` with
/// `{texts, task_type}` returning `{embeddings: [[f32]]}`.
pub struct HttpEmbedder {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl HttpEmbedder {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiClientError> {
        let url = format!("{}/embed", self.endpoint);
        let response = self
            .http
            .post(&url)
            .timeout(EMBED_TIMEOUT)
            .json(&json!({
                "texts": [text],
                "task_type": "SEMANTIC_SIMILARITY",
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiClientError::Timeout(EMBED_TIMEOUT)
                } else {
                    AiClientError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AiClientError::from_status(status, message));
        }

        let parsed: EmbedResponse = response.json().await?;
        let embedding = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AiClientError::Other("embedding service returned no vectors".to_string()))?;

        debug!(dims = embedding.len(), "Embedding generated");
        Ok(embedding)
    }
}
