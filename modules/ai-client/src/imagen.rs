use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::traits::{AiClientError, ImageGenerator};

const IMAGEN_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const IMAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Image generation via the Imagen `:predict` endpoint. The service returns
/// hosted image URLs; base64 payloads are not requested.
pub struct ImagenClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
}

impl ImagenClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: "imagen-3.0-generate-002".to_string(),
            http: reqwest::Client::new(),
            base_url: IMAGEN_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }
}

#[async_trait]
impl ImageGenerator for ImagenClient {
    async fn generate_image(&self, prompt: &str) -> Result<String, AiClientError> {
        let url = format!(
            "{}/models/{}:predict?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = %self.model, "Image generation request");

        let response = self
            .http
            .post(&url)
            .timeout(IMAGE_TIMEOUT)
            .json(&json!({
                "instances": [{"prompt": prompt}],
                "parameters": {"sampleCount": 1, "aspectRatio": "16:9"},
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiClientError::Timeout(IMAGE_TIMEOUT)
                } else {
                    AiClientError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AiClientError::from_status(status, message));
        }

        let parsed: PredictResponse = response.json().await?;
        parsed
            .predictions
            .into_iter()
            .filter_map(|p| p.image_url)
            .next()
            .ok_or_else(|| AiClientError::Other("image service returned no URL".to_string()))
    }

    fn name(&self) -> &str {
        "imagen"
    }
}
