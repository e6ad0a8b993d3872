use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use blogsmith_common::{extract_domain, GroundingUrl};

use crate::traits::{AiClientError, GenerateRequest, GenerateResponse, Generator};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Generator backed by the Gemini `generateContent` API with the
/// google-search + url-context tool pair and JSON-schema constrained output.
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http: reqwest::Client::new(),
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn build_body(&self, request: &GenerateRequest) -> Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": request.prompt}],
            }],
        });

        if let Some(instruction) = &request.system_instruction {
            body["systemInstruction"] = json!({"parts": [{"text": instruction}]});
        }

        if request.enable_tools {
            body["tools"] = json!([
                {"google_search": {}},
                {"url_context": {}},
            ]);
        }

        if let Some(schema) = &request.response_schema {
            body["generationConfig"] = json!({
                "response_mime_type": "application/json",
                "response_schema": schema,
            });
        }

        body
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, AiClientError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let timeout = request.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let body = self.build_body(&request);

        debug!(model = %self.model, tools = request.enable_tools, "Generator request");

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiClientError::Timeout(timeout)
                } else {
                    AiClientError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AiClientError::from_status(status, message));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AiClientError::Other("no candidates in response".to_string()))?;

        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();

        let grounding_urls: Vec<GroundingUrl> = candidate
            .grounding_metadata
            .map(|meta| {
                meta.grounding_chunks
                    .into_iter()
                    .filter_map(|chunk| chunk.web)
                    .map(|web| GroundingUrl {
                        domain: extract_domain(&web.uri),
                        url: web.uri,
                        title: web.title.unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(chars = text.len(), grounded = grounding_urls.len(), "Generator response");

        Ok(GenerateResponse { text, grounding_urls })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks", default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: String,
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_tools_and_schema_when_requested() {
        let client = GeminiGenerator::new("key", "gemini-2.5-pro");
        let request = GenerateRequest::new("write about rust")
            .system_instruction("be terse")
            .response_schema(json!({"type": "object"}))
            .enable_tools(true);

        let body = client.build_body(&request);
        assert!(body["tools"].as_array().is_some_and(|t| t.len() == 2));
        assert_eq!(
            body["generationConfig"]["response_mime_type"],
            "application/json"
        );
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
    }

    #[test]
    fn body_omits_tools_by_default() {
        let client = GeminiGenerator::new("key", "gemini-2.5-flash");
        let body = client.build_body(&GenerateRequest::new("hi"));
        assert!(body.get("tools").is_none());
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn error_mapping_tags_rate_limit_and_auth() {
        assert!(matches!(
            AiClientError::from_status(429, "slow down".into()),
            AiClientError::RateLimited(_)
        ));
        assert!(matches!(
            AiClientError::from_status(401, "bad key".into()),
            AiClientError::Authentication { status: 401, .. }
        ));
        assert!(matches!(
            AiClientError::from_status(503, "down".into()),
            AiClientError::Service { status: 503, .. }
        ));
    }
}
