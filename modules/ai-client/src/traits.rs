use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use blogsmith_common::GroundingUrl;

/// Errors from external AI services, tagged at the throw site so callers can
/// classify without sniffing message text.
#[derive(Error, Debug)]
pub enum AiClientError {
    #[error("rate limit exceeded (429): {0}")]
    RateLimited(String),

    #[error("authentication rejected ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("request timeout after {0:?}")]
    Timeout(Duration),

    #[error("service error ({status}): {message}")]
    Service { status: u16, message: String },

    #[error("empty or truncated response ({len} chars)")]
    ShortResponse { len: usize },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl AiClientError {
    /// Map an HTTP status + body into the matching tagged variant.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => AiClientError::RateLimited(message),
            401 | 403 => AiClientError::Authentication { status, message },
            _ => AiClientError::Service { status, message },
        }
    }
}

// =============================================================================
// Generator
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    /// JSON schema constraining the structured output.
    pub response_schema: Option<Value>,
    /// Enable the web-search + URL-context tool pair.
    pub enable_tools: bool,
    pub timeout: Option<Duration>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn enable_tools(mut self, enable: bool) -> Self {
        self.enable_tools = enable;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    /// Raw model output; a JSON string when a response schema was supplied.
    pub text: String,
    /// Source URLs the model consulted while answering.
    pub grounding_urls: Vec<GroundingUrl>,
}

/// The LLM collaborator. Implementations must support structured output and
/// the web-search tool pair; rate-limit and auth failures surface as the
/// tagged [`AiClientError`] variants.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, AiClientError>;
    fn name(&self) -> &str;
}

// =============================================================================
// Image generation
// =============================================================================

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image for the prompt and return its hosted URL.
    async fn generate_image(&self, prompt: &str) -> Result<String, AiClientError>;
    fn name(&self) -> &str;
}

// =============================================================================
// Embedding service
// =============================================================================

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiClientError>;
}
