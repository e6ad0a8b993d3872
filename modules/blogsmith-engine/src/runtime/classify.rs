//! Stage error taxonomy. Errors are tagged at the throw site; the
//! message-pattern classifier exists only for foreign errors (reqwest, sqlx,
//! service bodies) whose text is all we have.

use thiserror::Error;

use ai_client::AiClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Transient,
    Permanent,
    RateLimit,
    Authentication,
    Validation,
    Timeout,
    ExternalService,
    Internal,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ExternalService => "external_service",
            ErrorCategory::Internal => "internal",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("external service '{service}' failed: {message}")]
    ExternalService { service: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("circuit breaker open for '{0}'")]
    BreakerOpen(String),

    #[error("cancelled")]
    Cancelled,
}

impl StageError {
    pub fn validation(message: impl Into<String>) -> Self {
        StageError::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StageError::Internal(message.into())
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        StageError::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            StageError::Validation(_) => ErrorCategory::Validation,
            StageError::Authentication(_) => ErrorCategory::Authentication,
            StageError::RateLimit(_) => ErrorCategory::RateLimit,
            StageError::Transient(_) => ErrorCategory::Transient,
            StageError::Timeout(_) => ErrorCategory::Timeout,
            StageError::ExternalService { .. } => ErrorCategory::ExternalService,
            StageError::Internal(_) => ErrorCategory::Internal,
            StageError::BreakerOpen(_) => ErrorCategory::ExternalService,
            StageError::Cancelled => ErrorCategory::Unknown,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            StageError::Authentication(_) => Severity::Critical,
            StageError::Validation(_) => Severity::High,
            StageError::Internal(_) => Severity::High,
            StageError::RateLimit(_) => Severity::Medium,
            StageError::Timeout(_) => Severity::Medium,
            StageError::ExternalService { .. } => Severity::Medium,
            StageError::BreakerOpen(_) => Severity::Medium,
            StageError::Transient(_) => Severity::Low,
            StageError::Cancelled => Severity::Low,
        }
    }

    /// Whether a retry could possibly succeed. Authentication and validation
    /// failures never recover; a tripped breaker recovers only on its own
    /// schedule, so retrying inside the attempt loop is pointless.
    pub fn recoverable(&self) -> bool {
        !matches!(
            self,
            StageError::Authentication(_)
                | StageError::Validation(_)
                | StageError::BreakerOpen(_)
                | StageError::Cancelled
        )
    }
}

impl From<AiClientError> for StageError {
    fn from(err: AiClientError) -> Self {
        match err {
            AiClientError::RateLimited(m) => StageError::RateLimit(m),
            AiClientError::Authentication { status, message } => {
                StageError::Authentication(format!("{status}: {message}"))
            }
            AiClientError::Timeout(d) => StageError::Timeout(format!("after {d:?}")),
            AiClientError::Service { status, message } => {
                // 5xx from a provider is worth retrying; the rest is the
                // provider refusing the request.
                if status >= 500 {
                    StageError::Transient(format!("{status}: {message}"))
                } else {
                    StageError::external("generator", format!("{status}: {message}"))
                }
            }
            AiClientError::ShortResponse { len } => {
                StageError::Transient(format!("response too short ({len} chars)"))
            }
            AiClientError::Http(e) => {
                if e.is_timeout() {
                    StageError::Timeout(e.to_string())
                } else {
                    StageError::Transient(e.to_string())
                }
            }
            AiClientError::Other(m) => StageError::external("generator", m),
        }
    }
}

const RATE_LIMIT_PATTERNS: &[&str] =
    &["rate limit", "429", "quota exceeded", "too many requests", "throttle"];
const AUTH_PATTERNS: &[&str] =
    &["401", "403", "unauthorized", "forbidden", "authentication", "api key", "invalid key"];
const VALIDATION_PATTERNS: &[&str] =
    &["validation", "400", "bad request", "invalid input", "malformed", "schema"];
const TRANSIENT_PATTERNS: &[&str] =
    &["connection", "503", "502", "504", "temporarily unavailable", "network", "dns"];

/// Classify foreign error text by message patterns. Order matters: auth and
/// validation outrank rate-limit, which outranks transient; a bare "timeout"
/// that matched nothing stronger lands in Timeout.
pub fn classify_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if matches(AUTH_PATTERNS) {
        ErrorCategory::Authentication
    } else if matches(VALIDATION_PATTERNS) {
        ErrorCategory::Validation
    } else if matches(RATE_LIMIT_PATTERNS) {
        ErrorCategory::RateLimit
    } else if matches(TRANSIENT_PATTERNS) {
        ErrorCategory::Transient
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ErrorCategory::Timeout
    } else {
        ErrorCategory::Unknown
    }
}

/// Wrap foreign error text into a tagged StageError.
pub fn classify_foreign(service: &str, message: impl Into<String>) -> StageError {
    let message = message.into();
    match classify_message(&message) {
        ErrorCategory::Authentication => StageError::Authentication(message),
        ErrorCategory::Validation => StageError::Validation(message),
        ErrorCategory::RateLimit => StageError::RateLimit(message),
        ErrorCategory::Transient => StageError::Transient(message),
        ErrorCategory::Timeout => StageError::Timeout(message),
        _ => StageError::external(service, message),
    }
}
