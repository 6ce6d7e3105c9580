//! Language model error types

use thiserror::Error;

/// Errors surfaced by a `LanguageModel`
#[derive(Error, Debug)]
pub enum ModelError {
    /// Credentials missing or rejected
    #[error("{provider} authentication failed: {message}")]
    Auth { provider: String, message: String },

    /// Rate limited; the caller should back off and retry
    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: String, message: String },

    /// The API did not answer in time
    #[error("{provider} timed out: {message}")]
    Timeout { provider: String, message: String },

    /// The reply could not be understood
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// API request failed
    #[error("{provider} API error: {message}")]
    Api { provider: String, message: String },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ModelError {
    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Sort a raw client error message into a variant
    pub fn classify(provider: impl Into<String>, message: impl Into<String>) -> Self {
        let provider = provider.into();
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
            Self::RateLimited { provider, message }
        } else if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("api key")
            || lower.contains("api-key")
            || lower.contains("authentication")
        {
            Self::Auth { provider, message }
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout { provider, message }
        } else {
            Self::Api { provider, message }
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ModelError::RateLimited { .. })
    }
}

pub type ModelResult<T> = Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert!(ModelError::classify("anthropic", "HTTP 429 Too Many Requests").is_rate_limited());
        assert!(matches!(
            ModelError::classify("anthropic", "status 401: invalid x-api-key"),
            ModelError::Auth { .. }
        ));
        assert!(matches!(
            ModelError::classify("anthropic", "operation timed out"),
            ModelError::Timeout { .. }
        ));
        assert!(matches!(
            ModelError::classify("anthropic", "status 500: overloaded"),
            ModelError::Api { .. }
        ));
    }

    #[test]
    fn test_display() {
        let err = ModelError::invalid_response("anthropic", "tool call without id");
        assert_eq!(err.to_string(), "Invalid response from anthropic: tool call without id");
    }
}
