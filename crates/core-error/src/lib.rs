use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported content types: {0}")]
    UnsupportedContent(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn unsupported_content(msg: impl Into<String>) -> Self {
        Self::UnsupportedContent(msg.into())
    }

    pub fn invalid_date(msg: impl Into<String>) -> Self {
        Self::InvalidDate(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Network(_))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
    pub retryable: bool,
}

impl From<&AgentError> for ErrorResponse {
    fn from(err: &AgentError) -> Self {
        let (code, suggestion) = match err {
            AgentError::Auth(_) => (
                "AUTH_ERROR",
                Some("Run `penny auth` to sign in with Google again"),
            ),
            AgentError::Api(_) => ("API_ERROR", None),
            AgentError::Network(_) => (
                "NETWORK_ERROR",
                Some("Check internet connection and try again"),
            ),
            AgentError::NotFound(_) => (
                "NOT_FOUND",
                Some("Check the id or name and retry with a corrected value"),
            ),
            AgentError::InvalidInput(_) => ("INVALID_INPUT", None),
            AgentError::Decode(_) => ("DECODE_ERROR", None),
            AgentError::UnsupportedContent(_) => ("UNSUPPORTED_CONTENT", None),
            AgentError::InvalidDate(_) => (
                "INVALID_DATE",
                Some("Use YYYY-MM-DD for all-day events or RFC 3339 with an offset, e.g. 2025-03-01T09:00:00+01:00"),
            ),
            AgentError::Storage(_) => ("STORAGE_ERROR", None),
            AgentError::NotConfigured(_) => (
                "NOT_CONFIGURED",
                Some("Set the required env vars and restart"),
            ),
            AgentError::Internal(_) => ("INTERNAL_ERROR", Some("Unexpected error")),
        };
        Self {
            code,
            message: err.to_string(),
            suggestion,
            retryable: err.is_retryable(),
        }
    }
}

impl ErrorResponse {
    pub fn to_compact(&self) -> String {
        let mut parts = vec![format!("[{}] {}", self.code, self.message)];
        if let Some(s) = self.suggestion {
            parts.push(format!("Suggestion: {s}"));
        }
        if self.retryable {
            parts.push("(retryable)".to_string());
        }
        parts.join(" | ")
    }
}
