use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TriageError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn missing_field(msg: impl Into<String>) -> Self {
        Self::MissingField(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for failures of a remote mail-provider call (auth, quota, network, not-found).
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::Provider(_) | Self::Network(_) | Self::NotFound(_)
        )
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

impl From<&TriageError> for ErrorResponse {
    fn from(err: &TriageError) -> Self {
        let (code, suggestion, retryable) = match err {
            TriageError::Auth(_) => (
                "AUTH_ERROR",
                Some("Run `triage auth gmail` to refresh the stored OAuth token"),
                false,
            ),
            TriageError::Provider(_) => ("PROVIDER_ERROR", None, true),
            TriageError::Network(_) => (
                "NETWORK_ERROR",
                Some("Check internet connection and try again"),
                true,
            ),
            TriageError::NotFound(_) => (
                "NOT_FOUND",
                Some("Use fetch_unread to list valid thread IDs"),
                false,
            ),
            TriageError::MissingField(_) => ("MISSING_FIELD", None, false),
            TriageError::InvalidInput(_) => ("INVALID_INPUT", None, false),
            TriageError::Configuration(_) => (
                "CONFIGURATION_ERROR",
                Some("Fix the configuration and restart the process"),
                false,
            ),
            TriageError::Internal(_) => ("INTERNAL_ERROR", Some("Unexpected error"), true),
        };
        Self {
            code,
            message: err.to_string(),
            suggestion,
            retryable,
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
