use std::time::Duration;

use thiserror::Error;

/// Failures talking to the remote wiki API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response shape from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("remote API error: {0}")]
    Remote(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    pub fn decode(endpoint: &str, message: impl Into<String>) -> Self {
        ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }
}

/// Failures building one document's history. Never escapes that document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("action{ordinal} is missing its required `{field}` field")]
    MissingField { ordinal: u32, field: String },
}
