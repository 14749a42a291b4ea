/*
[INPUT]:  Error sources (HTTP, websocket, serialization, configuration)
[OUTPUT]: Structured error types with retry classification
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use thiserror::Error;

/// Main error type for the websocket adapter
#[derive(Error, Debug)]
pub enum NobitexWsError {
    /// API credential rejected by the token endpoint. Terminal: retrying
    /// cannot succeed without a new credential.
    #[error("API token unauthorized for the websocket token endpoint (403)")]
    Unauthorized,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NobitexWsError {
    /// Check if the error indicates a rejected credential
    pub fn is_auth_error(&self) -> bool {
        matches!(self, NobitexWsError::Unauthorized)
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NobitexWsError::Http(_)
                | NobitexWsError::WebSocket(_)
                | NobitexWsError::Serialization(_)
                | NobitexWsError::InvalidResponse(_)
        )
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, NobitexWsError>;
