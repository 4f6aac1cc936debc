//! Client errors.

use pdfink_core::OverlayError;
use thiserror::Error;

/// Errors raised while talking to the backend over HTTP.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid JSON payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid base64 document: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for client operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<ApiError> for OverlayError {
    fn from(e: ApiError) -> Self {
        OverlayError::Backend(e.to_string())
    }
}
