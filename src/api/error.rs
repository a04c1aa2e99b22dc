//! Error type shared by every backend call.

use thiserror::Error;

/// Errors that can occur while talking to the prediction backend.
///
/// The `Display` text is what ends up on screen in place of a prediction,
/// so transport and decoding failures carry the underlying description
/// verbatim and any unexpected HTTP status collapses to one generic server
/// message.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP transport or connection error.
    #[error("{0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a status the client does not handle.
    #[error("Server error occurred (HTTP {status})")]
    Server { status: u16 },

    /// The response body could not be decoded.
    #[error("{0}")]
    Parse(String),

    /// The server reported that the addressed resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Upload refused locally; the backend rejects bodies over its limit.
    #[error("file too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    /// The configured base URL cannot address endpoints.
    #[error("invalid server URL: {0}")]
    Url(String),

    /// Local file access around an upload or download.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Parse(e.to_string())
        } else {
            ApiError::Request(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Parse(e.to_string())
    }
}
