//! Error types for the Tandem server client.

use tandem_core::ResolveError;
use thiserror::Error;

/// Errors that can occur when talking to the resolution and metadata API.
#[derive(Error, Debug)]
pub enum ServerClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error response
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// The server rejected the access token (or none was configured)
    #[error("Authentication required")]
    AuthRequired,

    /// Invalid server URL
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse server response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Server is offline or unreachable
    #[error("Server unreachable: {0}")]
    ServerUnreachable(String),

    /// The request did not complete within the configured timeout
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// The server has nothing for the requested item
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type for server client operations.
pub type Result<T> = std::result::Result<T, ServerClientError>;

impl From<ServerClientError> for ResolveError {
    fn from(err: ServerClientError) -> Self {
        match err {
            ServerClientError::NotFound(what) => Self::NotFound(what),
            ServerClientError::Timeout(secs) => Self::Timeout(secs),
            other => Self::Transport(other.to_string()),
        }
    }
}
