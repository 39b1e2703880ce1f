/// Core error types for Tandem Player
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for Tandem Player
#[derive(Error, Debug)]
pub enum CoreError {
    /// Key/value store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Track id carries no known provenance prefix
    #[error("Unknown track provenance: {0}")]
    UnknownProvenance(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Failure to obtain a stream handle for a remote track.
///
/// `Clone` so that every caller coalesced onto one in-flight resolution
/// receives the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The resolution service has no playable media for the track
    #[error("No stream found for \"{0}\"")]
    NotFound(String),

    /// The resolution request did not complete in time
    #[error("Stream resolution timed out after {0}s")]
    Timeout(u64),

    /// Network or server failure while resolving
    #[error("Stream resolution failed: {0}")]
    Transport(String),
}

impl ResolveError {
    /// `true` when the service answered but had nothing to play
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
