//! Error types for playback orchestration

use tandem_core::{CoreError, ResolveError};
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No track is currently selected
    #[error("No track loaded")]
    NoTrackLoaded,

    /// The track id carries no known provenance prefix
    #[error("Cannot choose a backend for track {0}")]
    Classification(String),

    /// A local track has neither a file path nor a URL
    #[error("Track {0} has no playable source")]
    MissingSource(String),

    /// The remote stream handle could not be resolved
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// The backend could not decode or play the media
    #[error("Media error: {0}")]
    Media(String),

    /// The host refused to start playback without a user gesture
    #[error("Playback requires a user gesture")]
    AutoplayRestricted,

    /// The embedded player API could not be initialised
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Core error (storage, configuration)
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PlaybackError {
    /// Whether this error should be shown to the user as a fault.
    ///
    /// An autoplay restriction only means the user has to press play.
    pub fn is_fault(&self) -> bool {
        !matches!(self, Self::AutoplayRestricted)
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
