/// Collaborator traits for Tandem Player
///
/// The playback engine reaches the network only through these traits, so the
/// HTTP client (or a test double) is supplied by whoever builds the engine.
use crate::error::ResolveError;
use crate::types::{StreamHandle, Track};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body of a stream resolution request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    /// Track title
    pub title: String,

    /// Full artist credit
    pub artist: String,

    /// Duration hint in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Album art hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_art: Option<String>,
}

impl From<&Track> for StreamRequest {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            duration: track.duration.filter(|d| d.is_finite() && *d > 0.0),
            album_art: track.album_art.clone(),
        }
    }
}

/// Resolves a title/artist pair to a stream handle for the remote player
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Resolve a stream handle
    ///
    /// # Errors
    /// `ResolveError::NotFound` when the service has no media for the track,
    /// `ResolveError::Timeout`/`Transport` for network failures
    async fn resolve_stream(&self, request: &StreamRequest) -> Result<StreamHandle, ResolveError>;
}

/// Supplies artist imagery for the enrichment pipeline
#[async_trait]
pub trait ArtistImageSource: Send + Sync {
    /// Primary image lookup for an artist
    async fn artist_images(&self, artist: &str) -> Result<Vec<String>, ResolveError>;

    /// Secondary lookup consulted when the primary one yields nothing
    async fn fallback_artist_images(&self, artist: &str) -> Result<Vec<String>, ResolveError> {
        let _ = artist;
        Ok(Vec::new())
    }
}
