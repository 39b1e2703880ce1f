//! Types for the Tandem server API requests and responses.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tandem_core::config::ServerSettings;

/// Configuration for connecting to the resolution and metadata API.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL of the server (e.g., "https://music.example.com")
    pub url: String,
    /// Bearer token sent with stream resolution requests
    pub access_token: Option<String>,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl ServerConfig {
    /// Create a new server config with just the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
            timeout: Duration::from_secs(15),
        }
    }

    /// Create a config with an access token.
    pub fn with_token(url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Self::new(url)
        }
    }

    /// Override the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            url: settings.url.clone(),
            access_token: settings.access_token.clone(),
            timeout: settings.resolve_timeout(),
        }
    }
}

// =============================================================================
// Stream Resolution
// =============================================================================

/// Response from `POST /stream-resolve`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamResolveResponse {
    /// Stream handle; missing or empty when nothing matched
    #[serde(default)]
    pub id: Option<String>,
}

// =============================================================================
// Artist Imagery
// =============================================================================

/// One artist image as returned by the server.
///
/// Older endpoints return bare URLs, newer ones objects with dimensions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ArtistImage {
    Detailed {
        url: String,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
    },
    Url(String),
}

impl ArtistImage {
    /// Image URL
    pub fn url(&self) -> &str {
        match self {
            Self::Detailed { url, .. } | Self::Url(url) => url,
        }
    }
}

/// Response from `GET /artist-images/{name}` and `GET /artist-info/{name}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArtistImagesResponse {
    #[serde(default)]
    pub images: Vec<ArtistImage>,
}

impl ArtistImagesResponse {
    /// Non-empty image URLs in server order
    pub fn urls(&self) -> Vec<String> {
        self.images
            .iter()
            .map(ArtistImage::url)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }
}
