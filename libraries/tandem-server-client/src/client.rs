//! Main Tandem server client.

use crate::error::{Result, ServerClientError};
use crate::types::{ArtistImagesResponse, ServerConfig, StreamResolveResponse};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{StreamHandle, StreamRequest};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Client for the stream resolution and artist metadata API.
///
/// Cheap to clone; clones share the HTTP connection pool and the token.
///
/// # Example
///
/// ```ignore
/// use tandem_server_client::{ServerConfig, TandemServerClient};
/// use tandem_core::StreamRequest;
///
/// let client = TandemServerClient::new(ServerConfig::with_token("https://music.example.com", "token"))?;
///
/// let handle = client.resolve(&request).await?;
/// let images = client.fetch_artist_images("Boards of Canada").await?;
/// ```
#[derive(Clone)]
pub struct TandemServerClient {
    http: Client,
    base: Url,
    timeout: Duration,
    access_token: Arc<RwLock<Option<String>>>,
}

impl TandemServerClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ServerConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(ServerClientError::InvalidUrl("URL cannot be empty".into()));
        }

        let url = config.url.trim_end_matches('/');
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ServerClientError::InvalidUrl(
                "URL must start with http:// or https://".into(),
            ));
        }
        let base = Url::parse(url).map_err(|e| ServerClientError::InvalidUrl(e.to_string()))?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("TandemPlayer/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base,
            timeout: config.timeout,
            access_token: Arc::new(RwLock::new(config.access_token)),
        })
    }

    /// Get the server URL.
    pub fn url(&self) -> String {
        self.base.as_str().trim_end_matches('/').to_string()
    }

    /// Replace the bearer token (`None` to drop it).
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    /// Check if the client has an access token.
    pub async fn is_authenticated(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    /// Resolve a stream handle for a title/artist pair.
    ///
    /// `404` and an empty or missing id both mean nothing matched.
    pub async fn resolve(&self, request: &StreamRequest) -> Result<StreamHandle> {
        let url = self.endpoint(&["stream-resolve"])?;
        debug!(url = %url, title = %request.title, artist = %request.artist, "Resolving stream");

        let mut builder = self.http.post(url).json(request);
        if let Some(token) = self.access_token.read().await.as_deref() {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ServerClientError::NotFound(request.title.clone()));
        }
        let response = check_status(response).await?;

        let body: StreamResolveResponse = response.json().await.map_err(|e| {
            ServerClientError::ParseError(format!("Failed to parse resolve response: {}", e))
        })?;

        match body.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                info!(title = %request.title, handle = %id, "Stream resolved");
                Ok(StreamHandle::new(id))
            }
            None => Err(ServerClientError::NotFound(request.title.clone())),
        }
    }

    /// Artist images from the primary imagery endpoint.
    ///
    /// An unknown artist yields an empty list.
    pub async fn fetch_artist_images(&self, artist: &str) -> Result<Vec<String>> {
        self.images_from("artist-images", artist).await
    }

    /// Artist images from the artist-info endpoint, used as a fallback.
    pub async fn fetch_artist_info(&self, artist: &str) -> Result<Vec<String>> {
        self.images_from("artist-info", artist).await
    }

    async fn images_from(&self, route: &str, artist: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&[route, artist])?;
        debug!(url = %url, "Fetching artist images");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = check_status(response).await?;

        let body: ArtistImagesResponse = response.json().await.map_err(|e| {
            ServerClientError::ParseError(format!("Failed to parse artist images: {}", e))
        })?;

        let urls = body.urls();
        debug!(%artist, route, count = urls.len(), "Fetched artist images");
        Ok(urls)
    }

    /// Base URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ServerClientError::InvalidUrl(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn transport_error(&self, e: reqwest::Error) -> ServerClientError {
        if e.is_timeout() {
            warn!(timeout_secs = self.timeout.as_secs(), "Server request timed out");
            ServerClientError::Timeout(self.timeout.as_secs())
        } else if e.is_connect() {
            ServerClientError::ServerUnreachable(e.to_string())
        } else {
            ServerClientError::Request(e)
        }
    }
}

/// Map non-success statuses to errors
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::UNAUTHORIZED {
        Err(ServerClientError::AuthRequired)
    } else {
        let error_text = response.text().await.unwrap_or_default();
        Err(ServerClientError::ServerError {
            status: status.as_u16(),
            message: error_text,
        })
    }
}
