//! Collaborator trait implementations for the playback engine.

use crate::client::TandemServerClient;
use async_trait::async_trait;
use tandem_core::{ArtistImageSource, ResolveError, StreamHandle, StreamRequest, StreamSource};

#[async_trait]
impl StreamSource for TandemServerClient {
    async fn resolve_stream(&self, request: &StreamRequest) -> Result<StreamHandle, ResolveError> {
        self.resolve(request).await.map_err(ResolveError::from)
    }
}

#[async_trait]
impl ArtistImageSource for TandemServerClient {
    async fn artist_images(&self, artist: &str) -> Result<Vec<String>, ResolveError> {
        self.fetch_artist_images(artist)
            .await
            .map_err(ResolveError::from)
    }

    async fn fallback_artist_images(&self, artist: &str) -> Result<Vec<String>, ResolveError> {
        self.fetch_artist_info(artist).await.map_err(ResolveError::from)
    }
}
