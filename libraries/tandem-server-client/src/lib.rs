//! Tandem Player Server Client
//!
//! HTTP client for the stream resolution and artist metadata API used by the
//! playback engine.
//!
//! # Features
//!
//! - **Stream resolution**: `POST /stream-resolve` with bearer auth
//! - **Artist imagery**: `GET /artist-images/{name}` with `GET /artist-info/{name}`
//!   as the fallback
//! - **Engine integration**: implements [`StreamSource`](tandem_core::StreamSource)
//!   and [`ArtistImageSource`](tandem_core::ArtistImageSource)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tandem_core::EngineConfig;
//! use tandem_server_client::{ServerConfig, TandemServerClient};
//!
//! let config = EngineConfig::load(None)?;
//! let client = Arc::new(TandemServerClient::new(ServerConfig::from(&config.server))?);
//!
//! // Hand the same client to the engine for both collaborator roles
//! let deps = EngineDeps {
//!     streams: client.clone(),
//!     images: client,
//!     ..
//! };
//! ```

mod client;
mod error;
mod sources;
mod types;

// Re-export main types
pub use client::TandemServerClient;
pub use error::{Result, ServerClientError};
pub use types::{ArtistImage, ArtistImagesResponse, ServerConfig, StreamResolveResponse};
