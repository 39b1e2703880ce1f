//! Tandem Player Core
//!
//! Platform-agnostic core types, traits, and persistence primitives for Tandem Player.
//!
//! This crate provides the foundational building blocks shared by the playback
//! engine, the HTTP client, and the command-line tool.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `Track`, `TrackId`, `Provenance`, `RepeatMode`, `StreamHandle`
//! - **Collaborator Traits**: `StreamSource`, `ArtistImageSource`
//! - **Persistence**: `KeyValueStore` with in-memory and JSON-file backends
//! - **Time**: `Clock` so cache horizons can be tested deterministically
//! - **Configuration**: `EngineConfig`
//! - **Error Handling**: `CoreError`, `ResolveError`
//!
//! # Example
//!
//! ```rust
//! use tandem_core::{BackendKind, Track, TrackId};
//!
//! let track = Track::new(TrackId::new("remote-abc123"), "Halcyon", "Orbital & Kirsty Hawkshaw");
//!
//! assert_eq!(track.backend().unwrap(), BackendKind::Remote);
//! assert_eq!(track.primary_artist(), "Orbital");
//! assert_eq!(track.fingerprint(), "halcyon::orbital");
//! ```

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod storage;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{CoreError, ResolveError, Result};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use traits::{ArtistImageSource, StreamRequest, StreamSource};

pub use types::{
    fingerprint, normalize_key, primary_artist, BackendKind, Provenance, RepeatMode,
    StreamHandle, Track, TrackId,
};
