//! Tandem Player - Playback Orchestration
//!
//! Plays one unified queue across two very different backends: an in-process
//! audio element for local files and an embedded third-party player for
//! remote streams.
//!
//! This crate provides:
//! - Backend selection by track provenance, with at most one backend audible
//! - A reducer-style playback state machine observable through a watch channel
//! - A coalescing, persisted stream handle cache
//! - Artist image enrichment with a fallback source
//! - Auto-advance honoring repeat and shuffle
//! - Host signals (force stop) and OS media-session publishing
//!
//! # Architecture
//!
//! `tandem-playback` never touches a platform directly. The host supplies:
//! - an [`AudioElement`] and an [`EmbeddedPlayer`] (playback primitives)
//! - a [`StreamSource`](tandem_core::StreamSource) and an
//!   [`ArtistImageSource`](tandem_core::ArtistImageSource) (network)
//! - a [`KeyValueStore`](tandem_core::KeyValueStore) and a
//!   [`Clock`](tandem_core::Clock)
//!
//! Every track switch advances a generation counter. Signals, resolutions and
//! enrichment results produced under an older generation are dropped, so a
//! slow response can never affect a newer track.
//!
//! # Example
//!
//! ```rust,no_run
//! use tandem_playback::{EngineDeps, PlaybackEngine};
//! use tandem_core::{EngineConfig, Track, TrackId};
//!
//! # async fn demo(deps: EngineDeps) -> tandem_playback::Result<()> {
//! let engine = PlaybackEngine::new(EngineConfig::default(), deps);
//!
//! let local = Track::new(TrackId::new("local-1"), "Roygbiv", "Boards of Canada")
//!     .with_file_path("/music/roygbiv.flac");
//! let remote = Track::new(TrackId::new("remote-2"), "Windowlicker", "Aphex Twin");
//!
//! engine.set_queue(vec![local.clone(), remote]);
//! engine.play(local).await?;
//! engine.set_volume(0.8);
//! engine.toggle_play().await?;
//! # Ok(())
//! # }
//! ```

mod advance;
mod artist_images;
mod backend;
mod coalesce;
mod engine;
mod error;
mod events;
mod generation;
mod local;
mod now_playing;
mod persisted;
mod remote;
mod store;
mod stream_cache;
pub mod types;

// Public exports
pub use advance::{after_end, skip_backward, skip_forward, Advance};
pub use artist_images::{ArtistImageCache, ImageCacheEntry, ARTIST_IMAGES_CACHE_KEY};
pub use backend::{
    is_unplayable_code, AudioElement, BackendSignal, ElementEvent, EmbeddedPlayer, MediaError,
    PlayerEvent, PlayerState, ReadyState, SignalKind, StartOutcome,
};
pub use engine::{EngineDeps, PlaybackEngine};
pub use error::{PlaybackError, Result};
pub use events::{EngineEvent, HostSignal};
pub use generation::Generation;
pub use local::LocalAdapter;
pub use now_playing::{spawn_now_playing, MediaCommand, MediaControls, NowPlaying, NowPlayingStatus};
pub use remote::{RemoteAdapter, RemoteState};
pub use store::{reduce, sanitize_seconds, PlaybackStore, Transition, REPEAT_MODE_KEY};
pub use stream_cache::{StreamCache, StreamCacheEntry, TrackSummary, STREAM_CACHE_KEY};
pub use types::{AdapterStatus, PlaybackState};
