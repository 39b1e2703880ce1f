//! Host-provided playback primitives
//!
//! The engine never talks to a platform directly. The host supplies one
//! [`AudioElement`] (local files) and one [`EmbeddedPlayer`] (remote
//! streams); the adapters drive them and report back to the engine through
//! [`BackendSignal`]s.

use async_trait::async_trait;
use tandem_core::{BackendKind, StreamHandle};
use thiserror::Error;
use tokio::sync::broadcast;

/// How much media the audio element has buffered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Failure reported by a playback primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// Interrupted by a pause or a new load
    #[error("Playback aborted")]
    Aborted,

    /// Host policy refuses playback without a user gesture
    #[error("Playback not allowed: {0}")]
    NotAllowed(String),

    /// Media could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Media format or source is not supported
    #[error("Unsupported source: {0}")]
    Unsupported(String),

    /// Network failure while fetching media
    #[error("Network error: {0}")]
    Network(String),
}

/// Events pushed by the audio element
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    /// Position changed (seconds)
    TimeUpdate(f64),
    /// Duration became known (seconds)
    LoadedMetadata(f64),
    /// Enough data is buffered to start
    CanPlay,
    /// Playback reached the end of the media
    Ended,
    /// Playback failed
    Error(MediaError),
}

/// Local audio element
#[async_trait]
pub trait AudioElement: Send + Sync {
    fn pause(&self);

    fn set_position(&self, seconds: f64);

    fn position(&self) -> f64;

    /// Duration in seconds, NaN or 0 while unknown
    fn duration(&self) -> f64;

    fn set_source(&self, source: &str);

    fn load(&self);

    fn ready_state(&self) -> ReadyState;

    /// Start playback; resolves once playback has actually started
    async fn play(&self) -> Result<(), MediaError>;

    fn set_volume(&self, volume: f64);

    /// Subscribe to element events
    fn events(&self) -> broadcast::Receiver<ElementEvent>;
}

/// State codes reported by the embedded player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl PlayerState {
    /// Map a raw platform state code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Unstarted),
            0 => Some(Self::Ended),
            1 => Some(Self::Playing),
            2 => Some(Self::Paused),
            3 => Some(Self::Buffering),
            5 => Some(Self::Cued),
            _ => None,
        }
    }

    /// Raw platform state code
    pub fn code(self) -> i32 {
        match self {
            Self::Unstarted => -1,
            Self::Ended => 0,
            Self::Playing => 1,
            Self::Paused => 2,
            Self::Buffering => 3,
            Self::Cued => 5,
        }
    }
}

/// Events pushed by the embedded player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Platform state change
    StateChange(PlayerState),
    /// Platform error code
    Error(i32),
}

/// Platform error codes meaning the media itself cannot be played
const UNPLAYABLE_CODES: [i32; 4] = [2, 100, 101, 150];

/// Whether an embedded player error code marks the handle as unplayable
pub fn is_unplayable_code(code: i32) -> bool {
    UNPLAYABLE_CODES.contains(&code)
}

/// Embedded third-party player
#[async_trait]
pub trait EmbeddedPlayer: Send + Sync {
    /// Load the platform API; resolves when its ready callback fires
    async fn load_api(&self) -> Result<(), String>;

    /// Load media by handle. `reload` changes on every call so that loading
    /// the same handle twice still restarts it.
    fn load_by_handle(&self, handle: &StreamHandle, reload: u64);

    async fn play(&self) -> Result<(), MediaError>;

    fn pause(&self);

    fn seek_to(&self, seconds: f64);

    fn set_volume(&self, volume: f64);

    fn current_time(&self) -> f64;

    fn duration(&self) -> f64;

    fn state(&self) -> PlayerState;

    /// Subscribe to player events
    fn events(&self) -> broadcast::Receiver<PlayerEvent>;

    /// Release the player instance
    fn destroy(&self);
}

/// Outcome of starting a track on an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Playback started
    Started,
    /// Media is loaded; the backend reports audio with a `Playing` signal
    Pending,
    /// Media is loaded but the user paused before it started
    Held,
    /// A newer switch replaced this one
    Superseded,
}

/// Notification from an adapter to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSignal {
    /// Generation the adapter was started under
    pub generation: u64,
    /// Reporting backend
    pub backend: BackendKind,
    pub kind: SignalKind,
}

/// Signal payload
#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    /// Position in seconds
    Time(f64),
    /// Duration in seconds
    Duration(f64),
    /// The backend started or stopped producing audio on its own
    Playing(bool),
    /// End of media, delivered at most once per load
    Ended,
    /// Playback failed; `unplayable` marks a handle that will never work
    Fault { message: String, unplayable: bool },
}
