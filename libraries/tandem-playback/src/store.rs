//! Playback state machine
//!
//! All state changes go through [`Transition`]s applied by a pure reducer.
//! [`PlaybackStore`] is the single writer: it applies transitions, publishes
//! snapshots on a watch channel and persists the repeat mode.

use crate::types::{first_position, PlaybackState};
use std::sync::Arc;
use tandem_core::{KeyValueStore, RepeatMode, Track, TrackId};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Key under which the repeat mode is persisted
pub const REPEAT_MODE_KEY: &str = "repeat-mode";

/// Named state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Select a track (or clear the selection)
    SetTrack(Option<Track>),
    /// Set the playing flag
    SetPlaying(bool),
    /// Set the position in seconds
    SetTime(f64),
    /// Set the duration in seconds
    SetDuration(f64),
    /// Replace the queue
    SetQueue(Vec<Track>),
    /// Record the queue entry the current track was started from
    SetQueuePosition(usize),
    /// Flip the shuffle flag
    ToggleShuffle,
    /// Cycle none → all → one → none
    ToggleRepeat,
    /// Set the repeat mode directly
    SetRepeat(RepeatMode),
    /// Set the loading flag
    SetLoading(bool),
    /// Set the artist-image loading flag
    SetArtistImagesLoading(bool),
    /// Record (or clear) the last fault
    SetFault(Option<String>),
    /// Attach enrichment results, only if `track_id` is still current
    AttachArtistImages {
        track_id: TrackId,
        images: Vec<String>,
    },
    /// Back to the initial state, keeping the repeat mode
    Reset,
}

impl Transition {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetTrack(_) => "set_track",
            Self::SetPlaying(_) => "set_playing",
            Self::SetTime(_) => "set_time",
            Self::SetDuration(_) => "set_duration",
            Self::SetQueue(_) => "set_queue",
            Self::SetQueuePosition(_) => "set_queue_position",
            Self::ToggleShuffle => "toggle_shuffle",
            Self::ToggleRepeat => "toggle_repeat",
            Self::SetRepeat(_) => "set_repeat",
            Self::SetLoading(_) => "set_loading",
            Self::SetArtistImagesLoading(_) => "set_artist_images_loading",
            Self::SetFault(_) => "set_fault",
            Self::AttachArtistImages { .. } => "attach_artist_images",
            Self::Reset => "reset",
        }
    }
}

/// Coerce a time value to a finite, non-negative number
pub fn sanitize_seconds(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Apply a transition to `state`.
///
/// Returns `true` if the state changed.
pub fn reduce(state: &mut PlaybackState, transition: Transition) -> bool {
    let before = state.clone();

    match transition {
        Transition::SetTrack(track) => {
            state.queue_position = track
                .as_ref()
                .and_then(|track| first_position(&state.queue, track));
            state.current_track = track;
        }
        Transition::SetPlaying(playing) => state.is_playing = playing,
        Transition::SetTime(time) => state.current_time = sanitize_seconds(time),
        Transition::SetDuration(duration) => state.duration = sanitize_seconds(duration),
        Transition::SetQueue(queue) => {
            state.queue_position = state
                .current_track
                .as_ref()
                .and_then(|track| first_position(&queue, track));
            state.queue = queue;
        }
        Transition::SetQueuePosition(position) => {
            let holds_current = matches!(
                (state.queue.get(position), &state.current_track),
                (Some(entry), Some(current)) if entry.id == current.id
            );
            if holds_current {
                state.queue_position = Some(position);
            }
        }
        Transition::ToggleShuffle => state.shuffle = !state.shuffle,
        Transition::ToggleRepeat => state.repeat = state.repeat.cycle(),
        Transition::SetRepeat(mode) => state.repeat = mode,
        Transition::SetLoading(loading) => state.loading = loading,
        Transition::SetArtistImagesLoading(loading) => state.artist_images_loading = loading,
        Transition::SetFault(fault) => state.fault = fault,
        Transition::AttachArtistImages { track_id, images } => {
            match state.current_track.as_mut() {
                Some(track) if track.id == track_id => track.artist_images = images,
                _ => {}
            }
        }
        Transition::Reset => {
            *state = PlaybackState {
                repeat: state.repeat,
                ..PlaybackState::default()
            };
        }
    }

    *state != before
}

struct StoreInner {
    state: watch::Sender<PlaybackState>,
    persistence: Arc<dyn KeyValueStore>,
}

/// Single writer for [`PlaybackState`]
#[derive(Clone)]
pub struct PlaybackStore {
    inner: Arc<StoreInner>,
}

impl PlaybackStore {
    /// Create a store, restoring the persisted repeat mode
    pub fn new(persistence: Arc<dyn KeyValueStore>) -> Self {
        let repeat = restore_repeat(persistence.as_ref());
        debug!(%repeat, "Playback store created");

        let (state, _) = watch::channel(PlaybackState {
            repeat,
            ..PlaybackState::default()
        });

        Self {
            inner: Arc::new(StoreInner { state, persistence }),
        }
    }

    /// Apply a transition and notify observers if anything changed
    pub fn dispatch(&self, transition: Transition) {
        let name = transition.name();
        let touches_repeat = matches!(
            transition,
            Transition::ToggleRepeat | Transition::SetRepeat(_)
        );

        let changed = self
            .inner
            .state
            .send_if_modified(|state| reduce(state, transition));
        trace!(transition = name, changed, "Applied transition");

        if changed && touches_repeat {
            self.persist_repeat(self.inner.state.borrow().repeat);
        }
    }

    /// Current state
    pub fn snapshot(&self) -> PlaybackState {
        self.inner.state.borrow().clone()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    /// Current repeat mode
    pub fn repeat(&self) -> RepeatMode {
        self.inner.state.borrow().repeat
    }

    fn persist_repeat(&self, mode: RepeatMode) {
        let result = serde_json::to_string(&mode)
            .map_err(tandem_core::CoreError::from)
            .and_then(|json| self.inner.persistence.set(REPEAT_MODE_KEY, &json));

        if let Err(e) = result {
            warn!(error = %e, "Failed to persist repeat mode");
        }
    }
}

fn restore_repeat(persistence: &dyn KeyValueStore) -> RepeatMode {
    match persistence.get(REPEAT_MODE_KEY) {
        Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!(error = %e, value = %json, "Ignoring unreadable repeat mode");
            RepeatMode::None
        }),
        Ok(None) => RepeatMode::None,
        Err(e) => {
            warn!(error = %e, "Failed to read repeat mode");
            RepeatMode::None
        }
    }
}
