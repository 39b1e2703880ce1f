//! Core types for playback orchestration

use serde::{Deserialize, Serialize};
use tandem_core::{RepeatMode, Track};

/// Observable playback state
///
/// Owned by [`PlaybackStore`](crate::PlaybackStore); everything else sees
/// snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Selected track, kept after a stop at the end of the queue
    pub current_track: Option<Track>,

    /// Whether the user wants audio to be playing
    pub is_playing: bool,

    /// Position in seconds (never negative or NaN)
    pub current_time: f64,

    /// Duration in seconds, 0 while unknown
    pub duration: f64,

    /// Ordered queue; the same track may appear more than once
    pub queue: Vec<Track>,

    /// Queue entry the current track was started from
    #[serde(default)]
    pub queue_position: Option<usize>,

    /// Shuffle flag
    pub shuffle: bool,

    /// Repeat mode
    pub repeat: RepeatMode,

    /// Artist imagery is being fetched for the current track
    pub artist_images_loading: bool,

    /// A track is being resolved or buffered
    pub loading: bool,

    /// Last playback fault, kept for display until the next start
    pub fault: Option<String>,
}

impl PlaybackState {
    /// Position of the current track in the queue.
    ///
    /// Uses the recorded queue entry while it still holds the current track,
    /// otherwise the first entry with the same id.
    pub fn current_index(&self) -> Option<usize> {
        let current = self.current_track.as_ref()?;
        match self.queue_position {
            Some(position) if self.queue.get(position).is_some_and(|t| t.id == current.id) => {
                Some(position)
            }
            _ => first_position(&self.queue, current),
        }
    }
}

pub(crate) fn first_position(queue: &[Track], track: &Track) -> Option<usize> {
    queue.iter().position(|t| t.id == track.id)
}

/// Coarse lifecycle of a backend adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterStatus {
    /// Nothing loaded
    Idle,

    /// Media assigned, not yet audible
    Loading,

    /// Producing audio
    Playing,

    /// Loaded but paused
    Paused,

    /// Reached the end of the media
    Ended,
}

impl AdapterStatus {
    /// Whether the adapter can be resumed without reloading
    pub fn is_resumable(self) -> bool {
        matches!(self, Self::Loading | Self::Playing | Self::Paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::TrackId;

    #[test]
    fn default_state_is_empty() {
        let state = PlaybackState::default();
        assert!(state.current_track.is_none());
        assert!(!state.is_playing);
        assert_eq!(state.current_time, 0.0);
        assert_eq!(state.repeat, RepeatMode::None);
        assert!(state.fault.is_none());
    }

    #[test]
    fn current_index_uses_first_matching_id() {
        let a = Track::new(TrackId::new("local-a"), "A", "X");
        let b = Track::new(TrackId::new("remote-b"), "B", "Y");
        let state = PlaybackState {
            current_track: Some(b.clone()),
            queue: vec![a.clone(), b.clone(), a, b],
            ..Default::default()
        };
        assert_eq!(state.current_index(), Some(1));
    }

    #[test]
    fn recorded_position_wins_over_first_match() {
        let a = Track::new(TrackId::new("local-a"), "A", "X");
        let b = Track::new(TrackId::new("local-b"), "B", "X");
        let mut state = PlaybackState {
            current_track: Some(a.clone()),
            queue: vec![a.clone(), b, a],
            queue_position: Some(2),
            ..Default::default()
        };
        assert_eq!(state.current_index(), Some(2));

        // A position that no longer holds the current track is ignored
        state.queue_position = Some(1);
        assert_eq!(state.current_index(), Some(0));
    }
}
