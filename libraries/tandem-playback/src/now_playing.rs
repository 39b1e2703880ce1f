//! OS media-session integration
//!
//! Publishes what is playing to a host [`MediaControls`] sink and defines the
//! commands media keys send back.

use crate::engine::PlaybackEngine;
use crate::types::PlaybackState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

/// Playback status shown by the media session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NowPlayingStatus {
    Playing,
    Paused,
    Loading,
}

/// Now-playing metadata for the media session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Album art, or the first artist image when there is none
    pub artwork: Option<String>,
    pub status: NowPlayingStatus,
    /// Position in seconds
    pub position: f64,
    /// Duration in seconds (0 while unknown)
    pub duration: f64,
}

impl NowPlaying {
    /// Build from a state snapshot; `None` when no track is selected
    pub fn from_state(state: &PlaybackState) -> Option<Self> {
        let track = state.current_track.as_ref()?;

        let status = if state.loading {
            NowPlayingStatus::Loading
        } else if state.is_playing {
            NowPlayingStatus::Playing
        } else {
            NowPlayingStatus::Paused
        };

        Some(Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            artwork: track
                .album_art
                .clone()
                .or_else(|| track.artist_images.first().cloned()),
            status,
            position: state.current_time,
            duration: state.duration,
        })
    }
}

/// Commands from media keys or the OS media session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaCommand {
    Play,
    Pause,
    Toggle,
    Next,
    Previous,
}

/// Host media-session sink
pub trait MediaControls: Send + Sync {
    /// Show `now_playing`
    fn publish(&self, now_playing: &NowPlaying);

    /// Nothing is selected any more
    fn clear(&self);
}

/// Publish now-playing metadata on every state change and at least every
/// `every` while a track is selected.
///
/// The task ends when the engine is dropped.
pub fn spawn_now_playing(
    engine: &PlaybackEngine,
    controls: Arc<dyn MediaControls>,
    every: Duration,
) -> JoinHandle<()> {
    let mut state = engine.subscribe();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut published = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let current = NowPlaying::from_state(&state.borrow_and_update());
            match current {
                Some(now_playing) => {
                    trace!(title = %now_playing.title, "Publishing now playing");
                    controls.publish(&now_playing);
                    published = true;
                }
                None if published => {
                    controls.clear();
                    published = false;
                }
                None => {}
            }
        }
    })
}
