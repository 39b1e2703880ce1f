//! Engine events
//!
//! Broadcast to any number of observers (history recording, notifications).
//! Host signals flow the other way, into the engine.

use serde::{Deserialize, Serialize};
use tandem_core::{Track, TrackId};

/// Events emitted by the playback engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A track actually started playing; emitted once per successful start
    TrackPlayed { track: Track },

    /// Starting or playing a track failed
    PlaybackFault { track_id: TrackId, message: String },

    /// End of the queue reached with nothing left to play
    QueueFinished { track_id: TrackId },

    /// Playback was force-stopped and the state reset
    Stopped,
}

/// Signals sent by the host into the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostSignal {
    /// Stop everything immediately (e.g. the user signed out)
    ForceStop,
}
