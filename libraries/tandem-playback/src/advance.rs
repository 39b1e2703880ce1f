//! Auto-advance decisions
//!
//! Pure functions deciding what plays after end-of-media or a manual skip.
//! The randomness source is a parameter so shuffle can be tested with a
//! seeded generator.

use crate::types::PlaybackState;
use rand::Rng;
use tandem_core::{RepeatMode, Track};

/// What to do next
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Start the current track again from the beginning
    Replay(Track),
    /// Start the queue entry at the given position
    Play(usize, Track),
    /// Nothing left to play
    Stop,
}

/// Decide what follows the end of the current track.
///
/// Precedence: repeat-one, then shuffle, then repeat-all, then sequential.
pub fn after_end<R: Rng + ?Sized>(state: &PlaybackState, rng: &mut R) -> Advance {
    if state.repeat == RepeatMode::One {
        if let Some(track) = &state.current_track {
            return Advance::Replay(track.clone());
        }
    }

    step_forward(state, state.repeat == RepeatMode::All, rng)
}

/// Decide what a manual "next" plays.
///
/// Same as [`after_end`] except that repeat-one never replays: the skip moves
/// on and wraps like repeat-all.
pub fn skip_forward<R: Rng + ?Sized>(state: &PlaybackState, rng: &mut R) -> Advance {
    let wrap = matches!(state.repeat, RepeatMode::All | RepeatMode::One);
    step_forward(state, wrap, rng)
}

/// Decide what a manual "previous" plays when not restarting the track.
///
/// Wraps to the last entry only under repeat-all.
pub fn skip_backward(state: &PlaybackState) -> Advance {
    let Some(index) = state.current_index() else {
        return state
            .queue
            .first()
            .map_or(Advance::Stop, |t| Advance::Play(0, t.clone()));
    };

    if index > 0 {
        return Advance::Play(index - 1, state.queue[index - 1].clone());
    }

    match (state.repeat, state.queue.last()) {
        (RepeatMode::All, Some(last)) if state.queue.len() > 1 => {
            Advance::Play(state.queue.len() - 1, last.clone())
        }
        _ => state
            .current_track
            .clone()
            .map_or(Advance::Stop, Advance::Replay),
    }
}

fn step_forward<R: Rng + ?Sized>(state: &PlaybackState, wrap: bool, rng: &mut R) -> Advance {
    let queue = &state.queue;
    if queue.is_empty() {
        return Advance::Stop;
    }

    let Some(index) = state.current_index() else {
        // Current track is not queued: start over from the queue
        let start = if state.shuffle {
            rng.gen_range(0..queue.len())
        } else {
            0
        };
        return Advance::Play(start, queue[start].clone());
    };

    let is_last = index + 1 == queue.len();

    if state.shuffle {
        if !is_last {
            return Advance::Play(index + 1, queue[index + 1].clone());
        }
        if queue.len() == 1 {
            return Advance::Replay(queue[0].clone());
        }
        let pick = random_other_position(queue.len(), index, rng);
        return Advance::Play(pick, queue[pick].clone());
    }

    if !is_last {
        Advance::Play(index + 1, queue[index + 1].clone())
    } else if wrap {
        let first = &queue[0];
        if queue.len() == 1 {
            Advance::Replay(first.clone())
        } else {
            Advance::Play(0, first.clone())
        }
    } else {
        Advance::Stop
    }
}

/// Uniform pick over `0..len` excluding `exclude`.
///
/// Only the position is excluded; a duplicate of the current track elsewhere
/// in the queue is still a candidate.
fn random_other_position<R: Rng + ?Sized>(len: usize, exclude: usize, rng: &mut R) -> usize {
    let pick = rng.gen_range(0..len - 1);
    if pick >= exclude {
        pick + 1
    } else {
        pick
    }
}
