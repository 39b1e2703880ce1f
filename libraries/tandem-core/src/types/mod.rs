/// Domain types for Tandem Player
mod ids;
mod playback;
mod track;

pub use ids::{BackendKind, Provenance, TrackId};
pub use playback::{RepeatMode, StreamHandle};
pub use track::{fingerprint, normalize_key, primary_artist, Track};
