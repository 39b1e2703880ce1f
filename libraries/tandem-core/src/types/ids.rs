/// ID types for Tandem Player entities
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Where a track comes from, encoded as the prefix of its id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Imported audio file (`local-...`)
    LocalFile,
    /// File discovered in a watched folder (`watched-...`)
    WatchedFolder,
    /// Streamed through the embedded remote player (`remote-...`)
    Remote,
}

impl Provenance {
    /// Id prefix for this provenance
    pub fn prefix(self) -> &'static str {
        match self {
            Self::LocalFile => "local-",
            Self::WatchedFolder => "watched-",
            Self::Remote => "remote-",
        }
    }

    /// Playback backend responsible for tracks of this provenance
    pub fn backend(self) -> BackendKind {
        match self {
            Self::LocalFile | Self::WatchedFolder => BackendKind::Local,
            Self::Remote => BackendKind::Remote,
        }
    }
}

/// The two playback backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process audio element
    Local,
    /// Embedded third-party player
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Track identifier, namespaced by provenance prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Create a track ID from its raw string form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a track ID under the given provenance
    pub fn with_provenance(provenance: Provenance, key: &str) -> Self {
        Self(format!("{}{}", provenance.prefix(), key))
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Provenance encoded in the id prefix.
    ///
    /// The prefix is the only input; no other track field is consulted.
    pub fn provenance(&self) -> Result<Provenance> {
        [
            Provenance::LocalFile,
            Provenance::WatchedFolder,
            Provenance::Remote,
        ]
        .into_iter()
        .find(|p| self.0.starts_with(p.prefix()))
        .ok_or_else(|| CoreError::UnknownProvenance(self.0.clone()))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
