/// Track domain type and artist/title normalization
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::types::ids::{BackendKind, TrackId};

/// A playable item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Unique track identifier (provenance-prefixed)
    pub id: TrackId,

    /// Track title
    pub title: String,

    /// Artist credit; may list several collaborators
    pub artist: String,

    /// Album name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,

    /// Album artwork URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_art: Option<String>,

    /// Duration in seconds, when known up front
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Remote or file URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// File path on disk (local tracks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Artist imagery attached by enrichment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artist_images: Vec<String>,
}

impl Track {
    /// Create a new track with minimal metadata
    pub fn new(id: TrackId, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            artist: artist.into(),
            album: None,
            album_art: None,
            duration: None,
            url: None,
            file_path: None,
            artist_images: Vec::new(),
        }
    }

    /// Set the file path (builder style)
    #[must_use]
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Set the URL (builder style)
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the album (builder style)
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Set the duration in seconds (builder style)
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Backend that must play this track, decided by the id prefix alone
    pub fn backend(&self) -> Result<BackendKind> {
        Ok(self.id.provenance()?.backend())
    }

    /// First credited artist
    pub fn primary_artist(&self) -> &str {
        primary_artist(&self.artist)
    }

    /// Stream cache key for this track
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.title, &self.artist)
    }

    /// Source string handed to the local audio element
    pub fn local_source(&self) -> Option<String> {
        self.file_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| self.url.clone())
    }
}

/// Collaborator separators, matched anywhere
const SEPARATORS: [&str; 2] = ["&", ","];

/// Collaborator keywords, matched case-insensitively as whole words
const KEYWORDS: [&str; 2] = ["feat.", "ft."];

/// First artist segment of a credit such as `"A feat. B"` or `"A, B & C"`.
pub fn primary_artist(artist: &str) -> &str {
    // ASCII folding keeps byte offsets aligned with `artist`.
    let haystack = artist.to_ascii_lowercase();

    let cut = SEPARATORS
        .iter()
        .filter_map(|d| haystack.find(d))
        .chain(KEYWORDS.iter().filter_map(|k| find_word(&haystack, k)))
        .min()
        .unwrap_or(artist.len());

    let primary = artist[..cut].trim();
    if primary.is_empty() {
        artist.trim()
    } else {
        primary
    }
}

/// Offset of `word` where it stands between whitespace or the string ends
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    haystack.match_indices(word).map(|(at, _)| at).find(|&at| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + word.len()..].chars().next();
        before.map_or(true, char::is_whitespace) && after.map_or(true, char::is_whitespace)
    })
}

/// Case-folded, alphanumeric-only form of a string
pub fn normalize_key(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Stream cache key: normalized title and primary artist
pub fn fingerprint(title: &str, artist: &str) -> String {
    format!(
        "{}::{}",
        normalize_key(title),
        normalize_key(primary_artist(artist))
    )
}
