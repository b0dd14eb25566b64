//! Track search: the `TrackSearch` seam used by commands and autoplay, and the
//! `yt-dlp` backed implementation.

/// Submodule defining the `Track` struct used across the music modules.
pub mod track_metadata;
/// Submodule implementing `TrackSearch` on top of `yt-dlp`.
pub mod youtube;

use serenity::async_trait;
use track_metadata::{Requester, Track};
use url::Url;

use crate::commands::music::utils::music_manager::MusicResult;

/// How a query was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKind {
    /// A direct link to a single track.
    Track,
    /// A link to a playlist; every result belongs to it.
    Playlist { name: String },
    /// Free-text search; results are ranked candidates.
    Search,
    /// Nothing matched.
    Empty,
}

/// Tracks found for a query, all tagged with the requester that asked for them.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub kind: SearchKind,
    pub tracks: Vec<Track>,
}

impl SearchResult {
    pub fn empty() -> Self {
        Self {
            kind: SearchKind::Empty,
            tracks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Resolves a query (free text or URL) into playable tracks.
#[async_trait]
pub trait TrackSearch: Send + Sync {
    async fn search(&self, query: &str, requester: &Requester) -> MusicResult<SearchResult>;
}

/// A utility struct providing general helper functions related to audio sources.
pub struct AudioSource;

impl AudioSource {
    /// Checks whether the input is an http(s) URL rather than a search phrase.
    pub fn is_url(input: &str) -> bool {
        Url::parse(input.trim())
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false)
    }
}
