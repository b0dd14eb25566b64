//! Defines the `Track` struct, the unified representation of a playable track shared by
//! search, the playback engine, the reconciler and persistence.

use serde::{Deserialize, Serialize};
use serenity::all::User;
use std::time::Duration;

use crate::utils::database::{LastQueueTrack, TrackPlayEntry};

/// The user on whose behalf a track was queued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
}

impl Requester {
    /// Requester id reserved for tracks picked by autoplay.
    pub const AUTOPLAY_ID: &'static str = "autoplay";

    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            avatar: None,
        }
    }

    /// The synthetic requester attached to autoplay picks.
    pub fn autoplay() -> Self {
        Self::new(Self::AUTOPLAY_ID, "Autoplay")
    }

    pub fn is_autoplay(&self) -> bool {
        self.id == Self::AUTOPLAY_ID
    }
}

impl From<&User> for Requester {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.name.clone(),
            avatar: user.avatar_url(),
        }
    }
}

/// Unified representation of a playable track. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// The title of the track.
    pub title: String,
    /// Uploader or artist.
    pub author: String,
    /// Canonical URL of the track. Identity for autoplay de-duplication and favorites.
    pub uri: String,
    pub duration_ms: u64,
    /// URL to a thumbnail image for the track, if available.
    pub artwork_url: Option<String>,
    /// Lowercase extractor name, e.g. `youtube`. `unknown` when the source did not say.
    pub source_name: String,
    pub requester: Requester,
}

impl Track {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub(crate) fn duration_ms_i64(&self) -> i64 {
        i64::try_from(self.duration_ms).unwrap_or(i64::MAX)
    }

    /// Builds the history row for this track being played in `guild_id`.
    pub fn play_entry(&self, guild_id: impl ToString) -> TrackPlayEntry {
        TrackPlayEntry {
            guild_id: guild_id.to_string(),
            user_id: self.requester.id.clone(),
            username: self.requester.username.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            uri: self.uri.clone(),
            source_name: if self.source_name.is_empty() {
                "unknown".to_string()
            } else {
                self.source_name.clone()
            },
            duration_ms: self.duration_ms_i64(),
        }
    }

    /// Builds the snapshot row for this track at `position` in a saved queue.
    pub fn queue_entry(&self, position: i64, was_playing: bool) -> LastQueueTrack {
        LastQueueTrack {
            title: self.title.clone(),
            author: self.author.clone(),
            uri: self.uri.clone(),
            duration_ms: self.duration_ms_i64(),
            artwork_url: self.artwork_url.clone(),
            source_name: self.source_name.clone(),
            position,
            was_playing,
        }
    }

    /// Rebuilds a playable track from a saved queue entry, queued by `requester`.
    pub fn from_saved(saved: &LastQueueTrack, requester: Requester) -> Self {
        Self {
            title: saved.title.clone(),
            author: saved.author.clone(),
            uri: saved.uri.clone(),
            duration_ms: u64::try_from(saved.duration_ms).unwrap_or_default(),
            artwork_url: saved.artwork_url.clone(),
            source_name: saved.source_name.clone(),
            requester,
        }
    }
}
