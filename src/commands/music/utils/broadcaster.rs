//! Fan-out of full player snapshots to dashboard subscribers, one channel per guild.

use dashmap::DashMap;
use serde::Serialize;
use serenity::all::GuildId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::commands::music::audio_sources::track_metadata::Track;

use super::music_manager::PlayerControl;

/// Everything a dashboard needs to render a guild's player. Always sent whole;
/// a newer snapshot fully replaces an older one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub guild_id: String,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub playing: bool,
    pub paused: bool,
    pub volume: u8,
}

impl PlayerSnapshot {
    /// The view of a guild without a player.
    pub fn idle(guild_id: GuildId) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            current: None,
            queue: Vec::new(),
            playing: false,
            paused: false,
            volume: 0,
        }
    }
}

/// Pushes the current player state to every subscriber of a guild.
pub struct StateBroadcaster {
    source: Arc<dyn PlayerControl>,
    channels: DashMap<GuildId, broadcast::Sender<PlayerSnapshot>>,
    capacity: usize,
}

impl StateBroadcaster {
    /// Number of snapshots buffered per guild before slow subscribers start lagging.
    pub const DEFAULT_CAPACITY: usize = 32;

    pub fn new(source: Arc<dyn PlayerControl>, capacity: usize) -> Self {
        Self {
            source,
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, guild_id: GuildId) -> broadcast::Receiver<PlayerSnapshot> {
        self.channels
            .entry(guild_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// The guild's current snapshot, idle when it has no player.
    pub async fn snapshot(&self, guild_id: GuildId) -> PlayerSnapshot {
        self.source
            .snapshot(guild_id)
            .await
            .unwrap_or_else(|| PlayerSnapshot::idle(guild_id))
    }

    /// Sends the current snapshot to the guild's subscribers and returns how many got it.
    /// Nothing is computed when nobody listens; nothing is retried. A guild whose
    /// subscribers have all gone away loses its channel.
    pub async fn broadcast(&self, guild_id: GuildId) -> usize {
        let sender = self
            .channels
            .get(&guild_id)
            .map(|entry| entry.value().clone());
        let Some(sender) = sender else {
            return 0;
        };
        if sender.receiver_count() == 0 {
            self.channels
                .remove_if(&guild_id, |_, sender| sender.receiver_count() == 0);
            return 0;
        }

        let snapshot = self.snapshot(guild_id).await;
        let delivered = sender.send(snapshot).unwrap_or_default();
        debug!(
            "Broadcast player state for guild {} to {} subscriber(s)",
            guild_id, delivered
        );
        delivered
    }
}
