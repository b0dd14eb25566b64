//! Per-guild ephemeral player state.
//!
//! One `GuildStateStore` exists per process and is handed to everything that needs it
//! (reconciler, commands, button handlers). Nothing here is persisted.

use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::commands::music::audio_sources::track_metadata::Track;
use crate::utils::database::LastQueueTrack;

use super::music_manager::PlayerControl;

/// Maximum number of tracks remembered in a guild's history.
pub const HISTORY_LIMIT: usize = 20;

/// The queue as last seen by a track-start, kept so it can be saved when the player goes away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastQueueCache {
    pub current: Option<Track>,
    pub tracks: Vec<Track>,
}

impl LastQueueCache {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.tracks.is_empty()
    }

    /// Rows for the persisted snapshot: the playing track at position 0, the rest from 1.
    pub fn snapshot_tracks(&self) -> Vec<LastQueueTrack> {
        let mut rows = Vec::with_capacity(self.tracks.len() + 1);
        if let Some(current) = &self.current {
            rows.push(current.queue_entry(0, true));
        }
        rows.extend(
            self.tracks
                .iter()
                .enumerate()
                .map(|(index, track)| track.queue_entry(index as i64 + 1, false)),
        );
        rows
    }
}

struct DisconnectTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct GuildPlayerState {
    current_track: Option<Track>,
    previous_tracks: VecDeque<Track>,
    skip_votes: HashSet<UserId>,
    disconnect_timer: Option<DisconnectTimer>,
    last_queue: Option<LastQueueCache>,
    going_previous: bool,
    active_session: Option<i64>,
}

/// Guild-keyed store of ephemeral player state.
#[derive(Default)]
pub struct GuildStateStore {
    guilds: DashMap<GuildId, GuildPlayerState>,
    timer_generation: AtomicU64,
}

impl GuildStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a track start: clears votes, moves the old current track into history
    /// (unless a backward navigation is in progress), records the new track and caches
    /// the queue that follows it.
    pub fn begin_track(&self, guild_id: GuildId, track: Track, queue: Vec<Track>) {
        let mut state = self.guilds.entry(guild_id).or_default();

        state.skip_votes.clear();

        let going_previous = std::mem::take(&mut state.going_previous);
        if let Some(previous) = state.current_track.take() {
            if !going_previous {
                state.previous_tracks.push_back(previous);
                while state.previous_tracks.len() > HISTORY_LIMIT {
                    state.previous_tracks.pop_front();
                }
            }
        }

        state.last_queue = Some(LastQueueCache {
            current: Some(track.clone()),
            tracks: queue,
        });
        state.current_track = Some(track);
    }

    pub fn current_track(&self, guild_id: GuildId) -> Option<Track> {
        self.guilds
            .get(&guild_id)
            .and_then(|state| state.current_track.clone())
    }

    /// History oldest first; the last element is the most recently finished track.
    pub fn previous_tracks(&self, guild_id: GuildId) -> Vec<Track> {
        self.guilds
            .get(&guild_id)
            .map(|state| state.previous_tracks.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Flags that the next track start replays history and must not be pushed onto it.
    pub fn mark_going_previous(&self, guild_id: GuildId) {
        self.guilds.entry(guild_id).or_default().going_previous = true;
    }

    pub fn is_going_previous(&self, guild_id: GuildId) -> bool {
        self.guilds
            .get(&guild_id)
            .is_some_and(|state| state.going_previous)
    }

    /// Records a skip vote and returns how many distinct users have voted.
    pub fn add_skip_vote(&self, guild_id: GuildId, user_id: UserId) -> usize {
        let mut state = self.guilds.entry(guild_id).or_default();
        state.skip_votes.insert(user_id);
        state.skip_votes.len()
    }

    pub fn skip_votes(&self, guild_id: GuildId) -> usize {
        self.guilds
            .get(&guild_id)
            .map(|state| state.skip_votes.len())
            .unwrap_or_default()
    }

    pub fn clear_skip_votes(&self, guild_id: GuildId) {
        if let Some(mut state) = self.guilds.get_mut(&guild_id) {
            state.skip_votes.clear();
        }
    }

    pub fn last_queue(&self, guild_id: GuildId) -> Option<LastQueueCache> {
        self.guilds
            .get(&guild_id)
            .and_then(|state| state.last_queue.clone())
    }

    /// Removes and returns the cached queue.
    pub fn take_last_queue(&self, guild_id: GuildId) -> Option<LastQueueCache> {
        self.guilds
            .get_mut(&guild_id)
            .and_then(|mut state| state.last_queue.take())
    }

    pub fn active_session(&self, guild_id: GuildId) -> Option<i64> {
        self.guilds
            .get(&guild_id)
            .and_then(|state| state.active_session)
    }

    pub fn set_active_session(&self, guild_id: GuildId, session_id: i64) {
        self.guilds.entry(guild_id).or_default().active_session = Some(session_id);
    }

    /// Forgets the open session, but only if it is still `session_id`.
    pub fn clear_active_session(&self, guild_id: GuildId, session_id: i64) -> bool {
        let Some(mut state) = self.guilds.get_mut(&guild_id) else {
            return false;
        };
        if state.active_session == Some(session_id) {
            state.active_session = None;
            true
        } else {
            false
        }
    }

    /// Arms (or re-arms) the idle disconnect for a guild. When `delay` elapses without
    /// a cancel, the player is disconnected through `player`.
    pub fn schedule_disconnect(
        self: &Arc<Self>,
        guild_id: GuildId,
        delay: Duration,
        player: Arc<dyn PlayerControl>,
    ) {
        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let store = Arc::clone(self);

        // Holding the entry while spawning keeps the timer from claiming itself before it is stored.
        let mut state = self.guilds.entry(guild_id).or_default();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !store.claim_disconnect_timer(guild_id, generation) {
                return;
            }
            info!("Idle timeout reached for guild {}, disconnecting", guild_id);
            if let Err(e) = player.disconnect(guild_id).await {
                warn!("Idle disconnect failed for guild {}: {}", guild_id, e);
            }
        });

        if let Some(previous) = state
            .disconnect_timer
            .replace(DisconnectTimer { generation, handle })
        {
            previous.handle.abort();
        }
        debug!(
            "Scheduled idle disconnect for guild {} in {:?}",
            guild_id, delay
        );
    }

    /// Cancels a pending idle disconnect. Returns whether one was pending.
    pub fn cancel_disconnect(&self, guild_id: GuildId) -> bool {
        let timer = self
            .guilds
            .get_mut(&guild_id)
            .and_then(|mut state| state.disconnect_timer.take());
        match timer {
            Some(timer) => {
                timer.handle.abort();
                debug!("Cancelled idle disconnect for guild {}", guild_id);
                true
            }
            None => false,
        }
    }

    pub fn has_pending_disconnect(&self, guild_id: GuildId) -> bool {
        self.guilds
            .get(&guild_id)
            .is_some_and(|state| state.disconnect_timer.is_some())
    }

    /// A firing timer only proceeds if its own entry is still there to remove.
    fn claim_disconnect_timer(&self, guild_id: GuildId, generation: u64) -> bool {
        let Some(mut state) = self.guilds.get_mut(&guild_id) else {
            return false;
        };
        match &state.disconnect_timer {
            Some(timer) if timer.generation == generation => {
                state.disconnect_timer = None;
                true
            }
            _ => false,
        }
    }

    /// Drops everything known about a guild.
    pub fn purge(&self, guild_id: GuildId) {
        if let Some((_, state)) = self.guilds.remove(&guild_id) {
            if let Some(timer) = state.disconnect_timer {
                timer.handle.abort();
            }
        }
    }
}
