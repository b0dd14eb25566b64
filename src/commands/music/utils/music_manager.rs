use serenity::all::{Cache, ChannelId, GuildId, UserId};
use serenity::async_trait;
use songbird::input::YoutubeDl;
use songbird::tracks::TrackHandle;
use songbird::{Call, CoreEvent, Event, EventContext, Songbird, TrackEvent};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::commands::music::audio_sources::track_metadata::Track;

use super::broadcaster::PlayerSnapshot;
use super::event_handlers::PlayerEvent;

/// Errors that can occur during music operations
#[derive(Error, Debug)]
pub enum MusicError {
    #[error("Not in a guild")]
    NotInGuild,

    #[error("Failed to join voice channel: {0}")]
    JoinError(String),

    #[error("Not connected to a voice channel")]
    NotConnected,

    #[error("Failed to get voice manager")]
    NoVoiceManager,

    #[error("User is not in a voice channel")]
    UserNotInVoiceChannel,

    #[error("Audio source error: {0}")]
    AudioSourceError(String),

    #[error("Nothing is playing")]
    NothingPlaying,

    #[error("The queue is full ({0} tracks)")]
    QueueFull(usize),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Result type for music operations
pub type MusicResult<T> = Result<T, MusicError>;

/// The playback operations the reconciler and broadcaster depend on.
#[async_trait]
pub trait PlayerControl: Send + Sync {
    /// Current view of the guild's player, `None` when no player exists.
    async fn snapshot(&self, guild_id: GuildId) -> Option<PlayerSnapshot>;

    /// Appends a track and returns the resulting queue length.
    async fn enqueue(&self, guild_id: GuildId, track: Track) -> MusicResult<usize>;

    /// Starts the next queued track if nothing is playing.
    async fn play(&self, guild_id: GuildId) -> MusicResult<()>;

    /// Tears the player down and leaves the voice channel.
    async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()>;
}

struct CurrentTrack {
    handle: TrackHandle,
    track: Track,
    generation: u64,
}

struct GuildPlayer {
    call: Arc<Mutex<Call>>,
    text_channel: ChannelId,
    queue: VecDeque<Track>,
    current: Option<CurrentTrack>,
    paused: bool,
    volume: u8,
    generation: u64,
}

/// Owns every guild's queue on top of songbird and reports lifecycle changes as `PlayerEvent`s.
pub struct MusicManager {
    songbird: Arc<Songbird>,
    http_client: reqwest::Client,
    players: dashmap::DashMap<GuildId, Arc<Mutex<GuildPlayer>>>,
    events: mpsc::UnboundedSender<PlayerEvent>,
    me: Weak<MusicManager>,
}

impl MusicManager {
    pub fn new(
        songbird: Arc<Songbird>,
        http_client: reqwest::Client,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            songbird,
            http_client,
            players: Default::default(),
            events,
            me: me.clone(),
        })
    }

    pub fn has_player(&self, guild_id: GuildId) -> bool {
        self.players.contains_key(&guild_id)
    }

    fn player(&self, guild_id: GuildId) -> MusicResult<Arc<Mutex<GuildPlayer>>> {
        self.players
            .get(&guild_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(MusicError::NotConnected)
    }

    fn emit(&self, event: PlayerEvent) {
        if self.events.send(event).is_err() {
            warn!("Player event receiver is gone, event dropped");
        }
    }

    /// Joins `voice_channel` and creates the guild's player. No-op if one already exists.
    pub async fn create_player(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        volume: u8,
    ) -> MusicResult<()> {
        if self.has_player(guild_id) {
            return Ok(());
        }

        let call = self
            .songbird
            .join(guild_id, voice_channel)
            .await
            .map_err(|e| MusicError::JoinError(e.to_string()))?;

        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DriverDisconnectNotifier {
                    manager: self.me.clone(),
                    guild_id,
                },
            );
        }

        self.players.entry(guild_id).or_insert_with(|| {
            Arc::new(Mutex::new(GuildPlayer {
                call,
                text_channel,
                queue: VecDeque::new(),
                current: None,
                paused: false,
                volume: volume.min(100),
                generation: 0,
            }))
        });
        info!(
            "Created player for guild {} in voice channel {}",
            guild_id, voice_channel
        );
        Ok(())
    }

    /// Appends a track and returns the resulting queue length.
    pub async fn enqueue(&self, guild_id: GuildId, track: Track) -> MusicResult<usize> {
        let player = self.player(guild_id)?;
        let mut player = player.lock().await;
        debug!("Queueing '{}' in guild {}", track.title, guild_id);
        player.queue.push_back(track);
        Ok(player.queue.len())
    }

    pub async fn queue_len(&self, guild_id: GuildId) -> usize {
        match self.player(guild_id) {
            Ok(player) => player.lock().await.queue.len(),
            Err(_) => 0,
        }
    }

    /// Whether anything is loaded in the player (playing or paused).
    pub async fn is_active(&self, guild_id: GuildId) -> bool {
        match self.player(guild_id) {
            Ok(player) => player.lock().await.current.is_some(),
            Err(_) => false,
        }
    }

    pub async fn play(&self, guild_id: GuildId) -> MusicResult<()> {
        self.start_next(guild_id, None).await.map(|_| ())
    }

    /// Starts the next queued track.
    ///
    /// With `finished == None` this only acts when the player is idle. With
    /// `Some(generation)` it only acts if that generation is still the current track, so
    /// stale end events (after a skip or destroy) are ignored.
    async fn start_next(&self, guild_id: GuildId, finished: Option<u64>) -> MusicResult<bool> {
        let player = self.player(guild_id)?;

        let event = {
            let mut player = player.lock().await;
            let current_generation = player.current.as_ref().map(|c| c.generation);
            match finished {
                None if current_generation.is_some() => return Ok(false),
                Some(generation) if current_generation != Some(generation) => return Ok(false),
                _ => {}
            }

            player.current = None;
            player.paused = false;

            match player.queue.pop_front() {
                None => PlayerEvent::QueueEmpty { guild_id },
                Some(track) => {
                    player.generation += 1;
                    let generation = player.generation;

                    let input = YoutubeDl::new(self.http_client.clone(), track.uri.clone());
                    let handle = player.call.lock().await.play_input(input.into());
                    if let Err(e) = handle.set_volume(f32::from(player.volume) / 100.0) {
                        warn!("Failed to set volume for guild {}: {}", guild_id, e);
                    }

                    let notifier = TrackEndNotifier {
                        manager: self.me.clone(),
                        guild_id,
                        generation,
                    };
                    for event in [TrackEvent::End, TrackEvent::Error] {
                        if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                            error!("Failed to attach track handler in guild {}: {}", guild_id, e);
                        }
                    }

                    info!("Now playing '{}' in guild {}", track.title, guild_id);
                    player.current = Some(CurrentTrack {
                        handle,
                        track: track.clone(),
                        generation,
                    });

                    PlayerEvent::TrackStarted {
                        guild_id,
                        track,
                        queue: player.queue.iter().cloned().collect(),
                        text_channel: Some(player.text_channel),
                    }
                }
            }
        };

        let started = matches!(event, PlayerEvent::TrackStarted { .. });
        self.emit(event);
        Ok(started)
    }

    /// Stops the current track; the end event advances the queue.
    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<Track> {
        let player = self.player(guild_id)?;
        let player = player.lock().await;
        let current = player.current.as_ref().ok_or(MusicError::NothingPlaying)?;
        current
            .handle
            .stop()
            .map_err(|e| MusicError::AudioSourceError(e.to_string()))?;
        Ok(current.track.clone())
    }

    /// Pauses or resumes and returns the new paused state.
    pub async fn set_paused(&self, guild_id: GuildId, paused: bool) -> MusicResult<bool> {
        let player = self.player(guild_id)?;
        let mut player = player.lock().await;
        let current = player.current.as_ref().ok_or(MusicError::NothingPlaying)?;
        let result = if paused {
            current.handle.pause()
        } else {
            current.handle.play()
        };
        result.map_err(|e| MusicError::AudioSourceError(e.to_string()))?;
        player.paused = paused;
        Ok(paused)
    }

    pub async fn toggle_pause(&self, guild_id: GuildId) -> MusicResult<bool> {
        let paused = self.is_paused(guild_id).await;
        self.set_paused(guild_id, !paused).await
    }

    pub async fn is_paused(&self, guild_id: GuildId) -> bool {
        match self.player(guild_id) {
            Ok(player) => player.lock().await.paused,
            Err(_) => false,
        }
    }

    /// Restarts the current track from the beginning.
    pub async fn seek_to_start(&self, guild_id: GuildId) -> MusicResult<Track> {
        let player = self.player(guild_id)?;
        let player = player.lock().await;
        let current = player.current.as_ref().ok_or(MusicError::NothingPlaying)?;
        // The returned callback only reports when the seek lands.
        let _ = current.handle.seek(Duration::ZERO);
        Ok(current.track.clone())
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: u8) -> MusicResult<()> {
        let player = self.player(guild_id)?;
        let mut player = player.lock().await;
        player.volume = volume.min(100);
        if let Some(current) = &player.current {
            current
                .handle
                .set_volume(f32::from(player.volume) / 100.0)
                .map_err(|e| MusicError::AudioSourceError(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn text_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let player = self.player(guild_id).ok()?;
        let channel = player.lock().await.text_channel;
        Some(channel)
    }

    /// Stops playback, clears the queue, leaves voice and emits `PlayerDestroyed`.
    pub async fn destroy(&self, guild_id: GuildId) -> MusicResult<()> {
        let Some((_, player)) = self.players.remove(&guild_id) else {
            return Err(MusicError::NotConnected);
        };

        {
            let mut player = player.lock().await;
            player.queue.clear();
            if let Some(current) = player.current.take() {
                let _ = current.handle.stop();
            }
            player.call.lock().await.stop();
        }

        if let Err(e) = self.songbird.remove(guild_id).await {
            warn!("Failed to leave voice in guild {}: {}", guild_id, e);
        }

        info!("Destroyed player for guild {}", guild_id);
        self.emit(PlayerEvent::PlayerDestroyed { guild_id });
        Ok(())
    }

    /// Destroys any player in a guild the bot is no longer part of, then emits `GuildRemoved`.
    pub async fn forget_guild(&self, guild_id: GuildId) {
        if self.has_player(guild_id) {
            if let Err(e) = self.destroy(guild_id).await {
                warn!("Failed to destroy player for removed guild {}: {}", guild_id, e);
            }
        }
        self.emit(PlayerEvent::GuildRemoved { guild_id });
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Option<PlayerSnapshot> {
        let player = self.player(guild_id).ok()?;
        let player = player.lock().await;
        Some(PlayerSnapshot {
            guild_id: guild_id.to_string(),
            current: player.current.as_ref().map(|c| c.track.clone()),
            queue: player.queue.iter().cloned().collect(),
            playing: player.current.is_some() && !player.paused,
            paused: player.paused,
            volume: player.volume,
        })
    }
}

#[async_trait]
impl PlayerControl for MusicManager {
    async fn snapshot(&self, guild_id: GuildId) -> Option<PlayerSnapshot> {
        MusicManager::snapshot(self, guild_id).await
    }

    async fn enqueue(&self, guild_id: GuildId, track: Track) -> MusicResult<usize> {
        MusicManager::enqueue(self, guild_id, track).await
    }

    async fn play(&self, guild_id: GuildId) -> MusicResult<()> {
        MusicManager::play(self, guild_id).await
    }

    async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()> {
        self.destroy(guild_id).await
    }
}

/// Advances the queue when a track finishes or fails.
#[derive(Clone)]
struct TrackEndNotifier {
    manager: Weak<MusicManager>,
    guild_id: GuildId,
    generation: u64,
}

#[async_trait]
impl songbird::EventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(_) = ctx {
            let manager = self.manager.upgrade()?;
            match manager.start_next(self.guild_id, Some(self.generation)).await {
                Ok(_) | Err(MusicError::NotConnected) => {}
                Err(e) => warn!(
                    "Failed to advance queue in guild {}: {}",
                    self.guild_id, e
                ),
            }
        }
        None
    }
}

/// Destroys the player when the voice connection drops (kicked, channel deleted, ...).
struct DriverDisconnectNotifier {
    manager: Weak<MusicManager>,
    guild_id: GuildId,
}

#[async_trait]
impl songbird::EventHandler for DriverDisconnectNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let manager = self.manager.upgrade()?;
        if manager.has_player(self.guild_id) {
            info!("Voice connection dropped in guild {}", self.guild_id);
            if let Err(e) = manager.destroy(self.guild_id).await {
                debug!("Player already gone in guild {}: {}", self.guild_id, e);
            }
        }
        None
    }
}

/// Get the voice channel ID that the user is currently in
pub fn user_voice_channel(cache: &Cache, guild_id: GuildId, user_id: UserId) -> MusicResult<ChannelId> {
    let guild = cache.guild(guild_id).ok_or(MusicError::NotInGuild)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
        .ok_or(MusicError::UserNotInVoiceChannel)
}

/// Number of non-bot users sharing `channel_id`.
pub fn listeners_in_channel(cache: &Cache, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let bot_id = cache.current_user().id;
    cache
        .guild(guild_id)
        .map(|guild| {
            guild
                .voice_states
                .values()
                .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
                .filter(|state| !state.member.as_ref().is_some_and(|member| member.user.bot))
                .count()
        })
        .unwrap_or_default()
}
