//! Reacts to player lifecycle events: keeps the guild state store, history, dashboard
//! subscribers and the request-channel message in line with what the player is doing.

use serenity::all::{ChannelId, GuildId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::commands::music::audio_sources::TrackSearch;
use crate::commands::music::audio_sources::track_metadata::{Requester, Track};

use super::autoplay_manager::{autoplay_candidates, autoplay_query, pick_autoplay_track};
use super::broadcaster::StateBroadcaster;
use super::embedded_messages::{NowPlayingAnnouncer, RequestChannelEmbeds};
use super::guild_state::GuildStateStore;
use super::history_store::MusicStore;
use super::music_manager::{MusicError, MusicResult, PlayerControl};

/// Lifecycle events emitted by the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackStarted {
        guild_id: GuildId,
        track: Track,
        /// Tracks still queued after `track`, in play order.
        queue: Vec<Track>,
        /// Where the now-playing announcement goes.
        text_channel: Option<ChannelId>,
    },
    QueueEmpty {
        guild_id: GuildId,
    },
    PlayerDestroyed {
        guild_id: GuildId,
    },
    /// The bot left the guild; nothing about it needs to be kept.
    GuildRemoved {
        guild_id: GuildId,
    },
}

/// The best-effort steps whose failures are reported instead of propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    RequestEmbed,
    Announcement,
    TrackPlay,
    Session,
    Autoplay,
    LastQueue,
    SessionClose,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SideEffect::RequestEmbed => "request channel embed",
            SideEffect::Announcement => "now playing announcement",
            SideEffect::TrackPlay => "track play history",
            SideEffect::Session => "listening session",
            SideEffect::Autoplay => "autoplay",
            SideEffect::LastQueue => "last queue snapshot",
            SideEffect::SessionClose => "session close",
        };
        f.write_str(name)
    }
}

/// Receives every side-effect failure.
pub type FailureObserver = Arc<dyn Fn(GuildId, SideEffect, &MusicError) + Send + Sync>;

/// The default observer: log and move on.
pub fn log_failures() -> FailureObserver {
    Arc::new(|guild_id, step, err| {
        error!("{} failed for guild {}: {}", step, guild_id, err);
    })
}

/// Applies `PlayerEvent`s one at a time.
pub struct PlayerEventReconciler {
    state: Arc<GuildStateStore>,
    store: Arc<dyn MusicStore>,
    search: Arc<dyn TrackSearch>,
    player: Arc<dyn PlayerControl>,
    broadcaster: Arc<StateBroadcaster>,
    announcer: Arc<dyn NowPlayingAnnouncer>,
    embeds: Arc<dyn RequestChannelEmbeds>,
    observer: FailureObserver,
    idle_timeout: Option<Duration>,
}

impl PlayerEventReconciler {
    pub fn new(
        state: Arc<GuildStateStore>,
        store: Arc<dyn MusicStore>,
        search: Arc<dyn TrackSearch>,
        player: Arc<dyn PlayerControl>,
        broadcaster: Arc<StateBroadcaster>,
        announcer: Arc<dyn NowPlayingAnnouncer>,
        embeds: Arc<dyn RequestChannelEmbeds>,
    ) -> Self {
        Self {
            state,
            store,
            search,
            player,
            broadcaster,
            announcer,
            embeds,
            observer: log_failures(),
            idle_timeout: None,
        }
    }

    pub fn with_failure_observer(mut self, observer: FailureObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Disconnect idle players after `timeout`. Without this, idle players stay connected.
    pub fn with_idle_disconnect(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Consumes events until every sender is dropped.
    pub fn spawn(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<PlayerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Player event reconciler started");
            while let Some(event) = events.recv().await {
                self.handle(event).await;
            }
            info!("Player event stream closed, reconciler stopping");
        })
    }

    pub async fn handle(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::TrackStarted {
                guild_id,
                track,
                queue,
                text_channel,
            } => self.on_track_started(guild_id, track, queue, text_channel).await,
            PlayerEvent::QueueEmpty { guild_id } => self.on_queue_empty(guild_id).await,
            PlayerEvent::PlayerDestroyed { guild_id } => self.on_player_destroyed(guild_id).await,
            PlayerEvent::GuildRemoved { guild_id } => {
                info!("Forgetting player state for guild {}", guild_id);
                self.state.purge(guild_id);
            }
        }
    }

    fn report(&self, guild_id: GuildId, step: SideEffect, err: &MusicError) {
        (self.observer)(guild_id, step, err);
    }

    async fn refresh_views(&self, guild_id: GuildId, track: Option<Track>) {
        self.broadcaster.broadcast(guild_id).await;
        if let Err(e) = self.embeds.update_embed(guild_id, track, false).await {
            self.report(guild_id, SideEffect::RequestEmbed, &e);
        }
    }

    #[instrument(skip(self, track, queue), fields(track = %track.title))]
    pub async fn on_track_started(
        &self,
        guild_id: GuildId,
        track: Track,
        queue: Vec<Track>,
        text_channel: Option<ChannelId>,
    ) {
        self.state.cancel_disconnect(guild_id);
        self.state.begin_track(guild_id, track.clone(), queue);

        self.refresh_views(guild_id, Some(track.clone())).await;

        if !track.requester.is_autoplay() {
            self.announce(guild_id, &track, text_channel).await;
        }

        self.record_play(guild_id, &track).await;
    }

    async fn announce(&self, guild_id: GuildId, track: &Track, text_channel: Option<ChannelId>) {
        let Some(channel_id) = text_channel else {
            return;
        };
        let result = async {
            let settings = self.store.guild_settings(guild_id).await?;
            if settings.announce_now_playing {
                self.announcer.announce(channel_id, track).await?;
            }
            Ok::<_, MusicError>(())
        }
        .await;
        if let Err(e) = result {
            self.report(guild_id, SideEffect::Announcement, &e);
        }
    }

    async fn record_play(&self, guild_id: GuildId, track: &Track) {
        if let Err(e) = self.store.record_track_play(track.play_entry(guild_id)).await {
            self.report(guild_id, SideEffect::TrackPlay, &e);
        }

        let result = match self.state.active_session(guild_id) {
            Some(session_id) => self.store.increment_session(session_id).await,
            None => self
                .store
                .open_session(guild_id)
                .await
                .map(|session_id| {
                    debug!("Opened listening session {} for guild {}", session_id, guild_id);
                    self.state.set_active_session(guild_id, session_id);
                }),
        };
        if let Err(e) = result {
            self.report(guild_id, SideEffect::Session, &e);
        }
    }

    #[instrument(skip(self))]
    pub async fn on_queue_empty(&self, guild_id: GuildId) {
        self.refresh_views(guild_id, None).await;

        match self.try_autoplay(guild_id).await {
            Ok(true) => {}
            Ok(false) => self.schedule_idle_disconnect(guild_id),
            Err(e) => {
                self.report(guild_id, SideEffect::Autoplay, &e);
                self.schedule_idle_disconnect(guild_id);
            }
        }
    }

    /// Queues something similar to the last track. Returns whether a track was queued.
    async fn try_autoplay(&self, guild_id: GuildId) -> MusicResult<bool> {
        let settings = self.store.guild_settings(guild_id).await?;
        if !settings.auto_play {
            return Ok(false);
        }
        let Some(last) = self.state.current_track(guild_id) else {
            return Ok(false);
        };

        let results = self
            .search
            .search(&autoplay_query(&last), &Requester::autoplay())
            .await?;
        let candidates = autoplay_candidates(&last, results.tracks);
        let Some(next) = pick_autoplay_track(&candidates) else {
            info!(
                "Autoplay found nothing new after '{}' in guild {}",
                last.title, guild_id
            );
            return Ok(false);
        };

        info!("Autoplay queueing '{}' in guild {}", next.title, guild_id);
        self.player.enqueue(guild_id, next).await?;
        self.player.play(guild_id).await?;
        self.broadcaster.broadcast(guild_id).await;
        Ok(true)
    }

    fn schedule_idle_disconnect(&self, guild_id: GuildId) {
        if let Some(timeout) = self.idle_timeout {
            self.state
                .schedule_disconnect(guild_id, timeout, Arc::clone(&self.player));
        }
    }

    #[instrument(skip(self))]
    pub async fn on_player_destroyed(&self, guild_id: GuildId) {
        self.refresh_views(guild_id, None).await;

        if let Some(cache) = self.state.take_last_queue(guild_id) {
            if !cache.is_empty() {
                if let Err(e) = self
                    .store
                    .save_last_queue(guild_id, cache.snapshot_tracks())
                    .await
                {
                    self.report(guild_id, SideEffect::LastQueue, &e);
                }
            }
        }

        // The id is only dropped once its row is closed.
        if let Some(session_id) = self.state.active_session(guild_id) {
            match self.store.close_session(session_id).await {
                Ok(()) => {
                    self.state.clear_active_session(guild_id, session_id);
                    debug!("Closed listening session {} for guild {}", session_id, guild_id);
                }
                Err(e) => self.report(guild_id, SideEffect::SessionClose, &e),
            }
        }

        self.state.cancel_disconnect(guild_id);
        self.state.clear_skip_votes(guild_id);
    }
}
