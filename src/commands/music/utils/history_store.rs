//! The persistence contract used by the player-event reconciler, and its SQLite implementation.

use serenity::all::{ChannelId, GuildId, MessageId};
use serenity::async_trait;

use crate::utils::database::{Database, GuildSettings, LastQueueTrack, TrackPlayEntry};

use super::music_manager::MusicResult;

/// Guild settings with defaults applied. Built once from an optional row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub announce_now_playing: bool,
    pub auto_play: bool,
    pub max_queue_size: usize,
    pub allow_duplicates: bool,
    pub request_channel: Option<(ChannelId, MessageId)>,
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        Self {
            announce_now_playing: true,
            auto_play: true,
            max_queue_size: 500,
            allow_duplicates: true,
            request_channel: None,
        }
    }
}

impl From<Option<GuildSettings>> for ResolvedSettings {
    fn from(row: Option<GuildSettings>) -> Self {
        let Some(row) = row else {
            return Self::default();
        };
        let request_channel = match (
            parse_snowflake(row.request_channel_id.as_deref()),
            parse_snowflake(row.request_message_id.as_deref()),
        ) {
            (Some(channel), Some(message)) => {
                Some((ChannelId::new(channel), MessageId::new(message)))
            }
            _ => None,
        };
        Self {
            announce_now_playing: row.announce_now_playing,
            auto_play: row.auto_play,
            max_queue_size: usize::try_from(row.max_queue_size).unwrap_or_default(),
            allow_duplicates: row.allow_duplicates,
            request_channel,
        }
    }
}

fn parse_snowflake(raw: Option<&str>) -> Option<u64> {
    raw?.parse::<u64>().ok().filter(|id| *id != 0)
}

/// Session/history persistence needed while reacting to player events.
#[async_trait]
pub trait MusicStore: Send + Sync {
    async fn guild_settings(&self, guild_id: GuildId) -> MusicResult<ResolvedSettings>;

    async fn record_track_play(&self, entry: TrackPlayEntry) -> MusicResult<()>;

    /// Opens a session counting the track that is starting; returns its id.
    async fn open_session(&self, guild_id: GuildId) -> MusicResult<i64>;

    async fn increment_session(&self, session_id: i64) -> MusicResult<()>;

    async fn close_session(&self, session_id: i64) -> MusicResult<()>;

    /// Replaces the guild's saved queue with `tracks` in one transaction.
    async fn save_last_queue(&self, guild_id: GuildId, tracks: Vec<LastQueueTrack>)
    -> MusicResult<()>;
}

impl Database {
    /// Runs a blocking database call on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> MusicResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = self.clone();
        let value = tokio::task::spawn_blocking(move || f(&db)).await??;
        Ok(value)
    }
}

#[async_trait]
impl MusicStore for Database {
    async fn guild_settings(&self, guild_id: GuildId) -> MusicResult<ResolvedSettings> {
        let row = self
            .run(move |db| db.guild_settings(&guild_id.to_string()))
            .await?;
        Ok(ResolvedSettings::from(row))
    }

    async fn record_track_play(&self, entry: TrackPlayEntry) -> MusicResult<()> {
        self.run(move |db| db.insert_track_play(&entry)).await?;
        Ok(())
    }

    async fn open_session(&self, guild_id: GuildId) -> MusicResult<i64> {
        self.run(move |db| db.create_session(&guild_id.to_string()))
            .await
    }

    async fn increment_session(&self, session_id: i64) -> MusicResult<()> {
        self.run(move |db| db.increment_session(session_id)).await
    }

    async fn close_session(&self, session_id: i64) -> MusicResult<()> {
        self.run(move |db| db.close_session(session_id)).await
    }

    async fn save_last_queue(
        &self,
        guild_id: GuildId,
        tracks: Vec<LastQueueTrack>,
    ) -> MusicResult<()> {
        self.run(move |db| db.save_last_queue(&guild_id.to_string(), &tracks))
            .await
    }
}
