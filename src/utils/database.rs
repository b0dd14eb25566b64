//! Provides access to the application's SQLite database.
//! Handles schema creation and the CRUD operations for guild settings, track play
//! history, listening sessions, last-queue snapshots, playlists and per-user favorites.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result as SqlResult, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::commands::music::audio_sources::track_metadata::Track;

/// The default filename for the SQLite database.
pub const DEFAULT_DB_PATH: &str = "beatbox.db";

/// Name of the playlist that backs the `/favorite` commands.
pub const FAVORITES_PLAYLIST: &str = "Favorites";

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS guild_settings (
        guild_id TEXT PRIMARY KEY,
        announce_now_playing INTEGER NOT NULL DEFAULT 1,
        auto_play INTEGER NOT NULL DEFAULT 1,
        max_queue_size INTEGER NOT NULL DEFAULT 500,
        allow_duplicates INTEGER NOT NULL DEFAULT 1,
        request_channel_id TEXT,
        request_message_id TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS track_plays (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        username TEXT NOT NULL,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        uri TEXT NOT NULL,
        source_name TEXT NOT NULL,
        duration_ms INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_track_plays_guild ON track_plays (guild_id, created_at);

    CREATE TABLE IF NOT EXISTS listening_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT NOT NULL,
        tracks_played INTEGER NOT NULL DEFAULT 0,
        started_at TEXT NOT NULL,
        ended_at TEXT
    );

    CREATE TABLE IF NOT EXISTS last_queues (
        guild_id TEXT PRIMARY KEY,
        saved_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS last_queue_tracks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT NOT NULL REFERENCES last_queues (guild_id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        uri TEXT NOT NULL,
        duration_ms INTEGER NOT NULL,
        artwork_url TEXT,
        source_name TEXT NOT NULL,
        position INTEGER NOT NULL,
        was_playing INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS playlists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL COLLATE NOCASE,
        description TEXT,
        is_public INTEGER NOT NULL DEFAULT 0,
        guild_id TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (user_id, name)
    );

    CREATE TABLE IF NOT EXISTS playlist_tracks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        playlist_id INTEGER NOT NULL REFERENCES playlists (id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        uri TEXT NOT NULL,
        duration_ms INTEGER NOT NULL,
        artwork_url TEXT,
        source_name TEXT NOT NULL,
        position INTEGER NOT NULL,
        added_at TEXT NOT NULL,
        UNIQUE (playlist_id, uri)
    );
";

/// Persisted per-guild configuration. Absent rows mean "all defaults".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildSettings {
    pub guild_id: String,
    pub announce_now_playing: bool,
    pub auto_play: bool,
    pub max_queue_size: i64,
    pub allow_duplicates: bool,
    pub request_channel_id: Option<String>,
    pub request_message_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Partial settings update. Only these fields are writable from the dashboard;
/// anything else in a request body is ignored during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub announce_now_playing: Option<bool>,
    pub auto_play: Option<bool>,
    pub max_queue_size: Option<i64>,
    pub allow_duplicates: Option<bool>,
}

/// A track play about to be appended to the history.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPlayEntry {
    pub guild_id: String,
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub author: String,
    pub uri: String,
    pub source_name: String,
    pub duration_ms: i64,
}

/// A stored track play.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPlay {
    pub id: i64,
    pub guild_id: String,
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub author: String,
    pub uri: String,
    pub source_name: String,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// A contiguous span of playback activity in one guild.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningSession {
    pub id: i64,
    pub guild_id: String,
    pub tracks_played: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One entry of a saved queue snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastQueueTrack {
    pub title: String,
    pub author: String,
    pub uri: String,
    pub duration_ms: i64,
    pub artwork_url: Option<String>,
    pub source_name: String,
    pub position: i64,
    pub was_playing: bool,
}

/// The queue a guild had when its player was last destroyed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastQueue {
    pub guild_id: String,
    pub saved_at: DateTime<Utc>,
    pub tracks: Vec<LastQueueTrack>,
}

/// A track stored in a user's favorites playlist. Positions start at 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteTrack {
    pub position: i64,
    pub title: String,
    pub author: String,
    pub uri: String,
    pub duration_ms: i64,
    pub artwork_url: Option<String>,
    pub source_name: String,
    pub added_at: DateTime<Utc>,
}

/// Result of adding a track to a user's favorites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteOutcome {
    /// Added at the given position.
    Added(i64),
    /// A track with the same uri was already saved.
    AlreadyPresent,
}

/// A saved playlist with its tracks in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub guild_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub track_count: usize,
    pub tracks: Vec<PlaylistTrack>,
}

/// One entry of a playlist. Positions start at 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistTrack {
    pub id: i64,
    pub position: i64,
    pub title: String,
    pub author: String,
    pub uri: String,
    pub duration_ms: i64,
    pub artwork_url: Option<String>,
    pub source_name: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPlaylist {
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPlaylistTrack {
    pub title: String,
    pub author: String,
    pub uri: String,
    pub duration_ms: i64,
    pub artwork_url: Option<String>,
    pub source_name: String,
}

/// Result of a write against one playlist.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistChange<T> {
    Done(T),
    /// No playlist (or track) with that id.
    NotFound,
    /// The name or track uri is already taken.
    Conflict,
    /// A reorder did not list exactly the playlist's tracks.
    Mismatch,
}

/// Shared handle to the SQLite connection.
///
/// rusqlite connections are synchronous; async callers should go through
/// `tokio::task::spawn_blocking` (see the `MusicStore` implementation).
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database file at `path` and makes sure every table exists.
    pub fn open(path: impl AsRef<Path>) -> SqlResult<Self> {
        let path = path.as_ref();
        info!("Opening database at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database. Used by tests.
    pub fn open_in_memory() -> SqlResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ----------------------------------------------------------------------
    // Guild settings
    // ----------------------------------------------------------------------

    /// Retrieves the settings row for a guild, if one was ever written.
    pub fn guild_settings(&self, guild_id: &str) -> SqlResult<Option<GuildSettings>> {
        self.conn()
            .query_row(
                "SELECT guild_id, announce_now_playing, auto_play, max_queue_size,
                        allow_duplicates, request_channel_id, request_message_id, updated_at
                 FROM guild_settings WHERE guild_id = ?1",
                params![guild_id],
                settings_from_row,
            )
            .optional()
    }

    /// Returns the settings row for a guild, inserting a default row first if needed.
    pub fn ensure_guild_settings(&self, guild_id: &str) -> SqlResult<GuildSettings> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO guild_settings (guild_id, updated_at) VALUES (?1, ?2)
             ON CONFLICT (guild_id) DO NOTHING",
            params![guild_id, Utc::now()],
        )?;
        conn.query_row(
            "SELECT guild_id, announce_now_playing, auto_play, max_queue_size,
                    allow_duplicates, request_channel_id, request_message_id, updated_at
             FROM guild_settings WHERE guild_id = ?1",
            params![guild_id],
            settings_from_row,
        )
    }

    /// Applies a partial update. Fields left as `None` keep their stored value.
    pub fn update_guild_settings(
        &self,
        guild_id: &str,
        update: &SettingsUpdate,
    ) -> SqlResult<GuildSettings> {
        self.ensure_guild_settings(guild_id)?;
        self.conn().execute(
            "UPDATE guild_settings SET
                announce_now_playing = COALESCE(?2, announce_now_playing),
                auto_play = COALESCE(?3, auto_play),
                max_queue_size = COALESCE(?4, max_queue_size),
                allow_duplicates = COALESCE(?5, allow_duplicates),
                updated_at = ?6
             WHERE guild_id = ?1",
            params![
                guild_id,
                update.announce_now_playing,
                update.auto_play,
                update.max_queue_size,
                update.allow_duplicates,
                Utc::now()
            ],
        )?;
        debug!("Updated settings for guild {}: {:?}", guild_id, update);
        self.ensure_guild_settings(guild_id)
    }

    /// Records the channel and message used as the guild's request channel.
    pub fn set_request_channel(
        &self,
        guild_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> SqlResult<()> {
        self.ensure_guild_settings(guild_id)?;
        self.conn().execute(
            "UPDATE guild_settings
             SET request_channel_id = ?2, request_message_id = ?3, updated_at = ?4
             WHERE guild_id = ?1",
            params![guild_id, channel_id, message_id, Utc::now()],
        )?;
        Ok(())
    }

    /// Forgets the guild's request channel.
    pub fn clear_request_channel(&self, guild_id: &str) -> SqlResult<()> {
        self.conn().execute(
            "UPDATE guild_settings
             SET request_channel_id = NULL, request_message_id = NULL, updated_at = ?2
             WHERE guild_id = ?1",
            params![guild_id, Utc::now()],
        )?;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Track plays
    // ----------------------------------------------------------------------

    /// Appends a track play and returns its row id.
    pub fn insert_track_play(&self, entry: &TrackPlayEntry) -> SqlResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO track_plays
                (guild_id, user_id, username, title, author, uri, source_name, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.guild_id,
                entry.user_id,
                entry.username,
                entry.title,
                entry.author,
                entry.uri,
                entry.source_name,
                entry.duration_ms,
                Utc::now()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent plays for a guild, newest first.
    pub fn recent_track_plays(&self, guild_id: &str, limit: usize) -> SqlResult<Vec<TrackPlay>> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT id, guild_id, user_id, username, title, author, uri, source_name,
                    duration_ms, created_at
             FROM track_plays WHERE guild_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let plays = statement
            .query_map(params![guild_id, limit], |row| {
                Ok(TrackPlay {
                    id: row.get(0)?,
                    guild_id: row.get(1)?,
                    user_id: row.get(2)?,
                    username: row.get(3)?,
                    title: row.get(4)?,
                    author: row.get(5)?,
                    uri: row.get(6)?,
                    source_name: row.get(7)?,
                    duration_ms: row.get(8)?,
                    created_at: row.get(9)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(plays)
    }

    // ----------------------------------------------------------------------
    // Listening sessions
    // ----------------------------------------------------------------------

    /// Opens a session for the track that is starting right now.
    pub fn create_session(&self, guild_id: &str) -> SqlResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO listening_sessions (guild_id, tracks_played, started_at)
             VALUES (?1, 1, ?2)",
            params![guild_id, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Counts one more track against an open session. Closed sessions are left untouched.
    pub fn increment_session(&self, session_id: i64) -> SqlResult<()> {
        self.conn().execute(
            "UPDATE listening_sessions SET tracks_played = tracks_played + 1
             WHERE id = ?1 AND ended_at IS NULL",
            params![session_id],
        )?;
        Ok(())
    }

    /// Stamps `ended_at` on a session. A session is only ever closed once.
    pub fn close_session(&self, session_id: i64) -> SqlResult<()> {
        self.conn().execute(
            "UPDATE listening_sessions SET ended_at = ?2 WHERE id = ?1 AND ended_at IS NULL",
            params![session_id, Utc::now()],
        )?;
        Ok(())
    }

    /// Closes every session left open by a previous process. Returns how many were closed.
    pub fn close_stale_sessions(&self) -> SqlResult<usize> {
        self.conn().execute(
            "UPDATE listening_sessions SET ended_at = ?1 WHERE ended_at IS NULL",
            params![Utc::now()],
        )
    }

    pub fn session(&self, session_id: i64) -> SqlResult<Option<ListeningSession>> {
        self.conn()
            .query_row(
                "SELECT id, guild_id, tracks_played, started_at, ended_at
                 FROM listening_sessions WHERE id = ?1",
                params![session_id],
                session_from_row,
            )
            .optional()
    }

    /// Sessions of a guild that have not been closed yet.
    pub fn open_sessions(&self, guild_id: &str) -> SqlResult<Vec<ListeningSession>> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT id, guild_id, tracks_played, started_at, ended_at
             FROM listening_sessions WHERE guild_id = ?1 AND ended_at IS NULL
             ORDER BY id",
        )?;
        let sessions = statement
            .query_map(params![guild_id], session_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(sessions)
    }

    // ----------------------------------------------------------------------
    // Last queue snapshots
    // ----------------------------------------------------------------------

    /// Replaces the guild's saved queue in one transaction: either the whole new
    /// snapshot is visible afterwards or the previous one is kept.
    pub fn save_last_queue(&self, guild_id: &str, tracks: &[LastQueueTrack]) -> SqlResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO last_queues (guild_id, saved_at) VALUES (?1, ?2)
             ON CONFLICT (guild_id) DO UPDATE SET saved_at = excluded.saved_at",
            params![guild_id, Utc::now()],
        )?;
        tx.execute(
            "DELETE FROM last_queue_tracks WHERE guild_id = ?1",
            params![guild_id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO last_queue_tracks
                    (guild_id, title, author, uri, duration_ms, artwork_url, source_name, position, was_playing)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for track in tracks {
                insert.execute(params![
                    guild_id,
                    track.title,
                    track.author,
                    track.uri,
                    track.duration_ms,
                    track.artwork_url,
                    track.source_name,
                    track.position,
                    track.was_playing
                ])?;
            }
        }
        tx.commit()?;

        debug!("Saved {} queued tracks for guild {}", tracks.len(), guild_id);
        Ok(())
    }

    /// Loads the guild's saved queue, ordered by position.
    pub fn last_queue(&self, guild_id: &str) -> SqlResult<Option<LastQueue>> {
        let conn = self.conn();
        let saved_at: Option<DateTime<Utc>> = conn
            .query_row(
                "SELECT saved_at FROM last_queues WHERE guild_id = ?1",
                params![guild_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(saved_at) = saved_at else {
            return Ok(None);
        };

        let mut statement = conn.prepare(
            "SELECT title, author, uri, duration_ms, artwork_url, source_name, position, was_playing
             FROM last_queue_tracks WHERE guild_id = ?1 ORDER BY position",
        )?;
        let tracks = statement
            .query_map(params![guild_id], |row| {
                Ok(LastQueueTrack {
                    title: row.get(0)?,
                    author: row.get(1)?,
                    uri: row.get(2)?,
                    duration_ms: row.get(3)?,
                    artwork_url: row.get(4)?,
                    source_name: row.get(5)?,
                    position: row.get(6)?,
                    was_playing: row.get(7)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(Some(LastQueue {
            guild_id: guild_id.to_string(),
            saved_at,
            tracks,
        }))
    }

    // ----------------------------------------------------------------------
    // Favorites
    // ----------------------------------------------------------------------

    fn favorites_playlist_id(conn: &Connection, user_id: &str) -> SqlResult<i64> {
        conn.execute(
            "INSERT INTO playlists (user_id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, name) DO NOTHING",
            params![user_id, FAVORITES_PLAYLIST, Utc::now()],
        )?;
        conn.query_row(
            "SELECT id FROM playlists WHERE user_id = ?1 AND name = ?2",
            params![user_id, FAVORITES_PLAYLIST],
            |row| row.get(0),
        )
    }

    /// Saves a track to the user's favorites unless a track with the same uri is already there.
    pub fn add_favorite(&self, user_id: &str, track: &Track) -> SqlResult<FavoriteOutcome> {
        let conn = self.conn();
        let playlist_id = Self::favorites_playlist_id(&conn, user_id)?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM playlist_tracks WHERE playlist_id = ?1 AND uri = ?2)",
            params![playlist_id, track.uri],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(FavoriteOutcome::AlreadyPresent);
        }

        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM playlist_tracks WHERE playlist_id = ?1",
            params![playlist_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO playlist_tracks
                (playlist_id, title, author, uri, duration_ms, artwork_url, source_name, position, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                playlist_id,
                track.title,
                track.author,
                track.uri,
                track.duration_ms_i64(),
                track.artwork_url,
                track.source_name,
                position,
                Utc::now()
            ],
        )?;
        Ok(FavoriteOutcome::Added(position))
    }

    /// The user's favorites in playlist order.
    pub fn favorites(&self, user_id: &str) -> SqlResult<Vec<FavoriteTrack>> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT t.position, t.title, t.author, t.uri, t.duration_ms, t.artwork_url,
                    t.source_name, t.added_at
             FROM playlist_tracks t
             JOIN playlists p ON p.id = t.playlist_id
             WHERE p.user_id = ?1 AND p.name = ?2
             ORDER BY t.position",
        )?;
        let favorites = statement
            .query_map(params![user_id, FAVORITES_PLAYLIST], favorite_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(favorites)
    }

    /// Removes the favorite at `position` (1-based) and closes the gap it leaves.
    pub fn remove_favorite(&self, user_id: &str, position: i64) -> SqlResult<Option<FavoriteTrack>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let playlist_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM playlists WHERE user_id = ?1 AND name = ?2",
                params![user_id, FAVORITES_PLAYLIST],
                |row| row.get(0),
            )
            .optional()?;
        let Some(playlist_id) = playlist_id else {
            return Ok(None);
        };

        let removed = tx
            .query_row(
                "SELECT position, title, author, uri, duration_ms, artwork_url, source_name, added_at
                 FROM playlist_tracks WHERE playlist_id = ?1 AND position = ?2",
                params![playlist_id, position],
                favorite_from_row,
            )
            .optional()?;

        if removed.is_some() {
            tx.execute(
                "DELETE FROM playlist_tracks WHERE playlist_id = ?1 AND position = ?2",
                params![playlist_id, position],
            )?;
            tx.execute(
                "UPDATE playlist_tracks SET position = position - 1
                 WHERE playlist_id = ?1 AND position > ?2",
                params![playlist_id, position],
            )?;
        }
        tx.commit()?;

        Ok(removed)
    }

    // ----------------------------------------------------------------------
    // Playlists
    // ----------------------------------------------------------------------

    fn load_playlist_tracks(conn: &Connection, playlist_id: i64) -> SqlResult<Vec<PlaylistTrack>> {
        let mut statement = conn.prepare(
            "SELECT id, position, title, author, uri, duration_ms, artwork_url, source_name, added_at
             FROM playlist_tracks WHERE playlist_id = ?1
             ORDER BY position, id",
        )?;
        let tracks = statement
            .query_map(params![playlist_id], playlist_track_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(tracks)
    }

    fn load_playlist(conn: &Connection, playlist_id: i64) -> SqlResult<Option<Playlist>> {
        let playlist = conn
            .query_row(
                "SELECT id, user_id, name, description, is_public, guild_id, created_at
                 FROM playlists WHERE id = ?1",
                params![playlist_id],
                playlist_from_row,
            )
            .optional()?;
        let Some(mut playlist) = playlist else {
            return Ok(None);
        };
        playlist.tracks = Self::load_playlist_tracks(conn, playlist_id)?;
        playlist.track_count = playlist.tracks.len();
        Ok(Some(playlist))
    }

    fn playlist_exists(conn: &Connection, playlist_id: i64) -> SqlResult<bool> {
        conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM playlists WHERE id = ?1)",
            params![playlist_id],
            |row| row.get(0),
        )
    }

    /// Playlists visible to `user_id` (their own plus public ones), or only public
    /// playlists when no user is given. Newest first.
    pub fn playlists(&self, user_id: Option<&str>) -> SqlResult<Vec<Playlist>> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT id, user_id, name, description, is_public, guild_id, created_at
             FROM playlists
             WHERE is_public = 1 OR user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let mut playlists = statement
            .query_map(params![user_id], playlist_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        for playlist in &mut playlists {
            playlist.tracks = Self::load_playlist_tracks(&conn, playlist.id)?;
            playlist.track_count = playlist.tracks.len();
        }
        Ok(playlists)
    }

    pub fn playlist(&self, playlist_id: i64) -> SqlResult<Option<Playlist>> {
        Self::load_playlist(&self.conn(), playlist_id)
    }

    /// Creates an empty playlist. Names are unique per user, ignoring case.
    pub fn create_playlist(&self, new: &NewPlaylist) -> SqlResult<PlaylistChange<Playlist>> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO playlists (user_id, name, description, is_public, guild_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (user_id, name) DO NOTHING",
            params![
                new.user_id,
                new.name,
                new.description,
                new.is_public,
                new.guild_id,
                Utc::now()
            ],
        )?;
        if inserted == 0 {
            return Ok(PlaylistChange::Conflict);
        }
        let id = conn.last_insert_rowid();
        debug!("Created playlist {} '{}' for user {}", id, new.name, new.user_id);
        Ok(Self::load_playlist(&conn, id)?.map_or(PlaylistChange::NotFound, PlaylistChange::Done))
    }

    /// Deletes a playlist and its tracks. Returns whether it existed.
    pub fn delete_playlist(&self, playlist_id: i64) -> SqlResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM playlists WHERE id = ?1", params![playlist_id])?;
        Ok(deleted > 0)
    }

    /// Appends a track after the playlist's last position.
    pub fn add_playlist_track(
        &self,
        playlist_id: i64,
        track: &NewPlaylistTrack,
    ) -> SqlResult<PlaylistChange<PlaylistTrack>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if !Self::playlist_exists(&tx, playlist_id)? {
            return Ok(PlaylistChange::NotFound);
        }

        let position: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM playlist_tracks WHERE playlist_id = ?1",
            params![playlist_id],
            |row| row.get(0),
        )?;
        let inserted = tx.execute(
            "INSERT INTO playlist_tracks
                (playlist_id, title, author, uri, duration_ms, artwork_url, source_name, position, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (playlist_id, uri) DO NOTHING",
            params![
                playlist_id,
                track.title,
                track.author,
                track.uri,
                track.duration_ms,
                track.artwork_url,
                track.source_name,
                position,
                Utc::now()
            ],
        )?;
        if inserted == 0 {
            return Ok(PlaylistChange::Conflict);
        }

        let added = tx.query_row(
            "SELECT id, position, title, author, uri, duration_ms, artwork_url, source_name, added_at
             FROM playlist_tracks WHERE id = ?1",
            params![tx.last_insert_rowid()],
            playlist_track_from_row,
        )?;
        tx.commit()?;
        Ok(PlaylistChange::Done(added))
    }

    /// Removes one track and closes the gap it leaves.
    pub fn remove_playlist_track(
        &self,
        playlist_id: i64,
        track_id: i64,
    ) -> SqlResult<PlaylistChange<()>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let position: Option<i64> = tx
            .query_row(
                "SELECT position FROM playlist_tracks WHERE id = ?1 AND playlist_id = ?2",
                params![track_id, playlist_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(position) = position else {
            return Ok(PlaylistChange::NotFound);
        };

        tx.execute("DELETE FROM playlist_tracks WHERE id = ?1", params![track_id])?;
        tx.execute(
            "UPDATE playlist_tracks SET position = position - 1
             WHERE playlist_id = ?1 AND position > ?2",
            params![playlist_id, position],
        )?;
        tx.commit()?;
        Ok(PlaylistChange::Done(()))
    }

    /// Rewrites positions so tracks play in `order` (track ids). Either every position
    /// changes or none does; `order` must list each of the playlist's tracks exactly once.
    pub fn reorder_playlist(
        &self,
        playlist_id: i64,
        order: &[i64],
    ) -> SqlResult<PlaylistChange<Vec<PlaylistTrack>>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if !Self::playlist_exists(&tx, playlist_id)? {
            return Ok(PlaylistChange::NotFound);
        }

        let mut current: Vec<i64> = Self::load_playlist_tracks(&tx, playlist_id)?
            .into_iter()
            .map(|track| track.id)
            .collect();
        let mut requested = order.to_vec();
        current.sort_unstable();
        requested.sort_unstable();
        if current != requested {
            return Ok(PlaylistChange::Mismatch);
        }

        {
            let mut update = tx.prepare(
                "UPDATE playlist_tracks SET position = ?1 WHERE id = ?2 AND playlist_id = ?3",
            )?;
            for (index, track_id) in order.iter().enumerate() {
                update.execute(params![index as i64 + 1, track_id, playlist_id])?;
            }
        }
        let tracks = Self::load_playlist_tracks(&tx, playlist_id)?;
        tx.commit()?;
        Ok(PlaylistChange::Done(tracks))
    }
}

fn playlist_from_row(row: &Row<'_>) -> SqlResult<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        is_public: row.get(4)?,
        guild_id: row.get(5)?,
        created_at: row.get(6)?,
        track_count: 0,
        tracks: Vec::new(),
    })
}

fn playlist_track_from_row(row: &Row<'_>) -> SqlResult<PlaylistTrack> {
    Ok(PlaylistTrack {
        id: row.get(0)?,
        position: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        uri: row.get(4)?,
        duration_ms: row.get(5)?,
        artwork_url: row.get(6)?,
        source_name: row.get(7)?,
        added_at: row.get(8)?,
    })
}

fn settings_from_row(row: &Row<'_>) -> SqlResult<GuildSettings> {
    Ok(GuildSettings {
        guild_id: row.get(0)?,
        announce_now_playing: row.get(1)?,
        auto_play: row.get(2)?,
        max_queue_size: row.get(3)?,
        allow_duplicates: row.get(4)?,
        request_channel_id: row.get(5)?,
        request_message_id: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn session_from_row(row: &Row<'_>) -> SqlResult<ListeningSession> {
    Ok(ListeningSession {
        id: row.get(0)?,
        guild_id: row.get(1)?,
        tracks_played: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
    })
}

fn favorite_from_row(row: &Row<'_>) -> SqlResult<FavoriteTrack> {
    Ok(FavoriteTrack {
        position: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        uri: row.get(3)?,
        duration_ms: row.get(4)?,
        artwork_url: row.get(5)?,
        source_name: row.get(6)?,
        added_at: row.get(7)?,
    })
}
