use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{ApiError, ApiResult, DashboardState, parse_guild_id};
use crate::commands::music::utils::broadcaster::PlayerSnapshot;
use crate::utils::database::{
    GuildSettings, LastQueue, NewPlaylist, NewPlaylistTrack, Playlist, PlaylistChange,
    PlaylistTrack, SettingsUpdate, TrackPlay,
};

/// Rows returned by the history endpoint when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
/// Upper bound on the history limit.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// GET /api/guilds/:guild_id/player
pub async fn get_player(
    State(state): State<DashboardState>,
    Path(guild_id): Path<String>,
) -> ApiResult<Json<PlayerSnapshot>> {
    let guild_id = parse_guild_id(&guild_id)?;
    Ok(Json(state.broadcaster.snapshot(guild_id).await))
}

/// GET /api/guilds/:guild_id/settings
pub async fn get_settings(
    State(state): State<DashboardState>,
    Path(guild_id): Path<String>,
) -> ApiResult<Json<GuildSettings>> {
    let key = parse_guild_id(&guild_id)?.to_string();
    let settings = state
        .db
        .run(move |db| db.ensure_guild_settings(&key))
        .await?;
    Ok(Json(settings))
}

/// PATCH /api/guilds/:guild_id/settings
///
/// Only the fields of `SettingsUpdate` are writable; anything else in the body is ignored.
pub async fn update_settings(
    State(state): State<DashboardState>,
    Path(guild_id): Path<String>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<GuildSettings>> {
    let key = parse_guild_id(&guild_id)?.to_string();
    if update.max_queue_size.is_some_and(|size| size < 1) {
        return Err(ApiError::BadRequest(
            "maxQueueSize must be at least 1".to_string(),
        ));
    }

    info!("Dashboard settings update for guild {}: {:?}", key, update);
    let settings = state
        .db
        .run(move |db| db.update_guild_settings(&key, &update))
        .await?;
    Ok(Json(settings))
}

/// GET /api/guilds/:guild_id/last-queue
pub async fn get_last_queue(
    State(state): State<DashboardState>,
    Path(guild_id): Path<String>,
) -> ApiResult<Json<LastQueue>> {
    let key = parse_guild_id(&guild_id)?.to_string();
    state
        .db
        .run(move |db| db.last_queue(&key))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No saved queue for this guild".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// Clamps a requested history size to `1..=MAX_HISTORY_LIMIT`.
pub fn history_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

/// GET /api/guilds/:guild_id/history?limit=N
pub async fn get_history(
    State(state): State<DashboardState>,
    Path(guild_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<TrackPlay>>> {
    let key = parse_guild_id(&guild_id)?.to_string();
    let limit = history_limit(params.limit);
    let plays = state
        .db
        .run(move |db| db.recent_track_plays(&key, limit))
        .await?;
    Ok(Json(plays))
}

/// Parses a playlist or track id path segment.
pub fn parse_row_id(raw: &str, what: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {what} id: {raw}")))
}

/// Treats blank strings like missing ones.
fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn applied<T>(change: PlaylistChange<T>, missing: &str, conflict: &str) -> ApiResult<T> {
    match change {
        PlaylistChange::Done(value) => Ok(value),
        PlaylistChange::NotFound => Err(ApiError::NotFound(missing.to_string())),
        PlaylistChange::Conflict => Err(ApiError::Conflict(conflict.to_string())),
        PlaylistChange::Mismatch => Err(ApiError::BadRequest(
            "order must list every track of the playlist exactly once".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistParams {
    pub user_id: Option<String>,
}

/// GET /api/playlists?userId=ID
///
/// Public playlists, plus the user's own when `userId` is given.
pub async fn list_playlists(
    State(state): State<DashboardState>,
    Query(params): Query<PlaylistParams>,
) -> ApiResult<Json<Vec<Playlist>>> {
    let user_id = required(params.user_id);
    let playlists = state
        .db
        .run(move |db| db.playlists(user_id.as_deref()))
        .await?;
    Ok(Json(playlists))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaylistBody {
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub guild_id: Option<String>,
}

/// POST /api/playlists
pub async fn create_playlist(
    State(state): State<DashboardState>,
    Json(body): Json<CreatePlaylistBody>,
) -> ApiResult<(StatusCode, Json<Playlist>)> {
    let name = required(body.name)
        .ok_or_else(|| ApiError::BadRequest("Playlist name is required".to_string()))?;
    let user_id = required(body.user_id)
        .ok_or_else(|| ApiError::BadRequest("userId is required".to_string()))?;
    let guild_id = match required(body.guild_id) {
        Some(raw) => Some(parse_guild_id(&raw)?.to_string()),
        None => None,
    };

    let new = NewPlaylist {
        user_id,
        name,
        description: required(body.description),
        is_public: body.is_public.unwrap_or(false),
        guild_id,
    };
    info!("Dashboard creating playlist '{}' for user {}", new.name, new.user_id);
    let change = state.db.run(move |db| db.create_playlist(&new)).await?;
    let playlist = applied(
        change,
        "Playlist not found",
        "A playlist with that name already exists",
    )?;
    Ok((StatusCode::CREATED, Json(playlist)))
}

/// DELETE /api/playlists/:playlist_id
pub async fn delete_playlist(
    State(state): State<DashboardState>,
    Path(playlist_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_row_id(&playlist_id, "playlist")?;
    if !state.db.run(move |db| db.delete_playlist(id)).await? {
        return Err(ApiError::NotFound("Playlist not found".to_string()));
    }
    info!("Dashboard deleted playlist {}", id);
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTrackBody {
    pub title: Option<String>,
    pub author: Option<String>,
    pub uri: Option<String>,
    pub duration_ms: Option<i64>,
    pub artwork_url: Option<String>,
    pub source_name: Option<String>,
}

/// POST /api/playlists/:playlist_id/tracks
///
/// Appends after the last position.
pub async fn add_playlist_track(
    State(state): State<DashboardState>,
    Path(playlist_id): Path<String>,
    Json(body): Json<AddTrackBody>,
) -> ApiResult<(StatusCode, Json<PlaylistTrack>)> {
    let id = parse_row_id(&playlist_id, "playlist")?;
    let (Some(title), Some(author), Some(uri)) = (
        required(body.title),
        required(body.author),
        required(body.uri),
    ) else {
        return Err(ApiError::BadRequest(
            "title, author, and uri are required".to_string(),
        ));
    };

    let track = NewPlaylistTrack {
        title,
        author,
        uri,
        duration_ms: body.duration_ms.unwrap_or(0).max(0),
        artwork_url: required(body.artwork_url),
        source_name: required(body.source_name).unwrap_or_else(|| "unknown".to_string()),
    };
    let change = state
        .db
        .run(move |db| db.add_playlist_track(id, &track))
        .await?;
    let added = applied(
        change,
        "Playlist not found",
        "That track is already in the playlist",
    )?;
    Ok((StatusCode::CREATED, Json(added)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveTrackParams {
    pub track_id: Option<String>,
}

/// DELETE /api/playlists/:playlist_id/tracks?trackId=ID
pub async fn remove_playlist_track(
    State(state): State<DashboardState>,
    Path(playlist_id): Path<String>,
    Query(params): Query<RemoveTrackParams>,
) -> ApiResult<Json<Value>> {
    let id = parse_row_id(&playlist_id, "playlist")?;
    let raw = required(params.track_id).ok_or_else(|| {
        ApiError::BadRequest("trackId query param is required".to_string())
    })?;
    let track_id = parse_row_id(&raw, "track")?;

    let change = state
        .db
        .run(move |db| db.remove_playlist_track(id, track_id))
        .await?;
    applied(change, "Track not found in this playlist", "")?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReorderBody {
    /// Track ids in their new order.
    pub order: Option<Vec<i64>>,
}

/// PATCH /api/playlists/:playlist_id/tracks
///
/// All positions are rewritten in one transaction; the reordered tracks are returned.
pub async fn reorder_playlist(
    State(state): State<DashboardState>,
    Path(playlist_id): Path<String>,
    Json(body): Json<ReorderBody>,
) -> ApiResult<Json<Vec<PlaylistTrack>>> {
    let id = parse_row_id(&playlist_id, "playlist")?;
    let order = body
        .order
        .ok_or_else(|| ApiError::BadRequest("order array is required".to_string()))?;

    let change = state
        .db
        .run(move |db| db.reorder_playlist(id, &order))
        .await?;
    let tracks = applied(change, "Playlist not found", "")?;
    Ok(Json(tracks))
}
