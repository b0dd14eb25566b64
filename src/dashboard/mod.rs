//! HTTP dashboard API: guild settings, live player state, listening history and playlists.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router, middleware};
use serde_json::json;
use serenity::all::GuildId;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::commands::music::utils::broadcaster::StateBroadcaster;
use crate::commands::music::utils::music_manager::MusicError;
use crate::utils::database::Database;

pub mod auth;
pub mod handlers;
pub mod sse;

/// Shared state handed to every dashboard handler.
#[derive(Clone)]
pub struct DashboardState {
    pub db: Database,
    pub broadcaster: Arc<StateBroadcaster>,
    /// Bearer token required on every request when set.
    pub token: Option<String>,
}

impl DashboardState {
    pub fn new(db: Database, broadcaster: Arc<StateBroadcaster>, token: Option<String>) -> Self {
        Self {
            db,
            broadcaster,
            token,
        }
    }
}

/// Errors returned by the dashboard API, rendered as `{ "error": "..." }`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[from] MusicError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Dashboard request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Parses a guild id path segment. Zero and non-numeric ids are rejected.
pub fn parse_guild_id(raw: &str) -> ApiResult<GuildId> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(GuildId::new)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid guild id: {raw}")))
}

/// Build the dashboard router.
pub fn build_router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/guilds/:guild_id/player", get(handlers::get_player))
        .route("/api/guilds/:guild_id/events", get(sse::player_events))
        .route(
            "/api/guilds/:guild_id/settings",
            get(handlers::get_settings).patch(handlers::update_settings),
        )
        .route("/api/guilds/:guild_id/last-queue", get(handlers::get_last_queue))
        .route("/api/guilds/:guild_id/history", get(handlers::get_history))
        .route(
            "/api/playlists",
            get(handlers::list_playlists).post(handlers::create_playlist),
        )
        .route("/api/playlists/:playlist_id", delete(handlers::delete_playlist))
        .route(
            "/api/playlists/:playlist_id/tracks",
            post(handlers::add_playlist_track)
                .delete(handlers::remove_playlist_track)
                .patch(handlers::reorder_playlist),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .with_state(state)
}

/// Serves the dashboard until the process exits.
pub async fn serve(bind: SocketAddr, state: DashboardState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Dashboard API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await
}
