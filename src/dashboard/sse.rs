//! Live player state over Server-Sent Events.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use super::{ApiResult, DashboardState, parse_guild_id};
use crate::commands::music::utils::broadcaster::PlayerSnapshot;

const EVENT_NAME: &str = "player";

fn snapshot_event(snapshot: &PlayerSnapshot) -> Option<Event> {
    match Event::default().event(EVENT_NAME).json_data(snapshot) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to serialize player snapshot: {}", e);
            None
        }
    }
}

/// GET /api/guilds/:guild_id/events
///
/// Sends the current snapshot first, then every snapshot broadcast for the guild.
/// Lagging clients skip the snapshots they missed; the next one replaces them anyway.
pub async fn player_events(
    State(state): State<DashboardState>,
    Path(guild_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let guild_id = parse_guild_id(&guild_id)?;
    debug!("New SSE subscriber for guild {}", guild_id);

    // Subscribe before reading the initial snapshot so no update falls in between.
    let receiver = state.broadcaster.subscribe(guild_id);
    let initial = state.broadcaster.snapshot(guild_id).await;

    let updates = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(snapshot) => snapshot_event(&snapshot).map(Ok),
            Err(e) => {
                debug!("SSE subscriber lagged: {:?}", e);
                None
            }
        }
    });
    let stream = stream::iter(snapshot_event(&initial).map(Ok)).chain(updates);

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}
