use serenity::all::{ChannelId, GuildId};
use std::collections::HashSet;
use tracing::{debug, info};

use super::audio_sources::{SearchKind, TrackSearch};
use super::audio_sources::track_metadata::{Requester, Track};
use super::utils::embedded_messages::{added_to_queue, error_reply, playlist_added};
use super::utils::history_store::MusicStore;
use super::utils::music_manager::{MusicError, MusicResult};
use super::{author_voice_channel, reply, reply_error, require_guild};
use crate::{CommandResult, Context, Data};

/// A query to resolve and queue on behalf of a user.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
    pub query: String,
    pub requester: Requester,
}

/// What `queue_request` ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOutcome {
    Track { track: Track, position: usize },
    Playlist { name: String, added: usize, skipped: usize },
    Duplicate(Track),
    NoResults,
}

/// Resolves a request, queues the result and starts playback if the player was idle.
/// Shared by `/play` and the request channel.
pub async fn queue_request(data: &Data, request: PlayRequest) -> MusicResult<QueueOutcome> {
    let PlayRequest {
        guild_id,
        voice_channel,
        text_channel,
        query,
        requester,
    } = request;

    data.guild_state.cancel_disconnect(guild_id);

    let settings = MusicStore::guild_settings(&data.db, guild_id).await?;
    let result = data.search.search(&query, &requester).await?;
    if result.is_empty() {
        return Ok(QueueOutcome::NoResults);
    }

    data.music
        .create_player(guild_id, voice_channel, text_channel, data.config.default_volume)
        .await?;

    let mut known_uris: HashSet<String> = HashSet::new();
    if !settings.allow_duplicates {
        if let Some(snapshot) = data.music.snapshot(guild_id).await {
            known_uris.extend(snapshot.current.into_iter().map(|t| t.uri));
            known_uris.extend(snapshot.queue.into_iter().map(|t| t.uri));
        }
    }

    let playlist_name = match &result.kind {
        SearchKind::Playlist { name } => Some(name.clone()),
        _ => None,
    };
    let candidates: Vec<Track> = if playlist_name.is_some() {
        result.tracks
    } else {
        result.tracks.into_iter().take(1).collect()
    };

    let mut queue_len = data.music.queue_len(guild_id).await;
    let mut added: Vec<(Track, usize)> = Vec::new();
    let mut skipped = 0;
    let mut duplicate = None;

    for track in candidates {
        if queue_len >= settings.max_queue_size {
            if added.is_empty() && playlist_name.is_none() {
                return Err(MusicError::QueueFull(settings.max_queue_size));
            }
            skipped += 1;
            continue;
        }
        if !settings.allow_duplicates && !known_uris.insert(track.uri.clone()) {
            debug!("Skipping duplicate '{}' in guild {}", track.title, guild_id);
            skipped += 1;
            duplicate = Some(track);
            continue;
        }
        queue_len = data.music.enqueue(guild_id, track.clone()).await?;
        added.push((track, queue_len));
    }

    if !added.is_empty() {
        data.music.play(guild_id).await?;
        data.broadcaster.broadcast(guild_id).await;
    }

    let outcome = match (playlist_name, added.pop(), duplicate) {
        (Some(name), last, _) => QueueOutcome::Playlist {
            name,
            added: added.len() + usize::from(last.is_some()),
            skipped,
        },
        (None, Some((track, position)), _) => QueueOutcome::Track { track, position },
        (None, None, Some(track)) => QueueOutcome::Duplicate(track),
        (None, None, None) => QueueOutcome::NoResults,
    };
    info!("Queue request in guild {} resolved: {:?}", guild_id, outcome);
    Ok(outcome)
}

/// Play a song from a search phrase or a direct URL
#[poise::command(slash_command, guild_only, category = "Music")]
pub async fn play(
    ctx: Context<'_>,
    #[description = "URL or search query"] query: String,
) -> CommandResult {
    info!("Received play command with query: {}", query);
    let guild_id = require_guild(ctx)?;

    let voice_channel = match author_voice_channel(ctx, guild_id) {
        Ok(channel) => channel,
        Err(err) => return reply_error(ctx, err).await,
    };

    // Searching can take a few seconds
    ctx.defer().await?;

    let request = PlayRequest {
        guild_id,
        voice_channel,
        text_channel: ctx.channel_id(),
        query: query.clone(),
        requester: Requester::from(ctx.author()),
    };

    match queue_request(ctx.data(), request).await {
        Ok(QueueOutcome::Track { track, position }) => {
            reply(ctx, poise::CreateReply::default().embed(added_to_queue(&track, position))).await
        }
        Ok(QueueOutcome::Playlist { name, added, .. }) => {
            reply(ctx, poise::CreateReply::default().embed(playlist_added(&name, added))).await
        }
        Ok(QueueOutcome::Duplicate(track)) => {
            reply(
                ctx,
                error_reply(format!("**{}** is already in the queue", track.title)),
            )
            .await
        }
        Ok(QueueOutcome::NoResults) => {
            reply(ctx, error_reply(format!("No results found for `{}`", query))).await
        }
        Err(err) => reply_error(ctx, err).await,
    }
}
