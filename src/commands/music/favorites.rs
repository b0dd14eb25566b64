use poise::CreateReply;
use tracing::info;

use super::audio_sources::track_metadata::Requester;
use super::play::{PlayRequest, QueueOutcome, queue_request};
use super::utils::embedded_messages::{
    FAVORITES_PAGE_SIZE, added_to_queue, error_reply, favorites_page, page_count, success_reply,
};
use super::{author_voice_channel, reply, reply_error, require_guild};
use crate::utils::database::FavoriteOutcome;
use crate::{CommandResult, Context};

/// Save the currently playing track to your favorites
#[poise::command(slash_command, guild_only, category = "Music")]
pub async fn favorite(ctx: Context<'_>) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let data = ctx.data();

    let Some(track) = data.guild_state.current_track(guild_id) else {
        return reply_error(ctx, "Nothing is playing").await;
    };

    let user_id = ctx.author().id.to_string();
    let saved = track.clone();
    match data.db.run(move |db| db.add_favorite(&user_id, &saved)).await {
        Ok(FavoriteOutcome::Added(position)) => {
            info!("{} favorited '{}'", ctx.author().name, track.title);
            reply(
                ctx,
                success_reply(
                    "❤️ Added to Favorites",
                    format!("**{}** saved as #{}", track.title, position),
                ),
            )
            .await
        }
        Ok(FavoriteOutcome::AlreadyPresent) => {
            reply(
                ctx,
                error_reply(format!("**{}** is already in your favorites", track.title)),
            )
            .await
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Manage your favorite tracks
#[poise::command(
    slash_command,
    guild_only,
    category = "Music",
    subcommands("favorites_list", "favorites_play", "favorites_remove"),
    subcommand_required
)]
pub async fn favorites(_ctx: Context<'_>) -> CommandResult {
    Ok(())
}

/// List your favorite tracks
#[poise::command(slash_command, guild_only, rename = "list")]
pub async fn favorites_list(
    ctx: Context<'_>,
    #[description = "Page to show (starts at 1)"]
    #[min = 1]
    page: Option<usize>,
) -> CommandResult {
    let user_id = ctx.author().id.to_string();
    let favorites = match ctx.data().db.run(move |db| db.favorites(&user_id)).await {
        Ok(favorites) => favorites,
        Err(err) => return reply_error(ctx, err).await,
    };

    let pages = page_count(favorites.len(), FAVORITES_PAGE_SIZE);
    let page = page.unwrap_or(1).clamp(1, pages) - 1;
    reply(
        ctx,
        CreateReply::default()
            .embed(favorites_page(&favorites, page))
            .ephemeral(true),
    )
    .await
}

/// Queue one of your favorite tracks
#[poise::command(slash_command, guild_only, rename = "play")]
pub async fn favorites_play(
    ctx: Context<'_>,
    #[description = "Position in your favorites list"]
    #[min = 1]
    position: i64,
) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let data = ctx.data();

    let voice_channel = match author_voice_channel(ctx, guild_id) {
        Ok(channel) => channel,
        Err(err) => return reply_error(ctx, err).await,
    };

    let user_id = ctx.author().id.to_string();
    let favorites = match data.db.run(move |db| db.favorites(&user_id)).await {
        Ok(favorites) => favorites,
        Err(err) => return reply_error(ctx, err).await,
    };
    let Some(favorite) = favorites.into_iter().find(|f| f.position == position) else {
        return reply(ctx, error_reply(format!("You have no favorite #{}", position))).await;
    };

    ctx.defer().await?;
    let request = PlayRequest {
        guild_id,
        voice_channel,
        text_channel: ctx.channel_id(),
        query: favorite.uri.clone(),
        requester: Requester::from(ctx.author()),
    };
    match queue_request(data, request).await {
        Ok(QueueOutcome::Track { track, position }) => {
            reply(ctx, CreateReply::default().embed(added_to_queue(&track, position))).await
        }
        Ok(QueueOutcome::Duplicate(track)) => {
            reply(
                ctx,
                error_reply(format!("**{}** is already in the queue", track.title)),
            )
            .await
        }
        Ok(_) => {
            reply(
                ctx,
                error_reply(format!("**{}** could not be loaded", favorite.title)),
            )
            .await
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Remove a track from your favorites
#[poise::command(slash_command, guild_only, rename = "remove")]
pub async fn favorites_remove(
    ctx: Context<'_>,
    #[description = "Position in your favorites list"]
    #[min = 1]
    position: i64,
) -> CommandResult {
    let user_id = ctx.author().id.to_string();
    match ctx
        .data()
        .db
        .run(move |db| db.remove_favorite(&user_id, position))
        .await
    {
        Ok(Some(removed)) => {
            reply(
                ctx,
                success_reply(
                    "🗑️ Removed from Favorites",
                    format!("Removed **{}**", removed.title),
                )
                .ephemeral(true),
            )
            .await
        }
        Ok(None) => reply(ctx, error_reply(format!("You have no favorite #{}", position))).await,
        Err(err) => reply_error(ctx, err).await,
    }
}
