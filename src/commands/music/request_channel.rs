use serenity::all::{ChannelId, ChannelType, CreateMessage, GuildId, MessageId};
use tracing::{info, warn};

use super::utils::button_controls::player_buttons;
use super::utils::embedded_messages::{error_reply, request_channel_embed, success_reply};
use super::utils::history_store::MusicStore;
use super::{reply, reply_error, require_guild};
use crate::{CommandResult, Context, Data};

/// Configure a song request channel
#[poise::command(
    slash_command,
    guild_only,
    category = "Music",
    rename = "requestchannel",
    required_permissions = "MANAGE_GUILD",
    subcommands("setup", "disable"),
    subcommand_required
)]
pub async fn request_channel(_ctx: Context<'_>) -> CommandResult {
    Ok(())
}

/// Removes the old request message, if the guild had one. Failures are only logged.
async fn delete_request_message(ctx: Context<'_>, guild_id: GuildId, target: (ChannelId, MessageId)) {
    let (channel_id, message_id) = target;
    if let Err(e) = ctx.http().delete_message(channel_id, message_id, None).await {
        warn!(
            "Could not delete request message in guild {}: {}",
            guild_id, e
        );
    }
}

/// Set this channel as the song request channel
#[poise::command(slash_command, guild_only)]
pub async fn setup(ctx: Context<'_>) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let data: &Data = ctx.data();

    let is_text = ctx
        .guild_channel()
        .await
        .is_some_and(|channel| channel.kind == ChannelType::Text);
    if !is_text {
        return reply(ctx, error_reply("This command can only be used in a text channel.")).await;
    }

    ctx.defer().await?;

    let settings = match MusicStore::guild_settings(&data.db, guild_id).await {
        Ok(settings) => settings,
        Err(err) => return reply_error(ctx, err).await,
    };
    if let Some(previous) = settings.request_channel {
        delete_request_message(ctx, guild_id, previous).await;
    }

    let current = data.guild_state.current_track(guild_id);
    let paused = data.music.is_paused(guild_id).await;
    let message = ctx
        .channel_id()
        .send_message(
            ctx.http(),
            CreateMessage::new()
                .embed(request_channel_embed(current.as_ref()))
                .components(player_buttons(paused)),
        )
        .await?;

    let (guild_key, channel_key, message_key) = (
        guild_id.to_string(),
        ctx.channel_id().to_string(),
        message.id.to_string(),
    );
    if let Err(err) = data
        .db
        .run(move |db| db.set_request_channel(&guild_key, &channel_key, &message_key))
        .await
    {
        return reply_error(ctx, err).await;
    }

    info!(
        "Request channel set to {} in guild {}",
        ctx.channel_id(),
        guild_id
    );
    reply(
        ctx,
        success_reply(
            "✅ Request Channel",
            format!(
                "Song request channel has been set up in <#{}>!\n\nUsers can now type song names or URLs here to add them to the queue.",
                ctx.channel_id()
            ),
        ),
    )
    .await
}

/// Disable the song request channel
#[poise::command(slash_command, guild_only)]
pub async fn disable(ctx: Context<'_>) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let data = ctx.data();

    let settings = match MusicStore::guild_settings(&data.db, guild_id).await {
        Ok(settings) => settings,
        Err(err) => return reply_error(ctx, err).await,
    };
    let Some(target) = settings.request_channel else {
        return reply(ctx, error_reply("No song request channel is currently configured.")).await;
    };

    delete_request_message(ctx, guild_id, target).await;

    let key = guild_id.to_string();
    if let Err(err) = data.db.run(move |db| db.clear_request_channel(&key)).await {
        return reply_error(ctx, err).await;
    }

    reply(
        ctx,
        success_reply("✅ Request Channel", "Song request channel has been disabled."),
    )
    .await
}
