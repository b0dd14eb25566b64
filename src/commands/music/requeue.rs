use tracing::info;

use super::audio_sources::track_metadata::{Requester, Track};
use super::utils::embedded_messages::{error_reply, success_reply};
use super::utils::history_store::MusicStore;
use super::{author_voice_channel, reply, reply_error, require_guild};
use crate::{CommandResult, Context};

/// Restore the queue that was playing when the bot last left
#[poise::command(slash_command, guild_only, category = "Music")]
pub async fn requeue(ctx: Context<'_>) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let data = ctx.data();

    let voice_channel = match author_voice_channel(ctx, guild_id) {
        Ok(channel) => channel,
        Err(err) => return reply_error(ctx, err).await,
    };

    let key = guild_id.to_string();
    let saved = match data.db.run(move |db| db.last_queue(&key)).await {
        Ok(Some(saved)) if !saved.tracks.is_empty() => saved,
        Ok(_) => return reply(ctx, error_reply("There is no saved queue for this server")).await,
        Err(err) => return reply_error(ctx, err).await,
    };

    data.guild_state.cancel_disconnect(guild_id);
    let settings = match MusicStore::guild_settings(&data.db, guild_id).await {
        Ok(settings) => settings,
        Err(err) => return reply_error(ctx, err).await,
    };

    if let Err(err) = data
        .music
        .create_player(guild_id, voice_channel, ctx.channel_id(), data.config.default_volume)
        .await
    {
        return reply_error(ctx, err).await;
    }

    let requester = Requester::from(ctx.author());
    let room = settings
        .max_queue_size
        .saturating_sub(data.music.queue_len(guild_id).await);

    let mut restored = 0;
    for row in saved.tracks.iter().take(room) {
        let track = Track::from_saved(row, requester.clone());
        if let Err(err) = data.music.enqueue(guild_id, track).await {
            return reply_error(ctx, err).await;
        }
        restored += 1;
    }

    if restored > 0 {
        if let Err(err) = data.music.play(guild_id).await {
            return reply_error(ctx, err).await;
        }
        data.broadcaster.broadcast(guild_id).await;
    }

    info!(
        "Restored {} of {} saved tracks in guild {}",
        restored,
        saved.tracks.len(),
        guild_id
    );
    reply(
        ctx,
        success_reply(
            "🔁 Queue Restored",
            format!(
                "Restored **{}** tracks saved <t:{}:R>",
                restored,
                saved.saved_at.timestamp()
            ),
        ),
    )
    .await
}
