use poise::CreateReply;
use serenity::all::CreateEmbed;
use tracing::warn;

use super::utils::embedded_messages::RequestChannelEmbeds;
use super::{reply, reply_error, require_guild};
use crate::{CommandResult, Context};

/// Pause or resume the current track
#[poise::command(slash_command, guild_only, category = "Music")]
pub async fn pause(ctx: Context<'_>) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let data = ctx.data();

    let paused = match data.music.toggle_pause(guild_id).await {
        Ok(paused) => paused,
        Err(err) => return reply_error(ctx, err).await,
    };

    let current = data.guild_state.current_track(guild_id);
    if let Err(e) = data
        .notifier
        .update_embed(guild_id, current.clone(), paused)
        .await
    {
        warn!("Failed to refresh request channel in guild {}: {}", guild_id, e);
    }
    data.broadcaster.broadcast(guild_id).await;

    let title = current.map(|t| t.title).unwrap_or_default();
    let embed = if paused {
        CreateEmbed::new()
            .title("⏸️ Paused")
            .description(format!("Paused **{}**", title))
    } else {
        CreateEmbed::new()
            .title("▶️ Resumed")
            .description(format!("Resumed **{}**", title))
    };
    reply(ctx, CreateReply::default().embed(embed.color(0x00ff00))).await
}
