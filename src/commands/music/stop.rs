use tracing::info;

use super::utils::embedded_messages::success_reply;
use super::{reply, reply_error, require_guild};
use crate::{CommandResult, Context};

/// Stop the music, clear the queue and leave the voice channel
#[poise::command(slash_command, guild_only, category = "Music")]
pub async fn stop(ctx: Context<'_>) -> CommandResult {
    let guild_id = require_guild(ctx)?;

    // Saving the queue and closing the session happen when the destroy event lands.
    if let Err(err) = ctx.data().music.destroy(guild_id).await {
        return reply_error(ctx, err).await;
    }
    info!("Stopped playback in guild {} on request of {}", guild_id, ctx.author().name);

    reply(
        ctx,
        success_reply("🛑 Stopped", "Stopped playback and cleared the queue"),
    )
    .await
}
