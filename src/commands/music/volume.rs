use super::utils::embedded_messages::success_reply;
use super::{reply, reply_error, require_guild};
use crate::{CommandResult, Context};

/// Set the playback volume
#[poise::command(slash_command, guild_only, category = "Music")]
pub async fn volume(
    ctx: Context<'_>,
    #[description = "Volume from 0 to 100"]
    #[min = 0]
    #[max = 100]
    level: u8,
) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let data = ctx.data();

    if let Err(err) = data.music.set_volume(guild_id, level).await {
        return reply_error(ctx, err).await;
    }
    data.broadcaster.broadcast(guild_id).await;

    reply(
        ctx,
        success_reply("🔊 Volume", format!("Volume set to **{}%**", level.min(100))),
    )
    .await
}
