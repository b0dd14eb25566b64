pub mod announce;
pub mod audio_sources;
pub mod autoplay;
pub mod favorites;
pub mod pause;
pub mod play;
pub mod queue;
pub mod request_channel;
pub mod requeue;
pub mod skip;
pub mod stop;
pub mod utils;
pub mod volume;

use poise::CreateReply;
use serenity::all::{ChannelId, GuildId};

use crate::{CommandResult, Context, Error};
use utils::embedded_messages::error_reply;
use utils::music_manager::{MusicError, user_voice_channel};

/// The guild the command was invoked in.
fn require_guild(ctx: Context<'_>) -> Result<GuildId, Error> {
    ctx.guild_id().ok_or_else(|| MusicError::NotInGuild.into())
}

/// The voice channel the invoking user is connected to.
fn author_voice_channel(ctx: Context<'_>, guild_id: GuildId) -> Result<ChannelId, MusicError> {
    user_voice_channel(&ctx.serenity_context().cache, guild_id, ctx.author().id)
}

/// Sends an ephemeral error built from `err` and ends the command successfully.
async fn reply_error(ctx: Context<'_>, err: impl std::fmt::Display) -> CommandResult {
    ctx.send(error_reply(err.to_string())).await?;
    Ok(())
}

/// Sends `reply` and ends the command.
async fn reply(ctx: Context<'_>, reply: CreateReply) -> CommandResult {
    ctx.send(reply).await?;
    Ok(())
}
