use poise::CreateReply;
use serenity::all::CreateEmbed;
use tracing::info;

use super::utils::music_manager::listeners_in_channel;
use super::{author_voice_channel, reply, reply_error, require_guild};
use crate::{CommandResult, Context};

/// Votes needed to skip with `listeners` people in the channel.
/// One or two listeners skip immediately; larger groups need a majority.
pub fn required_skip_votes(listeners: usize) -> usize {
    if listeners <= 2 {
        1
    } else {
        listeners.div_ceil(2)
    }
}

/// Skip the currently playing song (vote-based when others are listening)
#[poise::command(slash_command, guild_only, category = "Music")]
pub async fn skip(ctx: Context<'_>) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let data = ctx.data();

    let voice_channel = match author_voice_channel(ctx, guild_id) {
        Ok(channel) => channel,
        Err(err) => return reply_error(ctx, err).await,
    };

    let Some(current) = data.guild_state.current_track(guild_id) else {
        return reply_error(ctx, "Nothing is playing").await;
    };

    let listeners = listeners_in_channel(&ctx.serenity_context().cache, guild_id, voice_channel);
    let required = required_skip_votes(listeners);
    let votes = data.guild_state.add_skip_vote(guild_id, ctx.author().id);

    if votes < required {
        return reply(
            ctx,
            CreateReply::default().embed(
                CreateEmbed::new()
                    .title("🗳️ Vote to skip")
                    .description(format!(
                        "{}/{} votes to skip **{}**",
                        votes, required, current.title
                    ))
                    .color(0xffa500),
            ),
        )
        .await;
    }

    match data.music.skip(guild_id).await {
        Ok(track) => {
            data.guild_state.clear_skip_votes(guild_id);
            info!("Skipped '{}' in guild {}", track.title, guild_id);
            reply(
                ctx,
                CreateReply::default().embed(
                    CreateEmbed::new()
                        .title("⏭️ Skipped Track")
                        .description(format!("Skipped **{}**", track.title))
                        .color(0x00ff00),
                ),
            )
            .await
        }
        Err(err) => reply_error(ctx, err).await,
    }
}
