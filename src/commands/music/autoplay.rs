use crate::utils::database::SettingsUpdate;

use super::utils::embedded_messages::autoplay_status;
use super::utils::history_store::MusicStore;
use super::{reply, reply_error, require_guild};
use crate::{CommandResult, Context};

/// Toggle autoplay of related songs when the queue runs out
#[poise::command(slash_command, guild_only, category = "Music")]
pub async fn autoplay(
    ctx: Context<'_>,
    #[description = "Turn autoplay on or off (toggles when omitted)"] enabled: Option<bool>,
) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let db = &ctx.data().db;

    let enabled = match enabled {
        Some(enabled) => enabled,
        None => match MusicStore::guild_settings(db, guild_id).await {
            Ok(settings) => !settings.auto_play,
            Err(err) => return reply_error(ctx, err).await,
        },
    };

    let key = guild_id.to_string();
    let update = SettingsUpdate {
        auto_play: Some(enabled),
        ..Default::default()
    };
    if let Err(err) = db.run(move |db| db.update_guild_settings(&key, &update)).await {
        return reply_error(ctx, err).await;
    }

    reply(ctx, autoplay_status(enabled)).await
}
