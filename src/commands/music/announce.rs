use crate::utils::database::SettingsUpdate;

use super::utils::embedded_messages::announce_status;
use super::utils::history_store::MusicStore;
use super::{reply, reply_error, require_guild};
use crate::{CommandResult, Context};

/// Toggle the "now playing" message posted when a track starts
#[poise::command(
    slash_command,
    guild_only,
    category = "Music",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn announce(
    ctx: Context<'_>,
    #[description = "Turn announcements on or off (toggles when omitted)"] enabled: Option<bool>,
) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let db = &ctx.data().db;

    let enabled = match enabled {
        Some(enabled) => enabled,
        None => match MusicStore::guild_settings(db, guild_id).await {
            Ok(settings) => !settings.announce_now_playing,
            Err(err) => return reply_error(ctx, err).await,
        },
    };

    let key = guild_id.to_string();
    let update = SettingsUpdate {
        announce_now_playing: Some(enabled),
        ..Default::default()
    };
    if let Err(err) = db.run(move |db| db.update_guild_settings(&key, &update)).await {
        return reply_error(ctx, err).await;
    }

    reply(ctx, announce_status(enabled)).await
}
