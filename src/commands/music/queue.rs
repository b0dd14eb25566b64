use poise::CreateReply;

use super::utils::button_controls::queue_page_buttons;
use super::utils::embedded_messages::{QUEUE_PAGE_SIZE, music_queue, page_count};
use super::{reply, require_guild};
use crate::{CommandResult, Context};

/// Show the current music queue
#[poise::command(slash_command, guild_only, category = "Music")]
pub async fn queue(
    ctx: Context<'_>,
    #[description = "Page to show (starts at 1)"]
    #[min = 1]
    page: Option<usize>,
) -> CommandResult {
    let guild_id = require_guild(ctx)?;
    let snapshot = ctx.data().broadcaster.snapshot(guild_id).await;

    let total_pages = page_count(snapshot.queue.len(), QUEUE_PAGE_SIZE);
    let page = page.unwrap_or(1).clamp(1, total_pages) - 1;

    reply(
        ctx,
        CreateReply::default()
            .embed(music_queue(&snapshot, page))
            .components(queue_page_buttons(page, total_pages)),
    )
    .await
}
