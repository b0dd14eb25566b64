use poise::serenity_prelude::Context;
use serenity::all::{
    ComponentInteraction, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseMessage, GuildId,
};
use tracing::{debug, error, info, warn};

use super::button_controls::{PLAYER_PREFIX, PlayerButton, parse_queue_page, queue_page_buttons};
use super::embedded_messages::{
    QUEUE_PAGE_SIZE, RequestChannelEmbeds, error_embed, music_queue, page_count, success_embed,
};
use crate::{Data, Error};

type ButtonInteractionResult = Result<(), Error>;

/// Handle a button interaction. Buttons this bot does not own are ignored.
pub async fn handle_interaction(
    ctx: &Context,
    data: &Data,
    interaction: &ComponentInteraction,
) -> ButtonInteractionResult {
    let custom_id = interaction.data.custom_id.as_str();
    let Some(guild_id) = interaction.guild_id else {
        return Ok(());
    };

    if let Some(button) = PlayerButton::parse(custom_id) {
        return handle_player_button(ctx, data, interaction, guild_id, button).await;
    }
    if let Some(page) = parse_queue_page(custom_id) {
        return handle_queue_page(ctx, data, interaction, guild_id, page).await;
    }
    if custom_id.starts_with(PLAYER_PREFIX) {
        error!("Unknown button ID: {}", custom_id);
        return respond(ctx, interaction, error_embed("Unknown button action.")).await;
    }

    debug!("Ignoring component {}", custom_id);
    Ok(())
}

/// Ephemeral reply to the user who pressed the button.
async fn respond(
    ctx: &Context,
    interaction: &ComponentInteraction,
    embed: CreateEmbed,
) -> ButtonInteractionResult {
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn handle_player_button(
    ctx: &Context,
    data: &Data,
    interaction: &ComponentInteraction,
    guild_id: GuildId,
    button: PlayerButton,
) -> ButtonInteractionResult {
    if !data.music.is_active(guild_id).await {
        return respond(ctx, interaction, error_embed("Nothing is playing right now.")).await;
    }

    info!(
        "{} pressed {:?} in guild {}",
        interaction.user.name, button, guild_id
    );

    let outcome = match button {
        PlayerButton::Pause | PlayerButton::Resume => {
            let paused = button == PlayerButton::Pause;
            match data.music.set_paused(guild_id, paused).await {
                Ok(_) => {
                    let current = data.guild_state.current_track(guild_id);
                    if let Err(e) = data.notifier.update_embed(guild_id, current, paused).await {
                        warn!("Failed to refresh request channel in guild {}: {}", guild_id, e);
                    }
                    Ok(success_embed(
                        "Player",
                        if paused {
                            "⏸️ Paused the player."
                        } else {
                            "▶️ Resumed the player."
                        },
                    ))
                }
                Err(e) => Err(e),
            }
        }
        PlayerButton::Skip => data
            .music
            .skip(guild_id)
            .await
            .map(|_| success_embed("Player", "⏭️ Skipped the current track.")),
        PlayerButton::Stop => data
            .music
            .destroy(guild_id)
            .await
            .map(|_| success_embed("Player", "🛑 Stopped the player and cleared the queue.")),
        PlayerButton::Previous => data
            .music
            .seek_to_start(guild_id)
            .await
            .map(|_| success_embed("Player", "⏪ Restarted the current track.")),
        PlayerButton::Queue => {
            let len = data.music.queue_len(guild_id).await;
            Ok(success_embed(
                "Queue",
                format!("📋 **Queue:** {} track{}", len, if len == 1 { "" } else { "s" }),
            ))
        }
    };

    let embed = match outcome {
        Ok(embed) => embed,
        Err(e) => error_embed(e.to_string()),
    };
    respond(ctx, interaction, embed).await?;

    data.broadcaster.broadcast(guild_id).await;
    Ok(())
}

async fn handle_queue_page(
    ctx: &Context,
    data: &Data,
    interaction: &ComponentInteraction,
    guild_id: GuildId,
    page: usize,
) -> ButtonInteractionResult {
    let snapshot = data.broadcaster.snapshot(guild_id).await;

    let update = if snapshot.current.is_none() && snapshot.queue.is_empty() {
        CreateInteractionResponseMessage::new()
            .embed(error_embed("Nothing is playing right now."))
            .components(Vec::new())
    } else {
        let total_pages = page_count(snapshot.queue.len(), QUEUE_PAGE_SIZE);
        let page = page.min(total_pages - 1);
        CreateInteractionResponseMessage::new()
            .embed(music_queue(&snapshot, page))
            .components(queue_page_buttons(page, total_pages))
    };

    interaction
        .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(update))
        .await?;
    Ok(())
}
