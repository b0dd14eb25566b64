use poise::CreateReply;
use serenity::all::{
    ChannelId, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage, EditMessage,
    GuildId, Http,
};
use serenity::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::commands::music::audio_sources::track_metadata::Track;
use crate::utils::database::FavoriteTrack;
use crate::utils::{format_duration, truncate};

use super::broadcaster::PlayerSnapshot;
use super::button_controls::player_buttons;
use super::history_store::MusicStore;
use super::music_manager::MusicResult;

const COLOR_OK: u32 = 0x00ff00;
const COLOR_ERROR: u32 = 0xff0000;
const COLOR_PLAYER: u32 = 0x5865f2;

/// Tracks shown per page of the queue embed.
pub const QUEUE_PAGE_SIZE: usize = 10;
/// Favorites shown per page of `/favorites list`.
pub const FAVORITES_PAGE_SIZE: usize = 20;

/// Posts the "now playing" message for a track.
#[async_trait]
pub trait NowPlayingAnnouncer: Send + Sync {
    async fn announce(&self, channel_id: ChannelId, track: &Track) -> MusicResult<()>;
}

/// Keeps the request-channel message in sync with the player.
#[async_trait]
pub trait RequestChannelEmbeds: Send + Sync {
    /// Rewrites the guild's request-channel message. No-op when the guild has none.
    async fn update_embed(
        &self,
        guild_id: GuildId,
        track: Option<Track>,
        paused: bool,
    ) -> MusicResult<()>;
}

/// Talks to Discord on behalf of the reconciler and the button handlers.
pub struct DiscordNotifier {
    http: Arc<Http>,
    store: Arc<dyn MusicStore>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>, store: Arc<dyn MusicStore>) -> Self {
        Self { http, store }
    }
}

#[async_trait]
impl NowPlayingAnnouncer for DiscordNotifier {
    async fn announce(&self, channel_id: ChannelId, track: &Track) -> MusicResult<()> {
        channel_id
            .send_message(&self.http, CreateMessage::new().embed(now_playing(track)))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RequestChannelEmbeds for DiscordNotifier {
    async fn update_embed(
        &self,
        guild_id: GuildId,
        track: Option<Track>,
        paused: bool,
    ) -> MusicResult<()> {
        let settings = self.store.guild_settings(guild_id).await?;
        let Some((channel_id, message_id)) = settings.request_channel else {
            return Ok(());
        };

        let edit = EditMessage::new()
            .embed(request_channel_embed(track.as_ref()))
            .components(player_buttons(paused));
        channel_id
            .edit_message(&self.http, message_id, edit)
            .await?;
        debug!("Updated request channel message for guild {}", guild_id);
        Ok(())
    }
}

fn duration_label(track: &Track) -> String {
    if track.duration_ms == 0 {
        "Live".to_string()
    } else {
        format_duration(track.duration())
    }
}

/// Create an embed for when a song is now playing
pub fn now_playing(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .author(CreateEmbedAuthor::new("Now Playing 🎵"))
        .title(truncate(&track.title, 60))
        .url(&track.uri)
        .description(format!(
            "by **{}** • `{}`",
            track.author,
            duration_label(track)
        ))
        .footer(CreateEmbedFooter::new(format!(
            "Requested by {}",
            track.requester.username
        )))
        .color(COLOR_OK);

    if let Some(artwork) = &track.artwork_url {
        embed = embed.thumbnail(artwork);
    }
    embed
}

/// The request-channel message: the current track, or usage instructions when idle.
/// Content depends only on the track.
pub fn request_channel_embed(track: Option<&Track>) -> CreateEmbed {
    let embed = CreateEmbed::new()
        .author(CreateEmbedAuthor::new("🎵 Song Request Channel"))
        .color(COLOR_PLAYER);

    match track {
        Some(track) => {
            let mut embed = embed
                .title(truncate(&track.title, 256))
                .url(&track.uri)
                .description(format!(
                    "by **{}** • `{}`\n\n**How to use:**\nSimply type a song name or URL in this channel to queue it!",
                    track.author,
                    duration_label(track)
                ))
                .footer(CreateEmbedFooter::new(format!(
                    "Requested by {}",
                    track.requester.username
                )));
            if let Some(artwork) = &track.artwork_url {
                embed = embed.thumbnail(artwork);
            }
            embed
        }
        None => embed
            .title("No track playing")
            .description(
                "**How to use:**\nType a song name or URL in this channel to start playing.\n\n\
                 Supported sources: YouTube, Spotify, SoundCloud, and more.\n\
                 Use the buttons below to control playback.",
            )
            .footer(CreateEmbedFooter::new(
                "Your messages will be automatically deleted",
            )),
    }
}

/// Create an embed for when a song is added to the queue
pub fn added_to_queue(track: &Track, position: usize) -> CreateEmbed {
    CreateEmbed::new()
        .title("🎵 Added to Queue")
        .description(format!("[{}]({})", truncate(&track.title, 100), track.uri))
        .field("Duration", format!("`{}`", duration_label(track)), true)
        .field("Position", format!("`#{}`", position), true)
        .color(COLOR_OK)
}

/// Create an embed for when a whole playlist is queued
pub fn playlist_added(name: &str, count: usize) -> CreateEmbed {
    CreateEmbed::new()
        .title("📋 Playlist Queued")
        .description(format!("Added **{}** tracks from **{}**", count, name))
        .color(COLOR_OK)
}

/// Number of pages needed to show `len` items `per_page` at a time (at least one).
pub fn page_count(len: usize, per_page: usize) -> usize {
    len.div_ceil(per_page.max(1)).max(1)
}

/// Create an embed for the music queue, showing zero-based `page`
pub fn music_queue(snapshot: &PlayerSnapshot, page: usize) -> CreateEmbed {
    let mut description = String::new();

    match &snapshot.current {
        Some(track) => {
            description.push_str(if snapshot.paused {
                "**⏸️ Paused**\n"
            } else {
                "**🎵 Now Playing**\n"
            });
            description.push_str(&format!(
                "**[{}]({})** `{}`\n\n",
                truncate(&track.title, 80),
                track.uri,
                duration_label(track)
            ));
        }
        None => description.push_str("**🔇 Nothing playing**\n\n"),
    }

    let pages = page_count(snapshot.queue.len(), QUEUE_PAGE_SIZE);
    let page = page.min(pages - 1);

    if snapshot.queue.is_empty() {
        description.push_str("**📭 Queue is empty**");
    } else {
        description.push_str(&format!(
            "**📋 Queue - {} tracks**\n",
            snapshot.queue.len()
        ));
        let start = page * QUEUE_PAGE_SIZE;
        for (index, track) in snapshot
            .queue
            .iter()
            .enumerate()
            .skip(start)
            .take(QUEUE_PAGE_SIZE)
        {
            description.push_str(&format!(
                "`{}.` [{}]({}) `{}`\n",
                index + 1,
                truncate(&track.title, 60),
                track.uri,
                duration_label(track)
            ));
        }

        let total: Duration = snapshot.queue.iter().map(Track::duration).sum();
        if total.as_secs() > 0 {
            description.push_str(&format!(
                "\n**⏱️ Total Duration:** `{}`",
                format_duration(total)
            ));
        }
    }

    CreateEmbed::new()
        .title("🎵 Music Queue")
        .description(description)
        .footer(CreateEmbedFooter::new(format!("Page {}/{}", page + 1, pages)))
        .color(COLOR_OK)
}

/// Create an embed listing one page of a user's favorites
pub fn favorites_page(favorites: &[FavoriteTrack], page: usize) -> CreateEmbed {
    let pages = page_count(favorites.len(), FAVORITES_PAGE_SIZE);
    let page = page.min(pages - 1);

    let description = if favorites.is_empty() {
        "You have no favorites yet. Use `/favorite` while a track is playing.".to_string()
    } else {
        favorites
            .iter()
            .skip(page * FAVORITES_PAGE_SIZE)
            .take(FAVORITES_PAGE_SIZE)
            .map(|fav| {
                format!(
                    "`{}.` [{}]({}) by {}",
                    fav.position,
                    truncate(&fav.title, 60),
                    fav.uri,
                    fav.author
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    CreateEmbed::new()
        .title("⭐ Favorites")
        .description(description)
        .footer(CreateEmbedFooter::new(format!(
            "Page {}/{} • {} tracks",
            page + 1,
            pages,
            favorites.len()
        )))
        .color(COLOR_OK)
}

/// A red error embed.
pub fn error_embed(message: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .title("❌ Error")
        .description(message)
        .color(COLOR_ERROR)
}

/// A green confirmation embed.
pub fn success_embed(title: impl Into<String>, message: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(message)
        .color(COLOR_OK)
}

/// Ephemeral error reply for slash commands.
pub fn error_reply(message: impl Into<String>) -> CreateReply {
    CreateReply::default()
        .embed(error_embed(message))
        .ephemeral(true)
}

pub fn success_reply(title: impl Into<String>, message: impl Into<String>) -> CreateReply {
    CreateReply::default().embed(success_embed(title, message))
}

/// Create an embed for when autoplay is enabled or disabled
pub fn autoplay_status(enabled: bool) -> CreateReply {
    CreateReply::default().embed(
        CreateEmbed::new()
            .title(if enabled {
                "🔄 Autoplay Enabled"
            } else {
                "⏹️ Autoplay Disabled"
            })
            .description(if enabled {
                "I will automatically play related songs when the queue is empty"
            } else {
                "I will stop playing when the queue is empty"
            })
            .color(if enabled { COLOR_OK } else { COLOR_ERROR }),
    )
}

/// Create an embed for when now-playing announcements are switched
pub fn announce_status(enabled: bool) -> CreateReply {
    CreateReply::default().embed(
        CreateEmbed::new()
            .title(if enabled {
                "📣 Announcements Enabled"
            } else {
                "🔕 Announcements Disabled"
            })
            .description(if enabled {
                "I will post a message whenever a new track starts"
            } else {
                "I will play tracks without announcing them"
            })
            .color(if enabled { COLOR_OK } else { COLOR_ERROR }),
    )
}
