use serenity::all::{
    ChannelId, CreateMessage, Guild, Http, Message, MessageId, Ready, UnavailableGuild,
};
use serenity::async_trait;
use serenity::model::application::Interaction;
use serenity::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::Data;
use crate::commands::music::audio_sources::track_metadata::Requester;
use crate::commands::music::play::{PlayRequest, QueueOutcome, queue_request};
use crate::commands::music::utils::component_handlers;
use crate::commands::music::utils::history_store::MusicStore;
use crate::commands::music::utils::music_manager::user_voice_channel;

/// How long a request stays visible in the request channel.
const REQUEST_DELETE_DELAY: Duration = Duration::from_secs(3);
/// How long the bot's reply to a request stays visible.
const REPLY_DELETE_DELAY: Duration = Duration::from_secs(5);

/// Gateway events the poise framework does not cover: request-channel messages and buttons.
pub struct Handler {
    pub data: Data,
}

#[async_trait]
impl serenity::prelude::EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected", ready.user.name);
    }

    async fn message(&self, ctx: Context, message: Message) {
        if let Err(e) = self.request_channel_message(&ctx, &message).await {
            error!("Error handling request channel message: {}", e);
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // An outage also reports the guild as deleted; only an actual removal clears state.
        if incomplete.unavailable {
            return;
        }
        info!("Removed from guild {}", incomplete.id);
        self.data.music.forget_guild(incomplete.id).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component) = interaction {
            if let Err(e) =
                component_handlers::handle_interaction(&ctx, &self.data, &component).await
            {
                error!("Error handling component interaction: {}", e);
            }
        }
    }
}

impl Handler {
    /// Treats any message in a guild's request channel as a `/play` query.
    async fn request_channel_message(
        &self,
        ctx: &Context,
        message: &Message,
    ) -> Result<(), crate::Error> {
        if message.author.bot {
            return Ok(());
        }
        let Some(guild_id) = message.guild_id else {
            return Ok(());
        };

        let settings = MusicStore::guild_settings(&self.data.db, guild_id).await?;
        let Some((request_channel, _)) = settings.request_channel else {
            return Ok(());
        };
        if message.channel_id != request_channel {
            return Ok(());
        }

        let query = message.content.trim();
        if query.is_empty() {
            delete_later(ctx.http.clone(), message.channel_id, message.id, Duration::ZERO);
            return Ok(());
        }
        delete_later(
            ctx.http.clone(),
            message.channel_id,
            message.id,
            REQUEST_DELETE_DELAY,
        );

        let mention = format!("<@{}>", message.author.id);
        let voice_channel = match user_voice_channel(&ctx.cache, guild_id, message.author.id) {
            Ok(channel) => channel,
            Err(_) => {
                let text = format!("{mention}, you need to be in a voice channel to request songs!");
                return self.reply_briefly(ctx, message.channel_id, text).await;
            }
        };

        debug!("Request channel query in guild {}: {}", guild_id, query);
        let request = PlayRequest {
            guild_id,
            voice_channel,
            text_channel: message.channel_id,
            query: query.to_string(),
            requester: Requester::from(&message.author),
        };

        let text = match queue_request(&self.data, request).await {
            Ok(outcome) => request_confirmation(&mention, &outcome),
            Err(e) => {
                warn!("Request channel query failed in guild {}: {}", guild_id, e);
                format!("{mention}, failed to add that track to the queue: {e}")
            }
        };
        self.reply_briefly(ctx, message.channel_id, text).await
    }

    /// Posts `text` and removes it again after a few seconds.
    async fn reply_briefly(
        &self,
        ctx: &Context,
        channel_id: ChannelId,
        text: String,
    ) -> Result<(), crate::Error> {
        let reply = channel_id
            .send_message(&ctx.http, CreateMessage::new().content(text))
            .await?;
        delete_later(ctx.http.clone(), channel_id, reply.id, REPLY_DELETE_DELAY);
        Ok(())
    }
}

/// The text posted back into the request channel for a queue outcome.
pub fn request_confirmation(mention: &str, outcome: &QueueOutcome) -> String {
    match outcome {
        QueueOutcome::Track { track, .. } => format!(
            "{mention}, added **{}** by **{}** to the queue!",
            track.title, track.author
        ),
        QueueOutcome::Playlist { name, added, .. } => {
            format!("{mention}, added **{name}** ({added} tracks) to the queue!")
        }
        QueueOutcome::Duplicate(track) => {
            format!("{mention}, **{}** is already in the queue.", track.title)
        }
        QueueOutcome::NoResults => format!("{mention}, no results found for your search."),
    }
}

fn delete_later(http: Arc<Http>, channel_id: ChannelId, message_id: MessageId, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = http.delete_message(channel_id, message_id, None).await {
            debug!("Could not delete message {}: {}", message_id, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::music::audio_sources::track_metadata::Track;
    use pretty_assertions::assert_eq;

    fn track() -> Track {
        Track {
            title: "Song".to_string(),
            author: "Band".to_string(),
            uri: "https://example.com/song".to_string(),
            duration_ms: 1000,
            artwork_url: None,
            source_name: "youtube".to_string(),
            requester: Requester::new("1", "alice"),
        }
    }

    #[test]
    fn confirms_single_tracks_with_author() {
        let outcome = QueueOutcome::Track {
            track: track(),
            position: 3,
        };
        assert_eq!(
            request_confirmation("<@1>", &outcome),
            "<@1>, added **Song** by **Band** to the queue!"
        );
    }

    #[test]
    fn confirms_playlists_with_count() {
        let outcome = QueueOutcome::Playlist {
            name: "Mix".to_string(),
            added: 12,
            skipped: 0,
        };
        assert_eq!(
            request_confirmation("<@1>", &outcome),
            "<@1>, added **Mix** (12 tracks) to the queue!"
        );
    }

    #[test]
    fn reports_missing_results() {
        assert_eq!(
            request_confirmation("<@1>", &QueueOutcome::NoResults),
            "<@1>, no results found for your search."
        );
    }
}
