//! Sample guilds, channels and tracks used across the integration tests.

use serenity::all::{ChannelId, GuildId};

use beatbox::commands::music::audio_sources::track_metadata::{Requester, Track};

pub const GUILD: GuildId = GuildId::new(1001);
pub const OTHER_GUILD: GuildId = GuildId::new(2002);
pub const TEXT_CHANNEL: ChannelId = ChannelId::new(555);

pub fn alice() -> Requester {
    Requester::new("42", "alice")
}

/// A three-minute track whose uri is derived from `title`.
pub fn track(title: &str) -> Track {
    track_by(title, alice())
}

pub fn track_by(title: &str, requester: Requester) -> Track {
    Track {
        title: title.to_string(),
        author: "The Band".to_string(),
        uri: format!("https://www.youtube.com/watch?v={}", title.replace(' ', "_")),
        duration_ms: 180_000,
        artwork_url: None,
        source_name: "youtube".to_string(),
        requester,
    }
}
