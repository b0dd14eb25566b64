//! mockall doubles for the seams the reconciler talks through.

use async_trait::async_trait;
use mockall::mock;
use serenity::all::{ChannelId, GuildId};

use beatbox::commands::music::audio_sources::track_metadata::{Requester, Track};
use beatbox::commands::music::audio_sources::{SearchResult, TrackSearch};
use beatbox::commands::music::utils::broadcaster::PlayerSnapshot;
use beatbox::commands::music::utils::embedded_messages::{NowPlayingAnnouncer, RequestChannelEmbeds};
use beatbox::commands::music::utils::history_store::{MusicStore, ResolvedSettings};
use beatbox::commands::music::utils::music_manager::{MusicResult, PlayerControl};
use beatbox::utils::database::{LastQueueTrack, TrackPlayEntry};

mock! {
    pub Search {}

    #[async_trait]
    impl TrackSearch for Search {
        async fn search(&self, query: &str, requester: &Requester) -> MusicResult<SearchResult>;
    }
}

mock! {
    pub Player {}

    #[async_trait]
    impl PlayerControl for Player {
        async fn snapshot(&self, guild_id: GuildId) -> Option<PlayerSnapshot>;
        async fn enqueue(&self, guild_id: GuildId, track: Track) -> MusicResult<usize>;
        async fn play(&self, guild_id: GuildId) -> MusicResult<()>;
        async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()>;
    }
}

mock! {
    pub Announcer {}

    #[async_trait]
    impl NowPlayingAnnouncer for Announcer {
        async fn announce(&self, channel_id: ChannelId, track: &Track) -> MusicResult<()>;
    }
}

mock! {
    pub Embeds {}

    #[async_trait]
    impl RequestChannelEmbeds for Embeds {
        async fn update_embed(
            &self,
            guild_id: GuildId,
            track: Option<Track>,
            paused: bool,
        ) -> MusicResult<()>;
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl MusicStore for Store {
        async fn guild_settings(&self, guild_id: GuildId) -> MusicResult<ResolvedSettings>;
        async fn record_track_play(&self, entry: TrackPlayEntry) -> MusicResult<()>;
        async fn open_session(&self, guild_id: GuildId) -> MusicResult<i64>;
        async fn increment_session(&self, session_id: i64) -> MusicResult<()>;
        async fn close_session(&self, session_id: i64) -> MusicResult<()>;
        async fn save_last_queue(
            &self,
            guild_id: GuildId,
            tracks: Vec<LastQueueTrack>,
        ) -> MusicResult<()>;
    }
}

/// A player nobody is expected to drive; snapshots report no player.
pub fn idle_player() -> MockPlayer {
    let mut player = MockPlayer::new();
    player.expect_snapshot().returning(|_| None);
    player.expect_enqueue().never();
    player.expect_play().never();
    player.expect_disconnect().never();
    player
}

/// A search that must not be consulted.
pub fn unused_search() -> MockSearch {
    let mut search = MockSearch::new();
    search.expect_search().never();
    search
}

/// Accepts every embed update.
pub fn accepting_embeds() -> MockEmbeds {
    let mut embeds = MockEmbeds::new();
    embeds.expect_update_embed().returning(|_, _, _| Ok(()));
    embeds
}

/// Accepts every announcement.
pub fn accepting_announcer() -> MockAnnouncer {
    let mut announcer = MockAnnouncer::new();
    announcer.expect_announce().returning(|_, _| Ok(()));
    announcer
}
