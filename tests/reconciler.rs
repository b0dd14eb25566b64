mod common;

use assert_matches::assert_matches;
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use beatbox::commands::music::audio_sources::track_metadata::Requester;
use beatbox::commands::music::audio_sources::{SearchKind, SearchResult};
use beatbox::commands::music::utils::event_handlers::{PlayerEvent, SideEffect};
use beatbox::commands::music::utils::guild_state::HISTORY_LIMIT;
use beatbox::commands::music::utils::history_store::ResolvedSettings;
use beatbox::commands::music::utils::music_manager::MusicError;
use beatbox::utils::database::{Database, SettingsUpdate};

use common::Harness;
use common::fixtures::{GUILD, OTHER_GUILD, TEXT_CHANNEL, alice, track, track_by};
use common::mocks::{
    MockAnnouncer, MockEmbeds, MockPlayer, MockSearch, MockStore, accepting_announcer,
    accepting_embeds, idle_player, unused_search,
};

fn disable_autoplay(db: &Database) {
    db.update_guild_settings(
        &GUILD.to_string(),
        &SettingsUpdate {
            auto_play: Some(false),
            ..Default::default()
        },
    )
    .unwrap();
}

fn started(title: &str, queue: &[&str]) -> PlayerEvent {
    PlayerEvent::TrackStarted {
        guild_id: GUILD,
        track: track(title),
        queue: queue.iter().map(|t| track(t)).collect(),
        text_channel: Some(TEXT_CHANNEL),
    }
}

#[tokio::test]
async fn two_tracks_then_empty_queue_then_destroy() {
    let mut announcer = MockAnnouncer::new();
    announcer
        .expect_announce()
        .withf(|channel, _| *channel == TEXT_CHANNEL)
        .times(2)
        .returning(|_, _| Ok(()));

    let harness = Harness::new(idle_player(), unused_search(), announcer, accepting_embeds());
    disable_autoplay(&harness.db);
    let guild_key = GUILD.to_string();

    harness.reconciler.handle(started("A", &["B"])).await;
    harness.reconciler.handle(started("B", &[])).await;
    harness
        .reconciler
        .handle(PlayerEvent::QueueEmpty { guild_id: GUILD })
        .await;

    assert_eq!(harness.state.previous_tracks(GUILD), vec![track("A")]);
    assert_eq!(harness.state.current_track(GUILD), Some(track("B")));

    let open = harness.db.open_sessions(&guild_key).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].tracks_played, 2);
    let session_id = open[0].id;
    assert_eq!(harness.state.active_session(GUILD), Some(session_id));

    let plays = harness.db.recent_track_plays(&guild_key, 10).unwrap();
    let titles: Vec<_> = plays.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["B", "A"]);
    assert_eq!(plays[0].username, "alice");

    harness
        .reconciler
        .handle(PlayerEvent::PlayerDestroyed { guild_id: GUILD })
        .await;

    let saved = harness.db.last_queue(&guild_key).unwrap().unwrap();
    assert_eq!(saved.tracks.len(), 1);
    assert_eq!(saved.tracks[0].title, "B");
    assert_eq!(saved.tracks[0].position, 0);
    assert!(saved.tracks[0].was_playing);

    let session = harness.db.session(session_id).unwrap().unwrap();
    assert!(session.ended_at.is_some());
    assert!(harness.db.open_sessions(&guild_key).unwrap().is_empty());
    assert_eq!(harness.state.active_session(GUILD), None);
    assert!(harness.failed_steps().is_empty());
}

#[tokio::test]
async fn autoplay_skips_the_finished_track_and_stays_silent() {
    let last = track("Last");
    let results = vec![track("One"), last.clone(), track("Two")];

    let mut search = MockSearch::new();
    search
        .expect_search()
        .withf(|query, requester| query.to_string() == "The Band Last" && requester.is_autoplay())
        .times(1)
        .returning(move |_, _| {
            Ok(SearchResult {
                kind: SearchKind::Search,
                tracks: results.clone(),
            })
        });

    let mut player = MockPlayer::new();
    player.expect_snapshot().returning(|_| None);
    player
        .expect_enqueue()
        .withf(|guild_id, track| {
            *guild_id == GUILD
                && track.requester.is_autoplay()
                && (track.title == "One" || track.title == "Two")
        })
        .times(1)
        .returning(|_, _| Ok(1));
    player.expect_play().with(eq(GUILD)).times(1).returning(|_| Ok(()));
    player.expect_disconnect().never();

    // Only the user-requested track is announced.
    let mut announcer = MockAnnouncer::new();
    announcer
        .expect_announce()
        .withf(|_, track| track.title == "Last")
        .times(1)
        .returning(|_, _| Ok(()));

    let harness = Harness::new(player, search, announcer, accepting_embeds());
    let guild_key = GUILD.to_string();

    harness.reconciler.handle(started("Last", &[])).await;
    harness
        .reconciler
        .handle(PlayerEvent::QueueEmpty { guild_id: GUILD })
        .await;

    // The engine would now start the autoplay pick.
    harness
        .reconciler
        .handle(PlayerEvent::TrackStarted {
            guild_id: GUILD,
            track: track_by("One", Requester::autoplay()),
            queue: Vec::new(),
            text_channel: Some(TEXT_CHANNEL),
        })
        .await;

    let plays = harness.db.recent_track_plays(&guild_key, 10).unwrap();
    assert_eq!(plays.len(), 2);
    assert_eq!(plays[0].user_id, Requester::AUTOPLAY_ID);

    let open = harness.db.open_sessions(&guild_key).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].tracks_played, 2);
    assert!(harness.failed_steps().is_empty());
}

#[tokio::test]
async fn autoplay_with_only_the_finished_track_enqueues_nothing() {
    let last = track("Solo");
    let mut search = MockSearch::new();
    search.expect_search().times(1).returning(move |_, _| {
        Ok(SearchResult {
            kind: SearchKind::Search,
            tracks: vec![last.clone()],
        })
    });

    let harness = Harness::new(idle_player(), search, accepting_announcer(), accepting_embeds());

    harness.reconciler.handle(started("Solo", &[])).await;
    harness
        .reconciler
        .handle(PlayerEvent::QueueEmpty { guild_id: GUILD })
        .await;

    assert!(harness.failed_steps().is_empty());
}

#[tokio::test]
async fn autoplay_search_failure_is_reported() {
    let mut search = MockSearch::new();
    search
        .expect_search()
        .returning(|_, _| Err(MusicError::AudioSourceError("yt-dlp missing".into())));

    let harness = Harness::new(idle_player(), search, accepting_announcer(), accepting_embeds());

    harness.reconciler.handle(started("A", &[])).await;
    harness
        .reconciler
        .handle(PlayerEvent::QueueEmpty { guild_id: GUILD })
        .await;

    assert_eq!(harness.failed_steps(), vec![SideEffect::Autoplay]);
}

#[tokio::test]
async fn history_keeps_only_the_most_recent_tracks() {
    let harness = Harness::new(
        idle_player(),
        unused_search(),
        accepting_announcer(),
        accepting_embeds(),
    );

    let total = HISTORY_LIMIT + 5;
    for n in 0..total {
        harness.reconciler.handle(started(&format!("t{n}"), &[])).await;
    }

    let history = harness.state.previous_tracks(GUILD);
    assert_eq!(history.len(), HISTORY_LIMIT);
    let expected: Vec<_> = (total - 1 - HISTORY_LIMIT..total - 1)
        .map(|n| track(&format!("t{n}")))
        .collect();
    assert_eq!(history, expected);

    let open = harness.db.open_sessions(&GUILD.to_string()).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].tracks_played, total as i64);
}

#[tokio::test]
async fn going_previous_does_not_push_history() {
    let harness = Harness::new(
        idle_player(),
        unused_search(),
        accepting_announcer(),
        accepting_embeds(),
    );

    harness.reconciler.handle(started("A", &[])).await;
    harness.reconciler.handle(started("B", &[])).await;
    harness.state.mark_going_previous(GUILD);
    harness.reconciler.handle(started("A", &[])).await;

    assert_eq!(harness.state.previous_tracks(GUILD), vec![track("A")]);
    assert!(!harness.state.is_going_previous(GUILD));
}

#[tokio::test]
async fn disabled_announcements_are_not_sent() {
    let mut announcer = MockAnnouncer::new();
    announcer.expect_announce().never();

    let harness = Harness::new(idle_player(), unused_search(), announcer, accepting_embeds());
    harness
        .db
        .update_guild_settings(
            &GUILD.to_string(),
            &SettingsUpdate {
                announce_now_playing: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    harness.reconciler.handle(started("A", &[])).await;

    assert_eq!(
        harness.db.recent_track_plays(&GUILD.to_string(), 5).unwrap().len(),
        1
    );
}

#[tokio::test]
async fn failing_side_effects_do_not_stop_later_steps() {
    let mut announcer = MockAnnouncer::new();
    announcer
        .expect_announce()
        .returning(|_, _| Err(MusicError::NotConnected));
    let mut embeds = MockEmbeds::new();
    embeds
        .expect_update_embed()
        .returning(|_, _, _| Err(MusicError::NothingPlaying));

    let harness = Harness::new(idle_player(), unused_search(), announcer, embeds);
    harness.reconciler.handle(started("A", &[])).await;

    assert_eq!(
        harness.failed_steps(),
        vec![SideEffect::RequestEmbed, SideEffect::Announcement]
    );
    assert_eq!(harness.state.current_track(GUILD), Some(track("A")));
    assert_eq!(
        harness.db.recent_track_plays(&GUILD.to_string(), 5).unwrap().len(),
        1
    );
    assert_eq!(harness.db.open_sessions(&GUILD.to_string()).unwrap().len(), 1);
}

#[tokio::test]
async fn failed_snapshot_save_still_closes_the_session() {
    let mut store = MockStore::new();
    store
        .expect_guild_settings()
        .returning(|_| Ok(ResolvedSettings::default()));
    store.expect_record_track_play().returning(|_| Ok(()));
    store.expect_open_session().times(1).returning(|_| Ok(7));
    store
        .expect_save_last_queue()
        .times(1)
        .returning(|_, _| Err(MusicError::NotConnected));
    store
        .expect_close_session()
        .with(eq(7))
        .times(1)
        .returning(|_| Ok(()));

    let db = Database::open_in_memory().unwrap();
    let harness = Harness::with_store(
        idle_player(),
        unused_search(),
        accepting_announcer(),
        accepting_embeds(),
        db,
        Arc::new(store),
    );

    harness.reconciler.handle(started("A", &["B"])).await;
    harness
        .reconciler
        .handle(PlayerEvent::PlayerDestroyed { guild_id: GUILD })
        .await;

    assert_eq!(harness.failed_steps(), vec![SideEffect::LastQueue]);
    assert_eq!(harness.state.last_queue(GUILD), None);
    assert_eq!(harness.state.active_session(GUILD), None);
}

#[tokio::test]
async fn second_destroy_keeps_the_saved_snapshot() {
    let harness = Harness::new(
        idle_player(),
        unused_search(),
        accepting_announcer(),
        accepting_embeds(),
    );
    let guild_key = GUILD.to_string();

    harness.reconciler.handle(started("A", &["B", "C"])).await;
    harness
        .reconciler
        .handle(PlayerEvent::PlayerDestroyed { guild_id: GUILD })
        .await;
    let first = harness.db.last_queue(&guild_key).unwrap().unwrap();

    harness
        .reconciler
        .handle(PlayerEvent::PlayerDestroyed { guild_id: GUILD })
        .await;
    let second = harness.db.last_queue(&guild_key).unwrap().unwrap();

    assert_eq!(first, second);
    let rows: Vec<_> = second
        .tracks
        .iter()
        .map(|t| (t.title.as_str(), t.position, t.was_playing))
        .collect();
    assert_eq!(rows, vec![("A", 0, true), ("B", 1, false), ("C", 2, false)]);
}

#[tokio::test]
async fn guilds_do_not_share_state() {
    let harness = Harness::new(
        idle_player(),
        unused_search(),
        accepting_announcer(),
        accepting_embeds(),
    );

    harness.reconciler.handle(started("A", &[])).await;
    harness
        .reconciler
        .handle(PlayerEvent::TrackStarted {
            guild_id: OTHER_GUILD,
            track: track_by("Elsewhere", alice()),
            queue: Vec::new(),
            text_channel: None,
        })
        .await;

    assert_eq!(harness.state.current_track(GUILD), Some(track("A")));
    assert_matches!(harness.state.current_track(OTHER_GUILD), Some(t) if t.title == "Elsewhere");
    assert_ne!(
        harness.state.active_session(GUILD),
        harness.state.active_session(OTHER_GUILD)
    );
}

#[tokio::test]
async fn spawned_reconciler_processes_events_in_order() {
    let harness = Harness::new(
        idle_player(),
        unused_search(),
        accepting_announcer(),
        accepting_embeds(),
    );
    let Harness {
        state,
        db,
        reconciler,
        ..
    } = harness;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let task = Arc::new(reconciler).spawn(rx);

    tx.send(started("A", &[])).unwrap();
    tx.send(started("B", &[])).unwrap();
    tx.send(PlayerEvent::PlayerDestroyed { guild_id: GUILD }).unwrap();
    drop(tx);
    task.await.unwrap();

    assert_eq!(state.previous_tracks(GUILD), vec![track("A")]);
    let saved = db.last_queue(&GUILD.to_string()).unwrap().unwrap();
    assert_eq!(saved.tracks[0].title, "B");
    assert!(db.open_sessions(&GUILD.to_string()).unwrap().is_empty());
}

#[tokio::test]
async fn failed_session_close_keeps_the_session_open_in_memory() {
    let mut store = MockStore::new();
    store
        .expect_guild_settings()
        .returning(|_| Ok(ResolvedSettings::default()));
    store.expect_record_track_play().returning(|_| Ok(()));
    store.expect_save_last_queue().returning(|_, _| Ok(()));
    store.expect_open_session().times(1).returning(|_| Ok(1));
    store
        .expect_increment_session()
        .with(eq(1))
        .times(1)
        .returning(|_| Ok(()));
    store
        .expect_close_session()
        .with(eq(1))
        .times(1)
        .returning(|_| Err(MusicError::NotConnected));

    let db = Database::open_in_memory().unwrap();
    let harness = Harness::with_store(
        idle_player(),
        unused_search(),
        accepting_announcer(),
        accepting_embeds(),
        db,
        Arc::new(store),
    );

    harness.reconciler.handle(started("A", &[])).await;
    harness
        .reconciler
        .handle(PlayerEvent::PlayerDestroyed { guild_id: GUILD })
        .await;

    assert_eq!(harness.failed_steps(), vec![SideEffect::SessionClose]);
    assert_eq!(harness.state.active_session(GUILD), Some(1));

    // Playback resumes in the same session rather than opening a second one.
    harness.reconciler.handle(started("B", &[])).await;
    assert_eq!(harness.state.active_session(GUILD), Some(1));
}

#[tokio::test]
async fn removed_guild_is_forgotten_after_its_session_closes() {
    let harness = Harness::new(
        idle_player(),
        unused_search(),
        accepting_announcer(),
        accepting_embeds(),
    );
    let guild_key = GUILD.to_string();

    harness.reconciler.handle(started("A", &[])).await;
    harness.reconciler.handle(started("B", &[])).await;
    harness
        .reconciler
        .handle(PlayerEvent::PlayerDestroyed { guild_id: GUILD })
        .await;
    harness
        .reconciler
        .handle(PlayerEvent::GuildRemoved { guild_id: GUILD })
        .await;

    assert_eq!(harness.state.current_track(GUILD), None);
    assert!(harness.state.previous_tracks(GUILD).is_empty());
    assert!(harness.db.open_sessions(&guild_key).unwrap().is_empty());
    assert!(harness.db.last_queue(&guild_key).unwrap().is_some());
}
