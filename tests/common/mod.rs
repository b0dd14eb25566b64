//! Shared fixtures, mocks and wiring for the integration tests.
#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

use serenity::all::GuildId;
use std::sync::{Arc, Mutex, Once};

use beatbox::commands::music::utils::broadcaster::StateBroadcaster;
use beatbox::commands::music::utils::event_handlers::{PlayerEventReconciler, SideEffect};
use beatbox::commands::music::utils::guild_state::GuildStateStore;
use beatbox::commands::music::utils::history_store::MusicStore;
use beatbox::utils::database::Database;

use mocks::{MockAnnouncer, MockEmbeds, MockPlayer, MockSearch};

static INIT: Once = Once::new();

/// Route tracing output to the test writer once per test binary.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("beatbox=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Side-effect failures seen by the reconciler, in order.
pub type Failures = Arc<Mutex<Vec<(GuildId, SideEffect, String)>>>;

/// A reconciler wired to an in-memory database and the given mocks.
pub struct Harness {
    pub state: Arc<GuildStateStore>,
    pub db: Database,
    pub broadcaster: Arc<StateBroadcaster>,
    pub reconciler: PlayerEventReconciler,
    pub failures: Failures,
}

impl Harness {
    pub fn new(player: MockPlayer, search: MockSearch, announcer: MockAnnouncer, embeds: MockEmbeds) -> Self {
        let db = Database::open_in_memory().expect("in-memory database");
        Self::with_store(player, search, announcer, embeds, db.clone(), Arc::new(db))
    }

    /// Like `new`, but the reconciler talks to `store` instead of the database.
    pub fn with_store(
        player: MockPlayer,
        search: MockSearch,
        announcer: MockAnnouncer,
        embeds: MockEmbeds,
        db: Database,
        store: Arc<dyn MusicStore>,
    ) -> Self {
        init_tracing();
        let state = Arc::new(GuildStateStore::new());
        let player = Arc::new(player);
        let broadcaster = Arc::new(StateBroadcaster::new(
            player.clone(),
            StateBroadcaster::DEFAULT_CAPACITY,
        ));
        let failures: Failures = Arc::default();
        let sink = Arc::clone(&failures);

        let reconciler = PlayerEventReconciler::new(
            Arc::clone(&state),
            store,
            Arc::new(search),
            player,
            Arc::clone(&broadcaster),
            Arc::new(announcer),
            Arc::new(embeds),
        )
        .with_failure_observer(Arc::new(move |guild_id, step, err| {
            sink.lock()
                .expect("failure log")
                .push((guild_id, step, err.to_string()));
        }));

        Self {
            state,
            db,
            broadcaster,
            reconciler,
            failures,
        }
    }

    pub fn failed_steps(&self) -> Vec<SideEffect> {
        self.failures
            .lock()
            .expect("failure log")
            .iter()
            .map(|(_, step, _)| *step)
            .collect()
    }
}
