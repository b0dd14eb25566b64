use serenity::all::{ClientBuilder, GatewayIntents, Http};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub mod commands;
pub mod config;
pub mod dashboard;
pub mod events;
pub mod utils;

use commands::music::audio_sources::TrackSearch;
use commands::music::audio_sources::youtube::YtDlpSearch;
use commands::music::utils::broadcaster::StateBroadcaster;
use commands::music::utils::embedded_messages::DiscordNotifier;
use commands::music::utils::event_handlers::PlayerEventReconciler;
use commands::music::utils::guild_state::GuildStateStore;
use commands::music::utils::music_manager::MusicManager;
use config::Config;
use dashboard::DashboardState;
use utils::database::Database;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type CommandResult = Result<(), Error>;

/// Shared by every command invocation, the gateway event handler and the dashboard.
#[derive(Clone)]
pub struct Data {
    pub config: Arc<Config>,
    pub db: Database,
    pub music: Arc<MusicManager>,
    pub guild_state: Arc<GuildStateStore>,
    pub broadcaster: Arc<StateBroadcaster>,
    pub notifier: Arc<DiscordNotifier>,
    pub search: Arc<dyn TrackSearch>,
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start the bot: {}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {}", ctx.command().name, error);
            let reply = commands::music::utils::embedded_messages::error_reply(
                "Something went wrong while running that command.",
            );
            if let Err(e) = ctx.send(reply).await {
                warn!("Failed to report command error: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Wires the bot together and runs it until the gateway connection ends or Ctrl-C.
pub async fn run(config: Config) -> Result<(), Error> {
    let db = Database::open(&config.database_path)?;
    let stale = db.close_stale_sessions()?;
    if stale > 0 {
        info!("Closed {} listening sessions left open by a previous run", stale);
    }

    let songbird = Songbird::serenity();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let music = MusicManager::new(Arc::clone(&songbird), reqwest::Client::new(), events_tx);

    let guild_state = Arc::new(GuildStateStore::new());
    let broadcaster = Arc::new(StateBroadcaster::new(
        music.clone(),
        StateBroadcaster::DEFAULT_CAPACITY,
    ));
    let search: Arc<dyn TrackSearch> = Arc::new(YtDlpSearch::new(
        config.ytdlp_path.clone(),
        config.search_results,
    ));
    let notifier = Arc::new(DiscordNotifier::new(
        Arc::new(Http::new(&config.discord_token)),
        Arc::new(db.clone()),
    ));

    let mut reconciler = PlayerEventReconciler::new(
        Arc::clone(&guild_state),
        Arc::new(db.clone()),
        Arc::clone(&search),
        music.clone(),
        Arc::clone(&broadcaster),
        notifier.clone(),
        notifier.clone(),
    );
    if let Some(timeout) = config.idle_disconnect {
        reconciler = reconciler.with_idle_disconnect(timeout);
    }
    Arc::new(reconciler).spawn(events_rx);

    if let Some(bind) = config.dashboard_bind {
        let state = DashboardState::new(
            db.clone(),
            Arc::clone(&broadcaster),
            config.dashboard_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve(bind, state).await {
                error!("Dashboard API stopped: {}", e);
            }
        });
    }

    let data = Data {
        config: Arc::new(config.clone()),
        db,
        music,
        guild_state,
        broadcaster,
        notifier,
        search,
    };

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES;

    let framework_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("!".into()),
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(framework_data)
            })
        })
        .build();

    let mut client = ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .event_handler(events::Handler { data })
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.map_err(Into::into)
}
