//! Runtime configuration, read from the environment (and `.env` via dotenv in `main`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::utils::database::DEFAULT_DB_PATH;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_path: PathBuf,
    /// Where the dashboard API listens. `None` disables it.
    pub dashboard_bind: Option<SocketAddr>,
    /// Bearer token required by the dashboard API, if set.
    pub dashboard_token: Option<String>,
    /// Volume (0-100) new players start at.
    pub default_volume: u8,
    /// How long an idle player stays connected. `None` keeps it forever.
    pub idle_disconnect: Option<Duration>,
    pub ytdlp_path: String,
    /// Number of search results fetched for free-text queries and autoplay.
    pub search_results: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let discord_token = get("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let dashboard_bind = match get("DASHBOARD_BIND").as_deref() {
            Some("off") | Some("none") => None,
            Some(raw) => Some(parse("DASHBOARD_BIND", raw)?),
            None => Some(SocketAddr::from(([127, 0, 0, 1], 3001))),
        };

        let default_volume = match get("DEFAULT_VOLUME") {
            Some(raw) => {
                let volume: u8 = parse("DEFAULT_VOLUME", &raw)?;
                if volume > 100 {
                    return Err(invalid("DEFAULT_VOLUME", &raw, "must be between 0 and 100"));
                }
                volume
            }
            None => 80,
        };

        let idle_disconnect = match get("IDLE_DISCONNECT_SECS") {
            Some(raw) => match parse::<u64>("IDLE_DISCONNECT_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => Some(Duration::from_secs(300)),
        };

        let search_results = match get("SEARCH_RESULTS") {
            Some(raw) => {
                let count: usize = parse("SEARCH_RESULTS", &raw)?;
                if !(1..=25).contains(&count) {
                    return Err(invalid("SEARCH_RESULTS", &raw, "must be between 1 and 25"));
                }
                count
            }
            None => 5,
        };

        Ok(Self {
            discord_token,
            database_path,
            dashboard_bind,
            dashboard_token: get("DASHBOARD_TOKEN"),
            default_volume,
            idle_disconnect,
            ytdlp_path: get("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            search_results,
        })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| invalid(key, raw, &e.to_string()))
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
