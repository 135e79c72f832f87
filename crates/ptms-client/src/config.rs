//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero configuration
//! against a local development server.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use ptms_net::ReconnectPolicy;
use ptms_shared::constants::{
    DEFAULT_CACHE_FRESHNESS_HOURS, DEFAULT_HEARTBEAT_SECS, DEFAULT_RECONNECT_ATTEMPTS,
    DEFAULT_TYPING_IDLE_SECS,
};
use ptms_shared::endpoints::Endpoints;
use ptms_shared::PtmsResult;
use ptms_store::{AppSettings, Database};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API; the chat gateway URL is derived from it.
    /// Env: `PTMS_BASE_URL`
    /// Default: `http://localhost:8080/api`
    pub base_url: String,

    /// Location of the local cache database.
    /// Env: `PTMS_DB_PATH`
    /// Default: `None` (platform data directory).
    pub db_path: Option<PathBuf>,

    /// Maximum age of cached reference data before it is reported stale.
    /// Env: `PTMS_CACHE_FRESHNESS_HOURS`
    /// Default: `24`
    pub cache_freshness_hours: i64,

    /// Idle time after the last keystroke before "stopped typing" is sent.
    /// Env: `PTMS_TYPING_IDLE_SECS`
    /// Default: `3`
    pub typing_idle: Duration,

    /// Interval between chat heartbeat pings.
    /// Env: `PTMS_HEARTBEAT_SECS`
    /// Default: `25`
    pub heartbeat: Duration,

    /// Consecutive failed reconnects before the chat client gives up.
    /// Env: `PTMS_RECONNECT_ATTEMPTS`
    /// Default: `5`
    pub reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            db_path: None,
            cache_freshness_hours: DEFAULT_CACHE_FRESHNESS_HOURS,
            typing_idle: Duration::from_secs(DEFAULT_TYPING_IDLE_SECS),
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("PTMS_BASE_URL") {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }

        if let Some(path) = lookup("PTMS_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("PTMS_CACHE_FRESHNESS_HOURS") {
            match val.parse::<i64>() {
                Ok(hours) if hours > 0 => config.cache_freshness_hours = hours,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid PTMS_CACHE_FRESHNESS_HOURS, using default"
                ),
            }
        }

        if let Some(secs) = parse_secs(&lookup, "PTMS_TYPING_IDLE_SECS") {
            config.typing_idle = secs;
        }

        if let Some(secs) = parse_secs(&lookup, "PTMS_HEARTBEAT_SECS") {
            config.heartbeat = secs;
        }

        if let Some(val) = lookup("PTMS_RECONNECT_ATTEMPTS") {
            if let Ok(n) = val.parse::<u32>() {
                config.reconnect_attempts = n;
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    /// Apply persisted user settings on top of the environment.
    pub fn with_settings(mut self, settings: &AppSettings) -> Self {
        if !settings.base_url.trim().is_empty() {
            self.base_url = settings.base_url.clone();
        }
        self
    }

    /// Open the cache database and fold the persisted settings in.
    pub fn open_database(self) -> PtmsResult<(Self, Database)> {
        let db = Database::open(self.db_path.as_deref())?;
        let settings = db.load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring unreadable app settings");
            AppSettings::default()
        });
        Ok((self.with_settings(&settings), db))
    }

    pub fn endpoints(&self) -> PtmsResult<Endpoints> {
        Endpoints::from_base_url(&self.base_url)
    }

    pub fn cache_freshness(&self) -> ChronoDuration {
        ChronoDuration::hours(self.cache_freshness_hours)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            ..ReconnectPolicy::default()
        }
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let val = lookup(key)?;
    match val.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(key, value = %val, "Invalid duration, using default");
            None
        }
    }
}
