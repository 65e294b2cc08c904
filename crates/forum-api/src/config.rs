use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use tracing::warn;

/// Runtime configuration, read from `FORUM_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_ttl: TimeDelta,
    pub session_sweep_interval: Duration,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    pub cookie_secure: bool,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("forum.db"),
            session_ttl: TimeDelta::hours(24),
            session_sweep_interval: Duration::from_secs(30 * 60),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max_requests: 20,
            cookie_secure: false,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unparseable values fall back to
    /// the default with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let session_hours: i64 = parse_or(&lookup, "FORUM_SESSION_HOURS", 24);
        let session_ttl = match TimeDelta::try_hours(session_hours) {
            Some(ttl) if session_hours > 0 => ttl,
            _ => {
                warn!("FORUM_SESSION_HOURS out of range, using 24");
                defaults.session_ttl
            }
        };

        Self {
            host: lookup("FORUM_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "FORUM_PORT", defaults.port),
            db_path: lookup("FORUM_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            session_ttl,
            session_sweep_interval: secs_or(&lookup, "FORUM_SESSION_SWEEP_SECS", defaults.session_sweep_interval),
            rate_limit_window: secs_or(&lookup, "FORUM_RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window),
            rate_limit_max_requests: parse_or(
                &lookup,
                "FORUM_RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            ),
            cookie_secure: lookup("FORUM_COOKIE_SECURE").is_some_and(|v| v == "true"),
            request_timeout: secs_or(&lookup, "FORUM_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
        }
    }
}

/// A positive number of whole seconds. Zero falls back to the default.
fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default.as_secs()) {
        0 => {
            warn!("{} must be positive, using default {}", key, default.as_secs());
            default
        }
        secs => Duration::from_secs(secs),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, using default {}", raw, key, default);
            default
        }),
    }
}
