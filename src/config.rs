//! Process configuration parsed from environment variables.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` calls [`AppConfig::from_env`] before opening any store connection
//! or binding the listener. The three store/secret settings are hard
//! requirements: there is no degraded-startup mode.
//!
//! TRADE-OFFS
//! ==========
//! The guest session secret has no rotation support. Changing it makes every
//! active guest hash to a new identity, so their staged history and usage are
//! orphaned until the reaper removes them.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_GUEST_DAILY_LIMIT: u32 = 10;
pub const DEFAULT_FREE_DAILY_LIMIT: u32 = 20;
pub const DEFAULT_FAST_GATE_LIMIT: u32 = 10;
pub const DEFAULT_FAST_GATE_UNKNOWN_LIMIT: u32 = 3;
pub const DEFAULT_FAST_GATE_WINDOW_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_FAST_GATE_TIMEOUT_MS: u64 = 50;
pub const DEFAULT_COUNTER_TIMEOUT_MS: u64 = 200;
pub const DEFAULT_GUEST_RETENTION_DAYS: u32 = 30;

/// Minimum accepted length of `GUEST_SESSION_SECRET`, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("GUEST_SESSION_SECRET must be at least 32 bytes")]
    WeakSecret,
    #[error("unsupported FAST_GATE_URL scheme: {0}")]
    FastGateScheme(String),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Per-tier daily quotas handed to the accurate counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    pub guest_daily: u32,
    pub free_daily: u32,
}

/// Fast gate tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastGateConfig {
    pub known_ip_limit: u32,
    pub unknown_ip_limit: u32,
    pub window: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub fast_gate_url: String,
    pub guest_session_secret: String,
    pub quotas: QuotaConfig,
    pub fast_gate: FastGateConfig,
    pub counter_timeout: Duration,
    pub guest_retention_days: u32,
    pub cookie_secure: bool,
    /// Bearer token guarding the reaper endpoint. Endpoint is disabled when `None`.
    pub cron_secret: Option<String>,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    /// - `FAST_GATE_URL`: `redis://`, `rediss://` or `memory://`
    /// - `GUEST_SESSION_SECRET`: at least 32 bytes
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a present
    /// variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let fast_gate_url = required("FAST_GATE_URL")?;
        validate_fast_gate_url(&fast_gate_url)?;
        let guest_session_secret = required("GUEST_SESSION_SECRET")?;
        if guest_session_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let quotas = QuotaConfig {
            guest_daily: env_parse("GUEST_DAILY_LIMIT", DEFAULT_GUEST_DAILY_LIMIT)?,
            free_daily: env_parse("FREE_DAILY_LIMIT", DEFAULT_FREE_DAILY_LIMIT)?,
        };
        let fast_gate = FastGateConfig {
            known_ip_limit: env_parse("FAST_GATE_LIMIT", DEFAULT_FAST_GATE_LIMIT)?,
            unknown_ip_limit: env_parse("FAST_GATE_UNKNOWN_LIMIT", DEFAULT_FAST_GATE_UNKNOWN_LIMIT)?,
            window: Duration::from_secs(env_parse("FAST_GATE_WINDOW_SECS", DEFAULT_FAST_GATE_WINDOW_SECS)?),
            timeout: Duration::from_millis(env_parse("FAST_GATE_TIMEOUT_MS", DEFAULT_FAST_GATE_TIMEOUT_MS)?),
        };

        Ok(Self {
            port: env_parse("PORT", DEFAULT_PORT)?,
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            fast_gate_url,
            guest_session_secret,
            quotas,
            fast_gate,
            counter_timeout: Duration::from_millis(env_parse("COUNTER_TIMEOUT_MS", DEFAULT_COUNTER_TIMEOUT_MS)?),
            guest_retention_days: env_parse("GUEST_RETENTION_DAYS", DEFAULT_GUEST_RETENTION_DAYS)?,
            cookie_secure: env_bool("COOKIE_SECURE").unwrap_or(false),
            cron_secret: std::env::var("CRON_SECRET").ok().filter(|v| !v.is_empty()),
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn validate_fast_gate_url(url: &str) -> Result<(), ConfigError> {
    let scheme = url.split("://").next().unwrap_or_default();
    match scheme {
        "redis" | "rediss" | "memory" if url.contains("://") => Ok(()),
        _ => Err(ConfigError::FastGateScheme(url.to_owned())),
    }
}

/// Parse an optional variable, falling back to `default` when unset.
/// A present but unparsable value is an error rather than a silent default.
fn env_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => {
            let parsed = raw.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::Invalid { key, value: raw })
        }
        Err(_) => Ok(default),
    }
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
