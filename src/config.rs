//! Configuration Module
//!
//! Handles loading and managing server and field-default configuration from
//! environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::field::FieldDefaults;
use crate::transport::DispatchOptions;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default `expires_after` in seconds for fields that don't set one
    pub default_expiration: u64,
    /// Whether `flag_as_stale` dispatches a recalculation by default
    pub eager_recalculation: bool,
    /// Default `use_timezone` for fields that don't set one
    pub use_timezone: bool,
    /// Default dispatch countdown in seconds, if any
    pub countdown: Option<u64>,
    /// HTTP server port
    pub server_port: u16,
    /// Number of worker tasks consuming recalculation jobs
    pub worker_concurrency: usize,
    /// Stuck-claim reaper interval in seconds
    pub reaper_interval: u64,
    /// Age in seconds after which a recalculation claim counts as stuck (0 = never)
    pub stuck_flag_timeout: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHED_FIELD_DEFAULT_EXPIRATION` - Default expiration in seconds (default: 3600)
    /// - `CACHED_FIELD_EAGER_RECALCULATION` - Recalculate when flagged stale (default: true)
    /// - `CACHED_FIELD_USE_TZ` - Timezone-aware expirations (default: true)
    /// - `CACHED_FIELD_COUNTDOWN` - Delay before a job is delivered, seconds (default: none)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `WORKER_CONCURRENCY` - Worker tasks (default: 4)
    /// - `REAPER_INTERVAL` - Reaper frequency in seconds (default: 30)
    /// - `STUCK_FLAG_TIMEOUT` - Stuck claim age in seconds, 0 disables (default: 600)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_expiration: parse_var("CACHED_FIELD_DEFAULT_EXPIRATION")
                .unwrap_or(defaults.default_expiration),
            eager_recalculation: bool_var("CACHED_FIELD_EAGER_RECALCULATION")
                .unwrap_or(defaults.eager_recalculation),
            use_timezone: bool_var("CACHED_FIELD_USE_TZ").unwrap_or(defaults.use_timezone),
            countdown: parse_var("CACHED_FIELD_COUNTDOWN"),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            worker_concurrency: parse_var("WORKER_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.worker_concurrency),
            reaper_interval: parse_var("REAPER_INTERVAL")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.reaper_interval),
            stuck_flag_timeout: parse_var("STUCK_FLAG_TIMEOUT")
                .unwrap_or(defaults.stuck_flag_timeout),
        }
    }

    /// Field defaults derived from this configuration.
    pub fn field_defaults(&self) -> FieldDefaults {
        FieldDefaults {
            expires_after: Duration::from_secs(self.default_expiration),
            use_timezone: self.use_timezone,
            dispatch: DispatchOptions {
                countdown: self.countdown.map(Duration::from_secs),
            },
        }
    }

    /// Whether the stuck-claim reaper should run at all.
    pub fn reaper_enabled(&self) -> bool {
        self.stuck_flag_timeout > 0
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_expiration: 3600,
            eager_recalculation: true,
            use_timezone: true,
            countdown: None,
            server_port: 3000,
            worker_concurrency: 4,
            reaper_interval: 30,
            stuck_flag_timeout: 600,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn bool_var(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|v| parse_bool(&v))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
