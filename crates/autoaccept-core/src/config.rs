//! Configuration and settings management
//!
//! Loads pipeline settings from config files and environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Default number of approval workers.
pub const DEFAULT_WORKERS: usize = 6;
/// Default number of approval calls allowed in flight at once.
pub const DEFAULT_APPROVE_CONCURRENCY: usize = 4;
/// Default minimum interval between debounced store flushes.
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 3;
/// Default pause after each welcome send.
pub const DEFAULT_WELCOME_INTERVAL_MS: u64 = 350;
/// Default pause after each successful broadcast delivery.
pub const DEFAULT_BROADCAST_THROTTLE_MS: u64 = 50;
/// Default lifetime of a pending (armed, not started) broadcast.
pub const DEFAULT_BROADCAST_PENDING_TTL_SECS: u64 = 300;
/// Default text sent to every approved user.
pub const DEFAULT_WELCOME_TEXT: &str = "👋 Welcome!\n\nYour request has been approved 🎉";

/// Build the layered configuration source shared by every settings struct.
///
/// Sources, lowest priority first: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__*` variables, then plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE maps to snake_case keys; empty vars count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Tuning knobs for the join-request pipeline and broadcasts.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineSettings {
    /// Directory holding the JSON collections.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Number of approval workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Approval calls allowed in flight at once.
    #[serde(default = "default_approve_concurrency")]
    pub approve_concurrency: usize,
    /// Minimum seconds between debounced flushes.
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
    /// Pause after each welcome send, in milliseconds.
    #[serde(default = "default_welcome_interval_ms")]
    pub welcome_interval_ms: u64,
    /// Text sent to approved users.
    #[serde(default = "default_welcome_text")]
    pub welcome_text: String,
    /// Pause after each successful broadcast delivery, in milliseconds.
    #[serde(default = "default_broadcast_throttle_ms")]
    pub broadcast_throttle_ms: u64,
    /// Seconds a pending broadcast waits for its payload.
    #[serde(default = "default_broadcast_pending_ttl_secs")]
    pub broadcast_pending_ttl_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

const fn default_workers() -> usize {
    DEFAULT_WORKERS
}

const fn default_approve_concurrency() -> usize {
    DEFAULT_APPROVE_CONCURRENCY
}

const fn default_save_interval_secs() -> u64 {
    DEFAULT_SAVE_INTERVAL_SECS
}

const fn default_welcome_interval_ms() -> u64 {
    DEFAULT_WELCOME_INTERVAL_MS
}

fn default_welcome_text() -> String {
    DEFAULT_WELCOME_TEXT.to_string()
}

const fn default_broadcast_throttle_ms() -> u64 {
    DEFAULT_BROADCAST_THROTTLE_MS
}

const fn default_broadcast_pending_ttl_secs() -> u64 {
    DEFAULT_BROADCAST_PENDING_TTL_SECS
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            workers: DEFAULT_WORKERS,
            approve_concurrency: DEFAULT_APPROVE_CONCURRENCY,
            save_interval_secs: DEFAULT_SAVE_INTERVAL_SECS,
            welcome_interval_ms: DEFAULT_WELCOME_INTERVAL_MS,
            welcome_text: default_welcome_text(),
            broadcast_throttle_ms: DEFAULT_BROADCAST_THROTTLE_MS,
            broadcast_pending_ttl_secs: DEFAULT_BROADCAST_PENDING_TTL_SECS,
        }
    }
}

impl PipelineSettings {
    /// Load settings from config files and the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or deserialization fails.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = build_config()?.try_deserialize()?;
        Ok(settings.normalized())
    }

    /// Clamp zero-sized pools to one so the pipeline can always make progress.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.workers == 0 {
            warn!("WORKERS=0 is not usable, falling back to 1");
            self.workers = 1;
        }
        if self.approve_concurrency == 0 {
            warn!("APPROVE_CONCURRENCY=0 is not usable, falling back to 1");
            self.approve_concurrency = 1;
        }
        self
    }

    /// Minimum interval between debounced flushes.
    #[must_use]
    pub const fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    /// Pause after each welcome send.
    #[must_use]
    pub const fn welcome_interval(&self) -> Duration {
        Duration::from_millis(self.welcome_interval_ms)
    }

    /// Pause after each successful broadcast delivery.
    #[must_use]
    pub const fn broadcast_throttle(&self) -> Duration {
        Duration::from_millis(self.broadcast_throttle_ms)
    }

    /// Lifetime of a pending broadcast.
    #[must_use]
    pub const fn broadcast_pending_ttl(&self) -> Duration {
        Duration::from_secs(self.broadcast_pending_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.workers, 6);
        assert_eq!(settings.approve_concurrency, 4);
        assert_eq!(settings.save_interval(), Duration::from_secs(3));
        assert_eq!(settings.welcome_interval(), Duration::from_millis(350));
        assert_eq!(settings.broadcast_throttle(), Duration::from_millis(50));
        assert_eq!(settings.broadcast_pending_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_pools_are_clamped() {
        let settings = PipelineSettings {
            workers: 0,
            approve_concurrency: 0,
            ..PipelineSettings::default()
        }
        .normalized();
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.approve_concurrency, 1);
    }

    #[test]
    fn test_env_overrides_defaults() -> Result<(), Box<dyn std::error::Error>> {
        std::env::set_var("WORKERS", "9");
        std::env::set_var("BROADCAST_THROTTLE_MS", "");

        let settings = PipelineSettings::new()?;
        assert_eq!(settings.workers, 9);
        // Empty variables are ignored
        assert_eq!(settings.broadcast_throttle_ms, DEFAULT_BROADCAST_THROTTLE_MS);

        std::env::remove_var("WORKERS");
        std::env::remove_var("BROADCAST_THROTTLE_MS");
        Ok(())
    }
}
