//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Job queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Delivery configuration.
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Job queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Total window during which a job may be retried, in seconds.
    #[serde(default = "default_max_retry_window_secs")]
    pub max_retry_window_secs: u64,
    /// Delay before the first retry, in seconds.
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    /// Multiplier applied to the backoff delay on each attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Ceiling for a single backoff delay, in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Ceiling for a single wait on the approval gate, in seconds.
    #[serde(default = "default_approval_wait_secs")]
    pub approval_wait_secs: u64,
}

/// Delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Timeout for a single network send, in seconds.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

const fn default_max_retry_window_secs() -> u64 {
    86_400 // 24 hours
}

const fn default_initial_backoff_secs() -> u64 {
    60
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_backoff_secs() -> u64 {
    3_600
}

const fn default_approval_wait_secs() -> u64 {
    300 // 5 minutes
}

const fn default_send_timeout_secs() -> u64 {
    30
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retry_window_secs: default_max_retry_window_secs(),
            initial_backoff_secs: default_initial_backoff_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_secs: default_max_backoff_secs(),
            approval_wait_secs: default_approval_wait_secs(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl QueueConfig {
    /// The total retry window as a [`Duration`].
    #[must_use]
    pub const fn max_retry_window(&self) -> Duration {
        Duration::from_secs(self.max_retry_window_secs)
    }

    /// The approval wait ceiling as a [`Duration`].
    #[must_use]
    pub const fn approval_wait(&self) -> Duration {
        Duration::from_secs(self.approval_wait_secs)
    }
}

impl DeliveryConfig {
    /// The per-send timeout as a [`Duration`].
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `COURIER_ENV`)
    /// 3. Environment variables with `COURIER_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("COURIER_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retry_window(), Duration::from_secs(86_400));
        assert_eq!(config.approval_wait(), Duration::from_secs(300));
        assert_eq!(config.initial_backoff_secs, 60);
    }

    #[test]
    fn test_config_default_is_complete() {
        let config = Config::default();
        assert_eq!(config.delivery.send_timeout(), Duration::from_secs(30));
        assert_eq!(config.queue.backoff_multiplier, 2.0);
    }
}
