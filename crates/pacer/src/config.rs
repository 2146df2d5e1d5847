//! Configuration structures for the controller.
//!
//! This module provides TOML-based configuration. The configuration system
//! supports:
//! - Bundled defaults (include_str! from pacer.toml)
//! - User overrides (./pacer.toml or ~/.config/pacer/pacer.toml)
//! - Automatic merging with user values taking precedence

use config::{Config, File, FileFormat};
use pacer_error::{PacerError, PacerErrorKind, PacerResult};
use pacer_rate_limit::LimitHeaders;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Retry and backoff settings.
///
/// # Example
///
/// ```toml
/// [retry]
/// max_retries = 5
/// wait_min_ms = 100
/// wait_max_ms = 400
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Lower bound of the rate limit backoff window in milliseconds
    #[serde(default = "default_wait_min_ms")]
    pub wait_min_ms: u64,

    /// Upper bound of the rate limit backoff window in milliseconds
    #[serde(default = "default_wait_max_ms")]
    pub wait_max_ms: u64,

    /// Turn off the default retry classifier
    #[serde(default)]
    pub disabled: bool,

    /// Lower bound of the window used for server and connection failures
    #[serde(default = "default_server_wait_min_ms")]
    pub server_wait_min_ms: u64,

    /// Upper bound of the window used for server and connection failures
    #[serde(default = "default_server_wait_max_ms")]
    pub server_wait_max_ms: u64,
}

fn default_max_retries() -> usize {
    5
}

fn default_wait_min_ms() -> u64 {
    100
}

fn default_wait_max_ms() -> u64 {
    400
}

fn default_server_wait_min_ms() -> u64 {
    700
}

fn default_server_wait_max_ms() -> u64 {
    900
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            wait_min_ms: default_wait_min_ms(),
            wait_max_ms: default_wait_max_ms(),
            disabled: false,
            server_wait_min_ms: default_server_wait_min_ms(),
            server_wait_max_ms: default_server_wait_max_ms(),
        }
    }
}

impl RetryConfig {
    /// Rate limit backoff window.
    pub fn wait(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.wait_min_ms),
            Duration::from_millis(self.wait_max_ms),
        )
    }

    /// Server failure backoff window.
    pub fn server_wait(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.server_wait_min_ms),
            Duration::from_millis(self.server_wait_max_ms),
        )
    }
}

/// Settings for the pooled HTTP client.
///
/// # Example
///
/// ```toml
/// [transport]
/// timeout_secs = 30
/// pool_max_idle_per_host = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Whole-request timeout in seconds; 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds; 0 disables it
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long idle pooled connections are kept, in seconds
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,

    /// Maximum idle connections kept per host
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// User-Agent header sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_pool_idle_timeout_secs() -> u64 {
    90
}

fn default_pool_max_idle_per_host() -> usize {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            user_agent: None,
        }
    }
}

/// Top-level Pacer configuration.
///
/// Loads settings from TOML files with a precedence system:
/// 1. Bundled defaults (include_str! from pacer.toml)
/// 2. User override (./pacer.toml or ~/.config/pacer/pacer.toml)
///
/// # Example
///
/// ```no_run
/// use pacer::PacerConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PacerConfig::load()?;
/// println!("Retries: {}", config.retry.max_retries);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct PacerConfig {
    /// Retry and backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rate limit header names
    #[serde(default)]
    pub rate_limit: LimitHeaders,

    /// HTTP client settings
    #[serde(default)]
    pub transport: TransportConfig,
}

impl PacerConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> PacerResult<Self> {
        debug!("Loading configuration from file");

        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                config_error(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?
            .try_deserialize()
            .map_err(|e| config_error(format!("Failed to parse configuration: {}", e)))
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid configuration.
    pub fn from_toml(source: &str) -> PacerResult<Self> {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .map_err(|e| config_error(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| config_error(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration with precedence: user override > bundled default.
    ///
    /// Configuration sources in order of precedence (later sources override earlier):
    /// 1. Bundled defaults (pacer.toml shipped with library)
    /// 2. User config in home directory (~/.config/pacer/pacer.toml)
    /// 3. User config in current directory (./pacer.toml)
    ///
    /// User config files are optional and will be silently skipped if not found.
    #[instrument]
    pub fn load() -> PacerResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        const DEFAULT_CONFIG: &str = include_str!("../pacer.toml");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/pacer/pacer.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("pacer").required(false));

        builder
            .build()
            .map_err(|e| config_error(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| config_error(format!("Failed to parse configuration: {}", e)))
    }
}

#[track_caller]
fn config_error(message: String) -> PacerError {
    PacerError::new(PacerErrorKind::Configuration(message))
}
