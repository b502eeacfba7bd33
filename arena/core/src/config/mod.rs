//! Configuration
//!
//! Everything the session controller needs from its host: where the backend
//! lives, how to reach it, and how patiently to poll. Nothing here is
//! hard-coded inside the transports; they all receive an [`ArenaConfig`].
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`ARENA_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # File Location
//!
//! `$XDG_CONFIG_HOME/arena/arena.toml` (typically `~/.config/arena/arena.toml`).
//! A missing file is not an error.
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "https://arena.example.com"
//! request_timeout_ms = 30000
//!
//! [streaming]
//! enabled = true
//! base_url = "wss://arena.example.com"
//! connect_timeout_ms = 5000
//! default_max_tokens = 1024
//!
//! [polling]
//! interval_ms = 2000
//! max_attempts = 60
//! ```

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::polling::PollSettings;

/// Path prefix of every REST endpoint
pub const API_PREFIX: &str = "/api/v1";

/// Path of the streaming endpoint
pub const WS_EVALUATE_PATH: &str = "/ws/evaluate";

/// Default REST base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Default streaming base URL
pub const DEFAULT_WS_BASE_URL: &str = "ws://localhost:8000";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Where the highest-priority configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Built-in default
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[api]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// REST base URL
    pub base_url: Option<String>,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: Option<u64>,
}

/// `[streaming]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingToml {
    /// Try the socket before polling
    pub enabled: Option<bool>,
    /// Socket base URL
    pub base_url: Option<String>,
    /// Socket connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Token budget sent when a request has none
    pub default_max_tokens: Option<u32>,
}

/// `[polling]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingToml {
    /// Delay between status fetches in milliseconds
    pub interval_ms: Option<u64>,
    /// Status fetches before giving up
    pub max_attempts: Option<u32>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaToml {
    /// REST settings
    pub api: ApiToml,
    /// Streaming settings
    pub streaming: StreamingToml,
    /// Polling settings
    pub polling: PollingToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// REST base URL, scheme and host only
    pub api_base_url: String,

    /// Socket base URL, scheme and host only
    pub ws_base_url: String,

    /// Delay between status fetches
    pub poll_interval_ms: u64,

    /// Status fetches before the session fails with a timeout
    pub max_poll_attempts: u32,

    /// Try the socket first; `false` forces polling
    pub streaming_enabled: bool,

    /// Timeout for each REST call
    pub request_timeout_ms: u64,

    /// Timeout for opening the socket
    pub connect_timeout_ms: u64,

    /// Token budget sent when a request has none
    pub default_max_tokens: u32,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_base_url: DEFAULT_WS_BASE_URL.to_string(),
            poll_interval_ms: 2000,
            max_poll_attempts: 60,
            streaming_enabled: true,
            request_timeout_ms: 30_000,
            connect_timeout_ms: 5000,
            default_max_tokens: crate::evaluation::DEFAULT_MAX_TOKENS,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ArenaConfig {
    /// Configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Delay between status fetches
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Timeout for each REST call
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Timeout for opening the socket
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Polling cadence and budget
    #[must_use]
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::new(self.poll_interval(), self.max_poll_attempts)
    }

    /// Full URL of the streaming endpoint
    #[must_use]
    pub fn ws_evaluate_url(&self) -> String {
        format!(
            "{}{WS_EVALUATE_PATH}",
            self.ws_base_url.trim_end_matches('/')
        )
    }

    /// Check values that would make the transports misbehave
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !has_scheme(&self.api_base_url, &["http://", "https://"]) {
            return Err(ConfigError::ValidationError(format!(
                "api base URL must start with http:// or https://, got '{}'",
                self.api_base_url
            )));
        }
        if !has_scheme(&self.ws_base_url, &["ws://", "wss://"]) {
            return Err(ConfigError::ValidationError(format!(
                "streaming base URL must start with ws:// or wss://, got '{}'",
                self.ws_base_url
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max poll attempts must be greater than zero".into(),
            ));
        }
        if self.request_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes
        .iter()
        .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme))
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/arena/arena.toml` or `~/.config/arena/arena.toml`
/// if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("arena").join("arena.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// result fails validation.
pub async fn load_config() -> Result<ArenaConfig, ConfigError> {
    load_config_from_path(default_config_path()).await
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the result fails
/// validation. A missing file falls back to defaults.
pub async fn load_config_from_path(path: Option<PathBuf>) -> Result<ArenaConfig, ConfigError> {
    let config = load_unvalidated_config_from_path(path).await?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_config_from_path`], but leaves validation to the caller
///
/// For front ends that layer [`ConfigOverrides`] on top and validate the
/// final result once.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn load_unvalidated_config_from_path(
    path: Option<PathBuf>,
) -> Result<ArenaConfig, ConfigError> {
    let mut config = ArenaConfig::default();

    if let Some(config_path) = path {
        match tokio::fs::read_to_string(&config_path).await {
            Ok(toml_content) => {
                let toml_config: ArenaToml = toml::from_str(&toml_content)?;
                apply_toml_config(&mut config, &toml_config);
                config.source = ConfigSource::File;
                tracing::info!(path = %config_path.display(), "Loaded configuration from file");
                config.config_file_path = Some(config_path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
            }
            Err(e) => {
                return Err(ConfigError::ReadError {
                    path: config_path,
                    source: e,
                })
            }
        }
    }

    apply_env_config(&mut config);
    Ok(config)
}

/// Apply TOML values to the config
pub fn apply_toml_config(config: &mut ArenaConfig, toml: &ArenaToml) {
    if let Some(ref url) = toml.api.base_url {
        config.api_base_url.clone_from(url);
    }
    if let Some(timeout) = toml.api.request_timeout_ms {
        config.request_timeout_ms = timeout;
    }

    if let Some(enabled) = toml.streaming.enabled {
        config.streaming_enabled = enabled;
    }
    if let Some(ref url) = toml.streaming.base_url {
        config.ws_base_url.clone_from(url);
    }
    if let Some(timeout) = toml.streaming.connect_timeout_ms {
        config.connect_timeout_ms = timeout;
    }
    if let Some(max_tokens) = toml.streaming.default_max_tokens {
        config.default_max_tokens = max_tokens;
    }

    if let Some(interval) = toml.polling.interval_ms {
        config.poll_interval_ms = interval;
    }
    if let Some(attempts) = toml.polling.max_attempts {
        config.max_poll_attempts = attempts;
    }
}

/// Apply `ARENA_*` environment variables to the config
pub fn apply_env_config(config: &mut ArenaConfig) {
    apply_env_with(config, |key| std::env::var(key).ok());
}

/// Apply environment-style overrides read through `lookup`
///
/// Unparseable values are ignored with a warning.
pub fn apply_env_with<F>(config: &mut ArenaConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut touched = false;

    if let Some(url) = lookup("ARENA_API_URL") {
        config.api_base_url = url;
        touched = true;
    }
    if let Some(url) = lookup("ARENA_WS_URL") {
        config.ws_base_url = url;
        touched = true;
    }
    if let Some(ms) = parse_env(&lookup, "ARENA_POLL_INTERVAL_MS") {
        config.poll_interval_ms = ms;
        touched = true;
    }
    if let Some(attempts) = parse_env(&lookup, "ARENA_MAX_POLLS") {
        config.max_poll_attempts = attempts;
        touched = true;
    }
    if let Some(value) = lookup("ARENA_STREAMING") {
        match parse_bool(&value) {
            Some(enabled) => {
                config.streaming_enabled = enabled;
                touched = true;
            }
            None => tracing::warn!(key = "ARENA_STREAMING", %value, "Ignoring invalid boolean"),
        }
    }
    if let Some(ms) = parse_env(&lookup, "ARENA_REQUEST_TIMEOUT_MS") {
        config.request_timeout_ms = ms;
        touched = true;
    }
    if let Some(ms) = parse_env(&lookup, "ARENA_CONNECT_TIMEOUT_MS") {
        config.connect_timeout_ms = ms;
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, %value, "Ignoring unparseable environment value");
            None
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// REST base URL
    pub api_base_url: Option<String>,
    /// Socket base URL
    pub ws_base_url: Option<String>,
    /// Poll interval in milliseconds
    pub poll_interval_ms: Option<u64>,
    /// Poll attempt budget
    pub max_poll_attempts: Option<u32>,
    /// Force streaming on or off
    pub streaming_enabled: Option<bool>,
}

impl ConfigOverrides {
    /// No overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the REST base URL
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Set the socket base URL
    #[must_use]
    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = Some(url.into());
        self
    }

    /// Set the poll interval
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// Set the poll budget
    #[must_use]
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = Some(attempts);
        self
    }

    /// Force streaming on or off
    #[must_use]
    pub fn with_streaming_enabled(mut self, enabled: bool) -> Self {
        self.streaming_enabled = Some(enabled);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ArenaConfig) {
        if self.api_base_url.is_some()
            || self.ws_base_url.is_some()
            || self.poll_interval_ms.is_some()
            || self.max_poll_attempts.is_some()
            || self.streaming_enabled.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.api_base_url {
            config.api_base_url.clone_from(url);
        }
        if let Some(ref url) = self.ws_base_url {
            config.ws_base_url.clone_from(url);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(attempts) = self.max_poll_attempts {
            config.max_poll_attempts = attempts;
        }
        if let Some(enabled) = self.streaming_enabled {
            config.streaming_enabled = enabled;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
