//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;
use vapor_hub::HubConfig;
use vapor_voice::DailyConfig;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Room hub tuning.
    #[serde(default)]
    pub hub: HubSettings,

    /// WebSocket keepalive settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// External call-room provider.
    #[serde(default)]
    pub calls: DailyConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vapor_hub=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Hub configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    /// A participant is online while seen within this many seconds.
    #[serde(default = "default_presence_window_secs")]
    pub presence_window_secs: u64,

    /// How often the presence sweep runs. 0 disables it.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Outbound queue depth per connection.
    #[serde(default = "default_session_queue_capacity")]
    pub session_queue_capacity: usize,
}

/// WebSocket transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Interval between server pings. 0 disables pings.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// A connection that sends nothing for this long is closed. 0 disables the timeout.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_presence_window_secs() -> u64 {
    45
}

fn default_sweep_interval_secs() -> u64 {
    15
}

fn default_session_queue_capacity() -> usize {
    256
}

fn default_ping_interval_secs() -> u64 {
    25
}

fn default_idle_timeout_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            presence_window_secs: default_presence_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            session_queue_capacity: default_session_queue_capacity(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl HubSettings {
    /// Runtime settings for the hub. A zero queue capacity is raised to 1.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            presence_window: Duration::from_secs(self.presence_window_secs),
            session_queue_capacity: self.session_queue_capacity.max(1),
        }
    }
}

impl TransportConfig {
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VAPOR_HOST` overrides `server.host`
/// - `VAPOR_PORT` overrides `server.port`
/// - `VAPOR_LOG_LEVEL` overrides `logging.level`
/// - `VAPOR_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VAPOR_PRESENCE_WINDOW_SECS` overrides `hub.presence_window_secs`
/// - `DAILY_API_KEY` overrides `calls.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("VAPOR_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("VAPOR_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(level) = std::env::var("VAPOR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("VAPOR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(window) = std::env::var("VAPOR_PRESENCE_WINDOW_SECS") {
        if let Ok(parsed) = window.parse() {
            config.hub.presence_window_secs = parsed;
        }
    }
    if let Ok(key) = std::env::var("DAILY_API_KEY") {
        if !key.trim().is_empty() {
            config.calls.api_key = key;
        }
    }

    Ok(config)
}
