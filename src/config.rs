use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// State backend configuration
    pub state: StateConfig,

    /// Presence and liveness timing
    #[serde(default)]
    pub presence: PresenceConfig,

    /// WebSocket transport configuration
    #[serde(default)]
    pub websocket: WebSocketSettings,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: AVATAR_HUB_)
            .add_source(
                config::Environment::with_prefix("AVATAR_HUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the sweeps cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        self.presence.validate()?;

        if self.websocket.ping_interval_secs == 0 || self.websocket.cleanup_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "websocket intervals must be greater than zero".to_string(),
            ));
        }

        if self.websocket.broadcast_capacity == 0 {
            return Err(config::ConfigError::Message(
                "websocket.broadcast_capacity must be greater than zero".to_string(),
            ));
        }

        if self.state.backend == StateBackend::Sled && self.state.path.is_none() {
            return Err(config::ConfigError::Message(
                "state.path is required for the sled backend".to_string(),
            ));
        }

        if self.state.backend == StateBackend::Redis && self.state.redis_url.is_none() {
            return Err(config::ConfigError::Message(
                "state.redis_url is required for the redis backend".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// State backend type
    #[serde(default)]
    pub backend: StateBackend,

    /// Path for the embedded database (sled)
    pub path: Option<PathBuf>,

    /// Redis connection string
    pub redis_url: Option<String>,

    /// Key prefix for Redis records
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Memory,
            path: None,
            redis_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Memory,
    Sled,
    Redis,
}

/// Upper bound for sweep intervals and the heartbeat timeout (one week)
pub const MAX_PRESENCE_SECS: u64 = 7 * 24 * 60 * 60;

/// Cadences for the two periodic sweeps and the heartbeat timeout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Viewer-count sweep interval (seconds)
    #[serde(default = "default_count_interval")]
    pub count_interval_secs: u64,

    /// Liveness sweep interval (seconds)
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,

    /// A live stream without a heartbeat for longer than this is demoted
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
}

impl PresenceConfig {
    pub fn count_interval(&self) -> Duration {
        Duration::from_secs(self.count_interval_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    /// Falls back to `chrono::Duration::MAX` (never stale) for values `validate` rejects
    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        i64::try_from(self.heartbeat_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        for (name, value) in [
            ("presence.count_interval_secs", self.count_interval_secs),
            ("presence.liveness_interval_secs", self.liveness_interval_secs),
            ("presence.heartbeat_timeout_secs", self.heartbeat_timeout_secs),
        ] {
            if value == 0 {
                return Err(config::ConfigError::Message(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
            if value > MAX_PRESENCE_SECS {
                return Err(config::ConfigError::Message(format!(
                    "{} must not exceed {} seconds",
                    name, MAX_PRESENCE_SECS
                )));
            }
        }
        Ok(())
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            count_interval_secs: default_count_interval(),
            liveness_interval_secs: default_liveness_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
        }
    }
}

/// WebSocket transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketSettings {
    /// Server ping interval (seconds)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Idle session timeout (seconds)
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Idle session reaper interval (seconds)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// In-process broadcast channel capacity
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            session_timeout_secs: default_session_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_key_prefix() -> String {
    "avatar-hub".to_string()
}

fn default_count_interval() -> u64 {
    5
}

fn default_liveness_interval() -> u64 {
    15
}

fn default_heartbeat_timeout() -> u64 {
    30
}

fn default_ping_interval() -> u64 {
    25
}

fn default_session_timeout() -> u64 {
    120
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_broadcast_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "avatar-live-hub".to_string()
}

fn default_true() -> bool {
    true
}
