//! Server configuration.

use crate::codec::{DEFAULT_MAX_FRAME_LEN, MAX_COMMAND_LEN};
use derive_getters::Getters;
use derive_more::{Display, Error};
use noughts_engine::{MAX_BRANCHING, Strategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Configuration for the game server.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind to.
    #[serde(default = "default_port")]
    port: u16,

    /// Largest frame payload accepted from a client.
    #[serde(default = "default_max_frame_len")]
    max_frame_len: usize,

    /// Minimax variant used for the engine opponent.
    #[serde(default)]
    search: Strategy,

    /// Worker count for the parallel search, clamped to 1..=9.
    #[serde(default = "default_search_threads")]
    search_threads: usize,

    /// Reap sessions still waiting for an opponent after this many seconds.
    #[serde(default)]
    idle_session_timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    65432
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

fn default_search_threads() -> usize {
    MAX_BRANCHING
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_frame_len: default_max_frame_len(),
            search: Strategy::default(),
            search_threads: default_search_threads(),
            idle_session_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file; missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;

        info!(host = %config.host, port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Replaces the bind address with any values given on the command line.
    ///
    /// Only the address changes, so no revalidation is needed; [`GameServer::bind`]
    /// validates the final config anyway.
    ///
    /// [`GameServer::bind`]: crate::GameServer::bind
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    /// Sets the search strategy.
    pub fn with_search(mut self, search: Strategy) -> Self {
        self.search = search;
        self
    }

    /// Sets the idle-session timeout.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_session_timeout_secs = timeout.map(|t| t.as_secs());
        self
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle-session timeout as a duration.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_session_timeout_secs.map(Duration::from_secs)
    }

    /// Checks that every well-formed command fits in an inbound frame.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_len < MAX_COMMAND_LEN {
            return Err(ConfigError::new(format!(
                "max_frame_len {} is below the longest command ({} bytes)",
                self.max_frame_len, MAX_COMMAND_LEN
            )));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
