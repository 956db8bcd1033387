//! Configuration management for the chat relay
//!
//! Values come from built-in defaults, an optional `config.toml` in the
//! working directory and `CHAT_RELAY_*` environment variables, in that
//! order of precedence.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

const CONFIG_FILE: &str = "config";
const ENV_PREFIX: &str = "CHAT_RELAY";

/// Relay server configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    // ═══ NETWORK (Environment Override Supported) ═══
    /// Interface to bind the listening socket to
    pub host: String,

    /// Listening port; 0 picks an ephemeral port
    pub port: u16,

    /// Accept backlog handed to `listen(2)`
    pub backlog: u32,

    // ═══ CONNECTION BEHAVIOUR ═══
    /// Longest line, in bytes, a client may send
    pub max_line_length: usize,

    /// Upper bound for one delivery to one recipient
    pub write_timeout_ms: u64,

    /// How long shutdown waits for handlers before aborting them
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            backlog: 128,
            max_line_length: 4096,
            write_timeout_ms: 5_000,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `config.toml` (if present) with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true)),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Message("host cannot be empty".into()));
        }

        if self.backlog == 0 {
            return Err(ConfigError::Message(
                "backlog must be greater than 0".into(),
            ));
        }

        if self.max_line_length == 0 {
            return Err(ConfigError::Message(
                "max_line_length must be greater than 0".into(),
            ));
        }

        if self.write_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "write_timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Host and port joined as a bindable address string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
