//! Configuration management for the chat relay server
//!
//! Settings load from an optional `config.toml` with `CHAT_RELAY_*`
//! environment overrides layered on top, so the server also runs with no
//! config file at all.

use config::{Config, Environment, File};
use serde::Deserialize;

/// Server configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind the listener
    pub bind_address: String,

    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// Maximum concurrent registered clients
    pub max_clients: usize,

    /// Largest accepted frame body in bytes; a declared length above this is
    /// treated as a corrupt or hostile stream
    pub max_frame_len: usize,

    /// Transport read buffer size in bytes
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 7878,
            max_clients: 10,
            max_frame_len: 65536,
            read_buffer_size: 4096,
        }
    }
}

impl ServerConfig {
    /// Load configuration from config.toml (if present) with environment
    /// overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .set_default("bind_address", "127.0.0.1")?
            .set_default("port", 7878i64)?
            .set_default("max_clients", 10i64)?
            .set_default("max_frame_len", 65536i64)?
            .set_default("read_buffer_size", 4096i64)?
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("CHAT_RELAY"))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Get bind address and port as a socket address string.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Validation for all configuration values.
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.max_clients == 0 {
            return Err(config::ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        if self.max_frame_len == 0 {
            return Err(config::ConfigError::Message(
                "max_frame_len must be greater than 0".into(),
            ));
        }

        if self.read_buffer_size == 0 {
            return Err(config::ConfigError::Message(
                "read_buffer_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr(), "127.0.0.1:7878");
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = ServerConfig {
            max_frame_len: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            max_clients: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
