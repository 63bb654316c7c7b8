//! Configuration module - environment variable parsing

use std::env;

/// Half the side length of the square arena participants can move in
const DEFAULT_ARENA_HALF_EXTENT: f32 = 48.0;

/// Client configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Relay WebSocket URL (ws:// or wss://)
    pub relay_url: String,
    /// Name shown to other participants
    pub display_name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Arena bounding square half-extent
    pub arena_half_extent: f32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let arena_half_extent = match env::var("ARENA_HALF_EXTENT") {
            Ok(raw) => raw
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .ok_or(ConfigError::Invalid("ARENA_HALF_EXTENT"))?,
            Err(_) => DEFAULT_ARENA_HALF_EXTENT,
        };

        Ok(Self {
            relay_url: env::var("RELAY_URL").map_err(|_| ConfigError::Missing("RELAY_URL"))?,

            display_name: env::var("DISPLAY_NAME").unwrap_or_else(|_| "guest".to_string()),

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            arena_half_extent,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
