//! Configuration for the Cadwatch Companion.
//!
//! Configuration is read from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CADWATCH_API_URL` | Yes | - | Backend base URL (e.g. `https://api.example.com`) |
//! | `CADWATCH_ENGINEER` | No | `$USER` / hostname | Identity of the acting engineer |
//! | `CADWATCH_COMPANION_ID` | No | hostname | Identifier reported in heartbeats |
//! | `CADWATCH_DEBOUNCE_MS` | No | 2000 | File-change debounce window (ms) |
//! | `CADWATCH_HEARTBEAT_SECS` | No | 30 | Seconds between heartbeats |
//! | `CADWATCH_CHANNEL_CAPACITY` | No | 256 | Event channel capacity |

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::debounce::DEFAULT_DEBOUNCE_MS;

/// Default heartbeat interval in seconds.
const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Default capacity of the internal event channels.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the companion process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL for telemetry reporting.
    pub api_url: String,

    /// Identity of the acting engineer attached to sessions.
    pub engineer: String,

    /// Identifier for this companion instance, reported in heartbeats.
    pub companion_id: String,

    /// Debounce window for file-change notifications.
    pub debounce_window: Duration,

    /// Interval between heartbeats.
    pub heartbeat_interval: Duration,

    /// Capacity of the internal event channels.
    pub channel_capacity: usize,
}

impl Config {
    /// Creates a `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `CADWATCH_API_URL` is not set or any
    /// numeric variable cannot be parsed as a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("CADWATCH_API_URL")
            .map_err(|_| ConfigError::MissingEnvVar("CADWATCH_API_URL".to_string()))?;

        let engineer = env::var("CADWATCH_ENGINEER").unwrap_or_else(|_| default_engineer());

        let companion_id =
            env::var("CADWATCH_COMPANION_ID").unwrap_or_else(|_| get_hostname());

        let debounce_ms =
            parse_positive_u64("CADWATCH_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;
        let heartbeat_secs =
            parse_positive_u64("CADWATCH_HEARTBEAT_SECS", DEFAULT_HEARTBEAT_SECS)?;
        let channel_capacity = parse_positive_u64(
            "CADWATCH_CHANNEL_CAPACITY",
            DEFAULT_CHANNEL_CAPACITY as u64,
        )? as usize;

        Ok(Self {
            api_url,
            engineer,
            companion_id,
            debounce_window: Duration::from_millis(debounce_ms),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            channel_capacity,
        })
    }
}

/// Parses an optional positive integer environment variable.
fn parse_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let parsed = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected positive integer, got '{val}'"),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "value must be greater than 0".to_string(),
                });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}

/// Default engineer identity: the login user, falling back to hostname.
fn default_engineer() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| get_hostname())
}

/// Gets the system hostname, falling back to "unknown".
fn get_hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "unknown".to_string())
}
