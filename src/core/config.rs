/*!
 * IPC Configuration
 *
 * Runtime configuration for transport selection and framing limits.
 * Read once by the caller and handed to the factories that need it.
 */

use super::limits::{
    DEFAULT_EMULATED_CAPACITY, DEFAULT_MAX_MESSAGE_LEN, MAX_EMULATED_CAPACITY,
    MIN_EMULATED_CAPACITY,
};
use crate::ipc::types::Backend;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable selecting the default transport
pub const ENV_BACKEND: &str = "CONDUIT_BACKEND";
/// Environment variable overriding the emulated ring capacity
pub const ENV_PIPE_CAPACITY: &str = "CONDUIT_PIPE_CAPACITY";
/// Environment variable overriding the accepted frame length
pub const ENV_MAX_MESSAGE: &str = "CONDUIT_MAX_MESSAGE";

/// Configuration errors
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    #[diagnostic(
        code(config::invalid_value),
        help("Check the environment variable or configuration file entry.")
    )]
    InvalidValue { key: &'static str, value: String },

    #[error("Value for {key} out of range: {value} (allowed {min}..={max})")]
    #[diagnostic(code(config::out_of_range))]
    OutOfRange {
        key: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    #[error("Malformed configuration document: {0}")]
    #[diagnostic(
        code(config::malformed),
        help("The configuration must be a JSON object with optional backend, emulated_capacity and max_message_len keys.")
    )]
    Malformed(#[from] serde_json::Error),
}

/// IPC configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct IpcConfig {
    /// Transport used by `make_pipe`
    pub backend: Backend,
    /// Ring capacity of emulated transports in bytes
    pub emulated_capacity: usize,
    /// Largest frame a connection accepts
    pub max_message_len: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Native,
            emulated_capacity: DEFAULT_EMULATED_CAPACITY,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

impl IpcConfig {
    /// Configuration that routes every pipe through the emulated transport
    pub fn emulated() -> Self {
        Self {
            backend: Backend::Emulated,
            ..Self::default()
        }
    }

    /// Build from defaults overridden by `CONDUIT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a JSON document; missing keys fall back to defaults
    pub fn from_json_str(doc: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(doc)?;
        config.validate()
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_BACKEND) {
            config.backend = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_BACKEND,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_PIPE_CAPACITY) {
            config.emulated_capacity = parse_usize(ENV_PIPE_CAPACITY, value)?;
        }
        if let Some(value) = lookup(ENV_MAX_MESSAGE) {
            config.max_message_len = parse_usize(ENV_MAX_MESSAGE, value)?;
        }

        config.validate()
    }

    /// Check every field against its limits
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !(MIN_EMULATED_CAPACITY..=MAX_EMULATED_CAPACITY).contains(&self.emulated_capacity) {
            return Err(ConfigError::OutOfRange {
                key: "emulated_capacity",
                value: self.emulated_capacity,
                min: MIN_EMULATED_CAPACITY,
                max: MAX_EMULATED_CAPACITY,
            });
        }
        if self.max_message_len == 0 {
            return Err(ConfigError::OutOfRange {
                key: "max_message_len",
                value: 0,
                min: 1,
                max: usize::MAX,
            });
        }
        Ok(self)
    }
}

fn parse_usize(key: &'static str, value: String) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
