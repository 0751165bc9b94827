//! Executor configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default upper bound on nested call depth
pub const DEFAULT_MAX_CALL_DEPTH: usize = 8;

/// Default upper bound on transaction payload size (64 KiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

// ================================
// Configuration Types
// ================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Abort and revert the attempt when the underlying call fails.
    /// When false, the attempt finalizes with `success = false` and the nonce
    /// is still consumed.
    pub revert_on_call_failure: bool,

    /// Maximum nested call depth below the top-level call
    pub max_call_depth: usize,

    /// Largest accepted payload in bytes
    pub max_payload_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            revert_on_call_failure: true,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ExecutorConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_size == 0 {
            return Err(ConfigError::Invalid("max_payload_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn keep_failed_calls(mut self) -> Self {
        self.revert_on_call_failure = false;
        self
    }
}
