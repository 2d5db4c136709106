//! Engine configuration.
//!
//! Parsed from TOML. Every field has a default, so an empty document is a
//! valid configuration. Validation runs at parse time: a configuration that
//! parses is one the report layer can use without further checks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::MAX_LINE_IDS_PER_REQUEST;
use crate::promotion::ReleaseChannel;

/// Default transaction lookback window, in days.
pub const DEFAULT_FETCH_WINDOW_DAYS: u32 = 90;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration is structurally valid but semantically wrong.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Engine configuration for the report layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Transaction lookback window handed to the ledger reads, in days.
    pub fetch_window_days: u32,

    /// Transaction ids per batch line-read request.
    pub line_chunk_size: usize,

    /// Release channels the report layer gates, by name.
    pub target_channels: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_window_days: DEFAULT_FETCH_WINDOW_DAYS,
            line_chunk_size: crate::ledger::LINE_BATCH_CHUNK_SIZE,
            target_channels: vec![
                "beta".to_string(),
                "stable".to_string(),
                "lts".to_string(),
            ],
        }
    }
}

impl EngineConfig {
    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses a configuration from a TOML string and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, the chunk size is zero or
    /// exceeds the store request limit, the window is zero, or a target
    /// channel name is unknown.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a zero or oversized chunk
    /// size, a zero window, or an unknown channel name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_window_days == 0 {
            return Err(ConfigError::Validation(
                "fetch_window_days must be at least 1".to_string(),
            ));
        }
        if self.line_chunk_size == 0 {
            return Err(ConfigError::Validation(
                "line_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.line_chunk_size > MAX_LINE_IDS_PER_REQUEST {
            return Err(ConfigError::Validation(format!(
                "line_chunk_size {} exceeds the store request limit of {}",
                self.line_chunk_size, MAX_LINE_IDS_PER_REQUEST
            )));
        }
        for name in &self.target_channels {
            ReleaseChannel::parse(name)
                .map_err(|err| ConfigError::Validation(err.to_string()))?;
        }
        Ok(())
    }

    /// The configured target channels, parsed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an unknown channel name;
    /// cannot fail on a configuration that passed [`Self::validate`].
    pub fn channels(&self) -> Result<Vec<ReleaseChannel>, ConfigError> {
        self.target_channels
            .iter()
            .map(|name| {
                ReleaseChannel::parse(name)
                    .map_err(|err| ConfigError::Validation(err.to_string()))
            })
            .collect()
    }
}
