//! Configuration management for Holo.
//!
//! This module handles loading, saving, and managing Holo configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/holo/config.toml` |
//! | macOS | `~/Library/Application Support/com.holo.Holo/config.toml` |
//! | Windows | `%APPDATA%\holo\Holo\config\config.toml` |
//!
//! A missing file means defaults. The relay URL can also be set with the
//! `HOLO_RELAY_URL` environment variable, which wins over the file. An
//! explicit override ([`Config::with_relay_override`]) wins over both.
//!
//! ## Example
//!
//! ```rust,ignore
//! use holo_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Relay: {}", config.relay_url());
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Holo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay settings
    pub relay: RelayConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Receive settings
    pub receive: ReceiveConfig,
    /// Relay URL given for this run only; never saved
    #[serde(skip)]
    relay_override: Option<String>,
}

/// Relay connection options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket endpoint of the relay
    pub url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: crate::DEFAULT_RELAY_URL.to_string(),
        }
    }
}

/// Transfer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Piece size in bytes
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Receive options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Where received files are saved (current directory if unset)
    pub output_dir: Option<PathBuf>,
    /// Replace existing files instead of picking a free name
    pub overwrite: bool,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read,
    /// parsed, or validated.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check values that would break a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        if self.relay.url.trim().is_empty() {
            return Err(Error::InvalidConfig {
                key: "relay.url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > crate::MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig {
                key: "transfer.chunk_size".to_string(),
                reason: format!(
                    "must be between 1 and {} bytes, got {}",
                    crate::MAX_CHUNK_SIZE,
                    self.transfer.chunk_size
                ),
            });
        }

        Ok(())
    }

    /// Use `url` for this run, ahead of `HOLO_RELAY_URL` and the file.
    #[must_use]
    pub fn with_relay_override(mut self, url: impl Into<String>) -> Self {
        self.relay_override = Some(url.into());
        self
    }

    /// Relay URL to use: the override, then `HOLO_RELAY_URL`, then
    /// `relay.url`.
    #[must_use]
    pub fn relay_url(&self) -> String {
        self.relay_url_with(std::env::var(crate::RELAY_URL_ENV).ok())
    }

    fn relay_url_with(&self, env_override: Option<String>) -> String {
        let non_blank = |url: &String| !url.trim().is_empty();

        self.relay_override
            .clone()
            .filter(non_blank)
            .or_else(|| env_override.filter(non_blank))
            .unwrap_or_else(|| self.relay.url.clone())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "holo", "Holo")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}
