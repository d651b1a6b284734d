//! Configuration management for ulog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::token::DEFAULT_VERSION;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "ulog";

/// Prefix of configuration environment variables.
const ENV_PREFIX: &str = "ULOG_";

/// Smallest stream window the reader accepts.
pub const MIN_BUFFER_SIZE: usize = 256;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables, `ULOG_<SECTION>__<KEY>` (e.g. `ULOG_WRITER__SYNC_INTERVAL`)
/// 2. TOML config file at `~/.config/ulog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Token reader options.
    pub reader: ReaderOptions,
    /// Token writer options.
    pub writer: WriterOptions,
}

/// Token reader options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Initial capacity of the stream reader window in bytes.
    pub initial_buffer_size: usize,
    /// Largest payload materialized in the fixed scratch buffer; larger
    /// payloads use pooled buffers.
    pub scratch_threshold: usize,
    /// Bytes requested from the underlying stream per read call.
    pub read_chunk_size: usize,
}

/// Token writer options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Write a synchronization frame after every N data tokens.
    /// `None` or 0 disables injection.
    pub sync_interval: Option<u32>,
    /// Version byte written into new file headers.
    pub header_version: u8,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            initial_buffer_size: 64 * 1024,
            scratch_threshold: 1024,
            read_chunk_size: 8 * 1024,
        }
    }
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            sync_interval: None,
            header_version: DEFAULT_VERSION,
        }
    }
}

impl WriterOptions {
    /// The sync interval with 0 folded into `None`.
    #[must_use]
    pub fn effective_sync_interval(&self) -> Option<u32> {
        self.sync_interval.filter(|&n| n > 0)
    }

    /// Options that inject a sync frame after every `interval` data tokens.
    #[must_use]
    pub fn with_sync_interval(mut self, interval: u32) -> Self {
        self.sync_interval = Some(interval);
        self
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `ULOG_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.reader.initial_buffer_size < MIN_BUFFER_SIZE {
            return Err(Error::ConfigValidation {
                message: format!(
                    "initial_buffer_size ({}) must be at least {MIN_BUFFER_SIZE}",
                    self.reader.initial_buffer_size
                ),
            });
        }

        if self.reader.scratch_threshold == 0 {
            return Err(Error::ConfigValidation {
                message: "scratch_threshold must be greater than 0".to_string(),
            });
        }

        if self.reader.read_chunk_size == 0 {
            return Err(Error::ConfigValidation {
                message: "read_chunk_size must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
