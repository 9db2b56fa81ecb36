//! Configuration management for imagepress
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use imagepress::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Consuming from: {}", config.queue.task_channel);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `IMAGEPRESS__<section>__<key>`
//!
//! Examples:
//! - `IMAGEPRESS__WORKER__ACK_POLICY=redeliver`
//! - `IMAGEPRESS__RETRY__MAX_ATTEMPTS=5`
//! - `IMAGEPRESS__FETCH__MAX_BODY_BYTES=20MB`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/imagepress.toml`.
//! This can be overridden using the `IMAGEPRESS_CONFIG` environment variable
//! or the `--config` flag.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    AckPolicy, Config, FetchSettings, LedgerConfig, QueueConfig, RetrySettings, ServerConfig,
    StorageConfig, StorageProvider, TelemetryConfig, TranscodeSettings, WorkerSettings,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Same as [`Config::load`] with an explicit file taking precedence
    pub fn load_with(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, without secrets
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
