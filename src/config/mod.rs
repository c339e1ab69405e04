//! Configuration for stagefetch
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are applied on top by the binary.
//!
//! # Environment Variables
//!
//! Any key can be overridden with `STAGEFETCH__<section>__<key>`, for example
//! `STAGEFETCH__RETRY__MAX_ATTEMPTS=5` or
//! `STAGEFETCH__TRANSFER__STAGING_DIR=/var/tmp/stagefetch`.
//!
//! # Configuration File
//!
//! Read from `config/stagefetch.toml` unless `STAGEFETCH_CONFIG` points
//! elsewhere. A missing file is not an error.

mod models;
mod sources;
mod validation;

pub use models::{Config, HttpSettings, ProgressConfig, RetryConfig, TransferConfig};
pub use validation::ValidationError;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load from the default file location and the environment.
    ///
    /// The result is not validated yet: apply command-line overrides first,
    /// then call [`Config::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        Ok(sources::load(None)?)
    }

    /// Load from `path` (missing is fine) and the environment, unvalidated
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        Ok(sources::load(Some(path))?)
    }

    /// Check invariants once every layer, overrides included, is applied
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}
