use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "STAGEFETCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/stagefetch.toml";
const ENV_PREFIX: &str = "STAGEFETCH";
const ENV_SEPARATOR: &str = "__";

/// Path of the config file: `STAGEFETCH_CONFIG` or the default location
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration with priority (lowest to highest):
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if it exists)
/// 3. `.env` file values
/// 4. Process environment
pub fn load(config_path: Option<&Path>) -> Result<Config, ConfigError> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let path = config_path.map(Path::to_path_buf).unwrap_or_else(default_path);
    load_from_sources(&path)
}

/// Load from a specific file plus the process environment
pub fn load_from_sources(config_path: &Path) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // STAGEFETCH__RETRY__MAX_ATTEMPTS -> retry.max_attempts
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
