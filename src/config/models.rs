use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::transport::HttpConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Where files are staged and published, and how many run at once
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default = "default_published_dir")]
    pub published_dir: PathBuf,
    /// Absent means every transfer starts immediately
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
    /// Merged with URLs given on the command line
    #[serde(default)]
    pub urls: Vec<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            published_dir: default_published_dir(),
            concurrency_limit: None,
            urls: Vec::new(),
        }
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_published_dir() -> PathBuf {
    PathBuf::from("completed")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            max_backoff: self.max_backoff_ms.map(Duration::from_millis),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> Option<u64> {
    Some(10_000)
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl HttpSettings {
    pub fn client_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: self.read_timeout_secs.map(Duration::from_secs),
            max_redirects: self.max_redirects,
            user_agent: self.user_agent.clone(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> Option<u64> {
    Some(30)
}

fn default_user_agent() -> String {
    format!("stagefetch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_redirects() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProgressConfig {
    /// Minimum spacing of byte-count events when the total size is unknown
    #[serde(default = "default_byte_report_interval_ms")]
    pub byte_report_interval_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            byte_report_interval_ms: default_byte_report_interval_ms(),
        }
    }
}

impl ProgressConfig {
    pub fn byte_interval(&self) -> Duration {
        Duration::from_millis(self.byte_report_interval_ms)
    }
}

fn default_byte_report_interval_ms() -> u64 {
    500
}
