use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stagefetch::config::Config;

#[derive(Parser, Debug)]
#[command(name = "stagefetch")]
#[command(about = "Resumable concurrent file downloader", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download URLs into the published directory, resuming partial files
    Fetch(FetchArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// URLs to download, merged with `transfer.urls` from the config file
    pub urls: Vec<String>,

    /// Configuration file (defaults to $STAGEFETCH_CONFIG or config/stagefetch.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding partial downloads
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Directory receiving completed downloads
    #[arg(long)]
    pub published_dir: Option<PathBuf>,

    /// Maximum number of simultaneous transfers
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Attempts per file, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Base of the exponential backoff, in milliseconds
    #[arg(long)]
    pub backoff_base_ms: Option<u64>,

    /// Print the batch outcome as JSON instead of progress bars
    #[arg(long)]
    pub json: bool,
}

impl FetchArgs {
    /// Command-line flags win over file and environment settings
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.staging_dir {
            config.transfer.staging_dir = dir.clone();
        }
        if let Some(dir) = &self.published_dir {
            config.transfer.published_dir = dir.clone();
        }
        if let Some(limit) = self.concurrency {
            config.transfer.concurrency_limit = Some(limit);
        }
        if let Some(attempts) = self.max_attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(base) = self.backoff_base_ms {
            config.retry.backoff_base_ms = base;
        }
    }

    /// Config-file URLs first, then command-line URLs
    pub fn all_urls(&self, config: &Config) -> Vec<String> {
        config
            .transfer
            .urls
            .iter()
            .chain(self.urls.iter())
            .cloned()
            .collect()
    }
}
