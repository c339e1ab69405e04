//! One logical download: descriptor, lifecycle state and the unit driving it

mod unit;

pub use unit::{TerminalResult, TransferUnit};

use serde::Serialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::DescriptorError;

/// Identifies one download and the two paths it moves through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    source_url: String,
    resource_name: String,
    staging_path: PathBuf,
    published_path: PathBuf,
}

impl TransferDescriptor {
    pub fn new(
        source_url: &str,
        staging_dir: &Path,
        published_dir: &Path,
    ) -> Result<Self, DescriptorError> {
        let resource_name = resource_name_for(source_url)?;
        Ok(Self {
            source_url: source_url.to_string(),
            staging_path: staging_dir.join(&resource_name),
            published_path: published_dir.join(&resource_name),
            resource_name,
        })
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    pub fn published_path(&self) -> &Path {
        &self.published_path
    }
}

/// Final path segment of the URL, used verbatim as the file name
pub fn resource_name_for(source_url: &str) -> Result<String, DescriptorError> {
    let url = Url::parse(source_url).map_err(|e| DescriptorError::InvalidUrl {
        url: source_url.to_string(),
        reason: e.to_string(),
    })?;

    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| DescriptorError::NoResourceName(source_url.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Succeeded | TransferStatus::Failed)
    }
}

/// Mutable per-transfer state, owned by exactly one [`TransferUnit`] run
#[derive(Debug, Clone)]
pub struct TransferState {
    /// Staging file size at the start of the current attempt
    pub bytes_on_disk: u64,
    pub attempt_count: u32,
    pub max_attempts: u32,
    status: TransferStatus,
    last_error: Option<String>,
}

impl TransferState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            bytes_on_disk: 0,
            attempt_count: 0,
            max_attempts,
            status: TransferStatus::Pending,
            last_error: None,
        }
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns false once the transfer is terminal; terminal states absorb.
    pub fn begin_attempt(&mut self, bytes_on_disk: u64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TransferStatus::InProgress;
        self.bytes_on_disk = bytes_on_disk;
        self.attempt_count += 1;
        true
    }

    pub fn record_error(&mut self, error: impl ToString) {
        if !self.status.is_terminal() {
            self.last_error = Some(error.to_string());
        }
    }

    pub fn succeed(&mut self) -> bool {
        self.finish(TransferStatus::Succeeded)
    }

    pub fn fail(&mut self, error: impl ToString) -> bool {
        self.record_error(error);
        self.finish(TransferStatus::Failed)
    }

    fn finish(&mut self, status: TransferStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}
