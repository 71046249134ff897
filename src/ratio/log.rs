//! Append-only JSON-lines log of ratio snapshots.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::{RatioError, RatioSnapshot};

/// One snapshot per line, oldest first.
#[derive(Debug, Clone)]
pub struct SnapshotLog {
    path: PathBuf,
}

impl SnapshotLog {
    /// Uses `path` as the log file; it is created on first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> RatioError {
        RatioError::Log {
            path: self.path.clone(),
            source,
        }
    }

    /// Appends one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RatioError::Log`] on IO failure.
    pub async fn append(&self, snapshot: &RatioSnapshot) -> Result<(), RatioError> {
        let mut line = serde_json::to_string(snapshot)
            .map_err(|error| self.io_error(io::Error::new(io::ErrorKind::InvalidData, error)))?;
        line.push('\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| self.io_error(error))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|error| self.io_error(error))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|error| self.io_error(error))?;
        file.flush().await.map_err(|error| self.io_error(error))
    }

    /// Returns the newest readable snapshot. Corrupt lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RatioError::Log`] when the file exists but cannot be read.
    pub async fn latest(&self) -> Result<Option<RatioSnapshot>, RatioError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(error)),
        };

        for line in raw.lines().rev().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<RatioSnapshot>(line) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(error) => {
                    warn!(path = %self.path.display(), error = %error, "Skipping corrupt snapshot line");
                }
            }
        }
        Ok(None)
    }
}
