//! Whole-file JSON persistence shared by the queue, emergency state and
//! acquisition ledger.
//!
//! Writes go to a sibling temp file which is fsynced and then renamed over the
//! target, so a crash leaves either the old or the new contents on disk.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Errors from reading or writing a persisted JSON document.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The file exists but does not contain the expected JSON document.
    #[error(
        "malformed JSON in {path}: {source}\n  Suggestion: Fix or move the file aside; it is never overwritten while unreadable"
    )]
    Malformed {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and parses a JSON document. A missing file yields `Ok(None)`.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(PersistError::io(path, error)),
    };

    // A blank file is what a hand-edit that deleted everything leaves behind.
    if raw.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| PersistError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

/// Serializes `value` as pretty JSON and atomically replaces `path` with it.
pub(crate) async fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), PersistError> {
    let mut body = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    body.push(b'\n');

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .await
            .map_err(|error| PersistError::io(parent, error))?;
    }

    let tmp_path = temp_path_for(path);
    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|error| PersistError::io(&tmp_path, error))?;
    file.write_all(&body)
        .await
        .map_err(|error| PersistError::io(&tmp_path, error))?;
    file.sync_all()
        .await
        .map_err(|error| PersistError::io(&tmp_path, error))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .await
        .map_err(|error| PersistError::io(path, error))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
