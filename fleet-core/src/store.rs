//! Atomic JSON persistence shared by the cache, lock, and ledger files.
//!
//! Writes go to `<path>.tmp` and are renamed over `<path>`, so a reader (or a
//! crash) only ever observes the previous complete file or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, CoreError};

/// Sibling temp path used during an atomic write.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read and parse a JSON file.
///
/// `Ok(None)` when the file does not exist; `Err` for unreadable or malformed
/// content so callers can decide how to degrade.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| CoreError::ParseJson {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// Creates the parent directory if needed.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("path has no parent")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(value)?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, err));
    }
    Ok(())
}

/// Remove `path`, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<bool, CoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_err(path, err)),
    }
}
