//! Sync ledger persistence at `~/.fleet/state/sync-status.json`.
//!
//! `load` never fails: a missing or corrupt file is the zero-valued ledger.
//! Read-modify-write is the caller's job.

use std::path::{Path, PathBuf};

use fleet_core::{store, SyncStatus};

use crate::error::StateError;

#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> SyncStatus {
        match store::read_json::<SyncStatus>(&self.path) {
            Ok(Some(status)) => status,
            Ok(None) => SyncStatus::default(),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "sync state unreadable; starting from an empty ledger",
                );
                SyncStatus::default()
            }
        }
    }

    pub fn save(&self, status: &SyncStatus) -> Result<(), StateError> {
        store::write_json_atomic(&self.path, status)?;
        Ok(())
    }
}
