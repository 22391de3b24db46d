//! On-disk layout.
//!
//! ```text
//! ~/.fleet/
//!   config.yaml
//!   cache/repositories.json   (discovery cache)
//!   run/daemon.lock           (process lock)
//!   state/sync-status.json    (sync ledger)
//! ```
//!
//! Nothing in the workspace hard-codes these paths; every component receives
//! a [`FleetPaths`] so tests can point independent daemons at separate
//! temp directories.

use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};

pub const FLEET_DIR: &str = ".fleet";
pub const CONFIG_FILE: &str = "config.yaml";
pub const CACHE_FILE: &str = "repositories.json";
pub const LOCK_FILE: &str = "daemon.lock";
pub const STATE_FILE: &str = "sync-status.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetPaths {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub cache_file: PathBuf,
    pub lock_file: PathBuf,
    pub state_file: PathBuf,
}

impl FleetPaths {
    /// Standard layout rooted at `root` (normally `~/.fleet`).
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_file: root.join(CONFIG_FILE),
            cache_file: root.join("cache").join(CACHE_FILE),
            lock_file: root.join("run").join(LOCK_FILE),
            state_file: root.join("state").join(STATE_FILE),
            root,
        }
    }

    /// `<home>/.fleet/…`
    pub fn at(home: &Path) -> Self {
        Self::under(home.join(FLEET_DIR))
    }

    /// `~/.fleet/…` (uses `dirs::home_dir()`).
    pub fn from_home() -> Result<Self, CoreError> {
        let home = dirs::home_dir().ok_or(CoreError::HomeNotFound)?;
        Ok(Self::at(&home))
    }

    /// Create the directories that hold the lock and state files.
    ///
    /// The daemon treats failure here as fatal: without them it can neither
    /// exclude other instances nor record what it did.
    pub fn ensure_runtime_dirs(&self) -> Result<(), CoreError> {
        for file in [&self.lock_file, &self.state_file] {
            if let Some(dir) = file.parent() {
                if !dir.exists() {
                    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
                }
            }
        }
        Ok(())
    }
}
