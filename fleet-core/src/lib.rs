//! Fleet core library: domain types, file layout, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: repositories, lock records, and the sync ledger
//! - [`paths`]: [`FleetPaths`], every file the daemon touches
//! - [`config`]: `~/.fleet/config.yaml`
//! - [`store`]: atomic JSON read/write shared by the persisted files
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod store;
pub mod types;

pub use config::FleetConfig;
pub use error::CoreError;
pub use paths::FleetPaths;
pub use types::{
    LockRecord, Organization, RepoOutcome, RepoSyncState, RepoSyncStatus, Repository,
    SyncStatus, Visibility,
};
