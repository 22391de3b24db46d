//! Scheduled reconciliation daemon for a repository fleet.
//!
//! [`Daemon`] owns the lifecycle: it takes the [`ProcessLock`], runs a
//! [`SyncExecutor`] once immediately and then every interval, and folds each
//! result into the ledger kept by [`SyncStateStore`].

pub mod action;
mod error;
pub mod executor;
pub mod lock;
mod runtime;
pub mod scheduler;
pub mod state;

pub use action::{CommandAction, ConfiguredAction, NoopAction, RepoAction};
pub use error::{DaemonError, ExecutorError, LockError, StateError};
pub use executor::{ExecutionReport, FleetExecutor, FnExecutor, SyncExecutor};
pub use lock::{pid_is_alive, ProcessLock};
pub use runtime::{
    build_daemon, build_executor, discoverer, init_tracing, run, run_once_blocking,
    start_blocking, ConfiguredExecutor, LOG_FORMAT_ENV,
};
pub use scheduler::{holder, is_running, status, Daemon, DaemonOptions, DaemonPhase, PassReport};
pub use state::SyncStateStore;
