use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use fleet_core::CoreError;
use fleet_discovery::DiscoveryError;

use crate::scheduler::DaemonPhase;

/// Error surface for daemon startup and shutdown.
///
/// Startup problems are fatal, and so is a state directory the daemon may not
/// write to. Everything else that happens inside a pass is counted in the
/// ledger instead of surfacing here.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("cannot {action} a daemon in phase {phase:?}")]
    InvalidPhase {
        action: &'static str,
        phase: DaemonPhase,
    },

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("signal handler error: {0}")]
    Signal(String),

    #[error("daemon is not running")]
    NotRunning,
}

/// Process lock failures other than "held by a live process".
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file I/O error: {0}")]
    Persist(#[from] CoreError),

    #[error("failed to signal pid {pid}: {message}")]
    Signal { pid: u32, message: String },
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to persist sync state: {0}")]
    Persist(#[from] CoreError),
}

impl StateError {
    /// Whether the state file could not be written for lack of permission.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Persist(CoreError::Io { source, .. }) => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}

/// Why an executor call did not produce a report.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("executor timed out after {0:?}")]
    Timeout(Duration),

    #[error("executor task panicked or was cancelled: {0}")]
    Join(String),

    #[error("{0}")]
    Failed(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Error, ErrorKind};

    use super::*;

    fn persist(kind: ErrorKind) -> StateError {
        StateError::Persist(fleet_core::error::io_err(
            "/state/sync-status.json",
            Error::new(kind, "boom"),
        ))
    }

    #[test]
    fn only_permission_errors_are_permission_denied() {
        assert!(persist(ErrorKind::PermissionDenied).is_permission_denied());
        assert!(!persist(ErrorKind::WriteZero).is_permission_denied());
        assert!(!persist(ErrorKind::Other).is_permission_denied());
    }

    #[test]
    fn sub_second_timeouts_keep_their_precision() {
        let err = ExecutorError::Timeout(Duration::from_millis(300));
        assert_eq!(err.to_string(), "executor timed out after 300ms");
    }
}
