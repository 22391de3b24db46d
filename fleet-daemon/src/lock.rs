//! PID-stamped lock file for single-instance exclusion.
//!
//! Advisory and single-host: two daemons started at the same instant can both
//! pass the liveness check. Operator-triggered starts make that acceptable.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use fleet_core::{store, CoreError, LockRecord};

use crate::error::LockError;

/// Whether `pid` names a live process, via `kill(pid, 0)`.
///
/// `EPERM` means the process exists but belongs to someone else, so it
/// counts as alive.
pub fn pid_is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // 0 would probe our own process group.
    if raw <= 0 {
        return false;
    }
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[derive(Debug, Clone)]
pub struct ProcessLock {
    path: PathBuf,
    pid: u32,
}

impl ProcessLock {
    /// Lock at `path` on behalf of the current process.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_pid(path, std::process::id())
    }

    /// Lock at `path` on behalf of an explicit `pid`.
    pub fn with_pid(path: impl Into<PathBuf>, pid: u32) -> Self {
        Self {
            path: path.into(),
            pid,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The record on disk; `None` when absent or unreadable.
    pub fn read(&self) -> Option<LockRecord> {
        match store::read_json::<LockRecord>(&self.path) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "unreadable lock file");
                None
            }
        }
    }

    /// Like [`read`](Self::read), but only a file that parses badly counts as
    /// absent. I/O failures are returned.
    fn read_strict(&self) -> Result<Option<LockRecord>, LockError> {
        match store::read_json::<LockRecord>(&self.path) {
            Ok(record) => Ok(record),
            Err(err @ CoreError::ParseJson { .. }) => {
                tracing::warn!(path = %self.path.display(), error = %err, "corrupt lock file");
                Ok(None)
            }
            Err(err) => Err(LockError::Persist(err)),
        }
    }

    /// The record on disk, only if its process is still alive.
    pub fn holder(&self) -> Option<LockRecord> {
        self.read().filter(|record| pid_is_alive(record.pid))
    }

    /// Take the lock unless a live process already holds it.
    ///
    /// A stale record (dead pid) or a corrupt file is removed first. A lock
    /// file that cannot be read is left alone and reported as an error.
    pub fn try_acquire(&self) -> Result<bool, LockError> {
        if self.path.exists() {
            match self.read_strict()? {
                Some(record) if pid_is_alive(record.pid) => {
                    tracing::debug!(holder = record.pid, "lock held by live process");
                    return Ok(false);
                }
                Some(record) => {
                    tracing::warn!(
                        stale_pid = record.pid,
                        started_at = %record.started_at,
                        "reclaiming stale lock",
                    );
                }
                None => {
                    tracing::warn!(path = %self.path.display(), "replacing corrupt lock file");
                }
            }
            store::remove_if_exists(&self.path)?;
        }

        let record = LockRecord {
            pid: self.pid,
            ..LockRecord::current()
        };
        store::write_json_atomic(&self.path, &record)?;
        tracing::debug!(pid = self.pid, path = %self.path.display(), "lock acquired");
        Ok(true)
    }

    /// Remove the lock file. Calling it when nothing is held is a no-op.
    pub fn release(&self) -> Result<(), LockError> {
        if store::remove_if_exists(&self.path)? {
            tracing::debug!(path = %self.path.display(), "lock released");
        }
        Ok(())
    }

    /// Send SIGTERM to the live holder, if any. Returns the signalled pid.
    pub fn terminate_holder(&self) -> Result<Option<u32>, LockError> {
        let Some(record) = self.holder() else {
            return Ok(None);
        };
        let raw = i32::try_from(record.pid).map_err(|_| LockError::Signal {
            pid: record.pid,
            message: "pid out of range".to_string(),
        })?;
        kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|errno| LockError::Signal {
            pid: record.pid,
            message: errno.to_string(),
        })?;
        Ok(Some(record.pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    /// Pid of a process that has already exited and been reaped.
    fn dead_pid() -> u32 {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("wait");
        pid
    }

    fn lock_path(tmp: &TempDir) -> PathBuf {
        tmp.path().join("run").join("daemon.lock")
    }

    #[test]
    fn current_process_is_alive_and_zero_is_not() {
        assert!(pid_is_alive(std::process::id()));
        assert!(!pid_is_alive(0));
        assert!(!pid_is_alive(u32::MAX));
    }

    #[test]
    fn acquire_writes_record_with_own_pid() {
        let tmp = TempDir::new().unwrap();
        let lock = ProcessLock::new(lock_path(&tmp));
        assert!(lock.try_acquire().unwrap());

        let record = lock.read().expect("record written");
        assert_eq!(record.pid, std::process::id());
        assert_eq!(lock.holder(), Some(record));
    }

    #[test]
    fn second_acquire_fails_while_holder_is_live() {
        let tmp = TempDir::new().unwrap();
        let a = ProcessLock::new(lock_path(&tmp));
        let b = ProcessLock::with_pid(lock_path(&tmp), dead_pid());

        assert!(a.try_acquire().unwrap());
        assert!(!b.try_acquire().unwrap());

        a.release().unwrap();
        assert!(b.try_acquire().unwrap());
        assert_eq!(b.read().unwrap().pid, b.pid());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path(&tmp);
        let stale = ProcessLock::with_pid(&path, dead_pid());
        assert!(stale.try_acquire().unwrap());
        assert!(stale.holder().is_none(), "recorded pid is not live");

        let lock = ProcessLock::new(&path);
        assert!(lock.try_acquire().unwrap());
        assert_eq!(lock.read().unwrap().pid, std::process::id());
    }

    #[test]
    fn corrupt_lock_file_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "pid=12").unwrap();

        let lock = ProcessLock::new(&path);
        assert!(lock.read().is_none());
        assert!(lock.try_acquire().unwrap());
        assert!(lock.read().is_some());
    }

    #[test]
    fn unreadable_lock_file_is_an_error_and_kept() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path(&tmp);
        // Reading a directory fails with an I/O error, not a parse error.
        std::fs::create_dir_all(&path).unwrap();

        let lock = ProcessLock::new(&path);
        let err = lock.try_acquire().unwrap_err();
        assert!(matches!(err, LockError::Persist(CoreError::Io { .. })), "got: {err}");
        assert!(path.is_dir());
    }

    #[test]
    fn release_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let lock = ProcessLock::new(lock_path(&tmp));
        lock.release().unwrap();
        assert!(lock.try_acquire().unwrap());
        lock.release().unwrap();
        lock.release().unwrap();
        assert!(!lock.path().exists());
    }

    #[test]
    fn lock_file_uses_documented_shape() {
        let tmp = TempDir::new().unwrap();
        let lock = ProcessLock::new(lock_path(&tmp));
        lock.try_acquire().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(lock.path()).unwrap()).unwrap();
        assert_eq!(raw["pid"], std::process::id());
        assert!(raw["startedAt"].is_string());
    }

    #[test]
    fn terminate_holder_without_live_holder_is_none() {
        let tmp = TempDir::new().unwrap();
        let lock = ProcessLock::with_pid(lock_path(&tmp), dead_pid());
        lock.try_acquire().unwrap();
        assert_eq!(lock.terminate_holder().unwrap(), None);
    }
}
