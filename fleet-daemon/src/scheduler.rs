//! Daemon lifecycle and the self-re-arming sync loop.
//!
//! ```text
//! Idle -> Starting -> Running -> ShuttingDown -> Stopped
//!            \____________(lock held elsewhere)___/
//! ```
//!
//! Passes never overlap: the next wait is armed only after the previous
//! pass has been persisted, so consecutive pass starts are separated by at
//! least `duration + interval`. A pass that is already running when shutdown
//! begins is allowed to finish; the wait before the next one is cancelled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use fleet_core::config::ScheduleConfig;
use fleet_core::{FleetPaths, LockRecord, SyncStatus};

use crate::error::{DaemonError, ExecutorError};
use crate::executor::{ExecutionReport, SyncExecutor};
use crate::lock::ProcessLock;
use crate::state::SyncStateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonPhase {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOptions {
    /// Wait between the end of one pass and the start of the next.
    pub interval: Duration,
    /// When false only the initial pass runs.
    pub enabled: bool,
    pub executor_timeout: Option<Duration>,
    /// Install SIGTERM/SIGINT handlers that trigger a graceful stop.
    pub handle_signals: bool,
}

impl DaemonOptions {
    pub fn from_schedule(schedule: &ScheduleConfig) -> Self {
        Self {
            interval: schedule.interval(),
            enabled: schedule.enabled,
            executor_timeout: schedule.executor_timeout(),
            handle_signals: true,
        }
    }
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self::from_schedule(&ScheduleConfig::default())
    }
}

/// Result of one completed pass, as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// 1-based pass number within this daemon instance.
    pub pass: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub next_sync: Option<DateTime<Utc>>,
    pub success: bool,
    pub message: String,
}

/// Handle to a daemon instance. Clones share the same instance.
pub struct Daemon<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Daemon<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<E> {
    paths: FleetPaths,
    options: DaemonOptions,
    executor: E,
    lock: ProcessLock,
    store: SyncStateStore,
    phase: watch::Sender<DaemonPhase>,
    shutdown_requested: AtomicBool,
    cancel: watch::Sender<bool>,
    // Held for the duration of every pass; stop() takes it to wait out an
    // in-flight pass before releasing the lock.
    pass_gate: tokio::sync::Mutex<()>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    signal_task: Mutex<Option<JoinHandle<()>>>,
    passes: AtomicU64,
    // First error that forced the daemon down on its own.
    fatal: Mutex<Option<DaemonError>>,
}

impl<E: SyncExecutor> Daemon<E> {
    pub fn new(paths: FleetPaths, options: DaemonOptions, executor: E) -> Self {
        let lock = ProcessLock::new(&paths.lock_file);
        let store = SyncStateStore::new(&paths.state_file);
        let (phase, _) = watch::channel(DaemonPhase::Idle);
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                paths,
                options,
                executor,
                lock,
                store,
                phase,
                shutdown_requested: AtomicBool::new(false),
                cancel,
                pass_gate: tokio::sync::Mutex::new(()),
                scheduler_task: Mutex::new(None),
                signal_task: Mutex::new(None),
                passes: AtomicU64::new(0),
                fatal: Mutex::new(None),
            }),
        }
    }

    pub fn phase(&self) -> DaemonPhase {
        *self.inner.phase.borrow()
    }

    pub fn paths(&self) -> &FleetPaths {
        &self.inner.paths
    }

    pub fn options(&self) -> &DaemonOptions {
        &self.inner.options
    }

    /// Passes started by this instance so far.
    pub fn passes(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<DaemonPhase> {
        self.inner.phase.subscribe()
    }

    /// Take the lock, run the first pass, then arm the schedule.
    ///
    /// Returns once the initial pass has been persisted. Fails with
    /// [`DaemonError::AlreadyRunning`] when another live process holds the
    /// lock; the instance is then `Stopped` and nothing was executed.
    pub async fn start(&self) -> Result<PassReport, DaemonError> {
        self.begin("start")?;
        self.acquire()?;

        if self.inner.options.handle_signals {
            match spawn_signal_listener(self.clone()) {
                Ok(handle) => store_handle(&self.inner.signal_task, handle),
                Err(err) => {
                    self.abandon_start();
                    return Err(err);
                }
            }
        }

        if !self.advance(DaemonPhase::Starting, DaemonPhase::Running) {
            self.abandon_start();
            return Err(DaemonError::NotRunning);
        }
        tracing::info!(
            pid = self.inner.lock.pid(),
            interval_secs = self.inner.options.interval.as_secs(),
            scheduled = self.inner.options.enabled,
            "daemon started",
        );

        let report = self.inner.initial_pass().await;
        if let Some(err) = self.inner.take_fatal() {
            self.abandon_start();
            return Err(err);
        }

        if !self.inner.options.enabled {
            tracing::info!("scheduled sync disabled; only the initial pass runs");
        } else if !self.inner.is_shutdown_requested() {
            let inner = self.inner.clone();
            let handle = tokio::spawn(async move { inner.schedule_loop().await });
            store_handle(&self.inner.scheduler_task, handle);
        }

        Ok(report)
    }

    /// Run exactly one pass under the lock, then release it.
    pub async fn run_once(&self) -> Result<PassReport, DaemonError> {
        self.begin("run")?;
        self.acquire()?;
        if !self.advance(DaemonPhase::Starting, DaemonPhase::Running) {
            self.abandon_start();
            return Err(DaemonError::NotRunning);
        }

        let report = self.inner.initial_pass().await;

        self.inner.shutdown_requested.store(true, Ordering::SeqCst);
        let released = self.inner.lock.release();
        self.inner.phase.send_replace(DaemonPhase::Stopped);
        if let Some(err) = self.inner.take_fatal() {
            return Err(err);
        }
        released?;
        Ok(report)
    }

    /// Graceful shutdown. Safe to call more than once and from any task.
    ///
    /// Cancels the pending wait, lets an in-flight pass finish, then releases
    /// the lock. Later calls wait for the first one to complete.
    pub async fn stop(&self) -> Result<(), DaemonError> {
        let inner = &self.inner;
        if inner.shutdown_requested.swap(true, Ordering::SeqCst) {
            tracing::debug!("shutdown already requested");
            self.wait().await;
            return Ok(());
        }

        if matches!(self.phase(), DaemonPhase::Idle | DaemonPhase::Stopped) {
            inner.phase.send_replace(DaemonPhase::Stopped);
            return Ok(());
        }

        inner.phase.send_replace(DaemonPhase::ShuttingDown);
        tracing::info!("daemon shutting down");
        inner.cancel.send_replace(true);

        if let Some(handle) = take_handle(&inner.signal_task) {
            handle.abort();
        }

        // Wait out a pass that is already running.
        drop(inner.pass_gate.lock().await);

        if let Some(handle) = take_handle(&inner.scheduler_task) {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::error!(error = %err, "scheduler task failed");
                }
            }
        }

        let released = inner.lock.release();
        inner.phase.send_replace(DaemonPhase::Stopped);
        tracing::info!(passes = self.passes(), "daemon stopped");
        released?;
        Ok(())
    }

    /// The error that stopped the daemon without a `stop()` call, if any.
    ///
    /// Taken at most once.
    pub fn take_fatal(&self) -> Option<DaemonError> {
        self.inner.take_fatal()
    }

    /// Resolve once the daemon reaches `Stopped`.
    pub async fn wait(&self) {
        let mut phase = self.inner.phase.subscribe();
        loop {
            if *phase.borrow_and_update() == DaemonPhase::Stopped {
                return;
            }
            if phase.changed().await.is_err() {
                return;
            }
        }
    }

    fn begin(&self, action: &'static str) -> Result<(), DaemonError> {
        if self.advance(DaemonPhase::Idle, DaemonPhase::Starting) {
            Ok(())
        } else {
            Err(DaemonError::InvalidPhase {
                action,
                phase: self.phase(),
            })
        }
    }

    /// Compare-and-set on the phase; false when it was not `from`.
    fn advance(&self, from: DaemonPhase, to: DaemonPhase) -> bool {
        self.inner.phase.send_if_modified(|phase| {
            if *phase == from {
                *phase = to;
                true
            } else {
                false
            }
        })
    }

    fn acquire(&self) -> Result<(), DaemonError> {
        let inner = &self.inner;
        let acquired = inner
            .paths
            .ensure_runtime_dirs()
            .map_err(DaemonError::from)
            .and_then(|()| inner.lock.try_acquire().map_err(DaemonError::from));

        match acquired {
            Ok(true) => Ok(()),
            Ok(false) => {
                let pid = inner.lock.holder().map(|record| record.pid).unwrap_or(0);
                tracing::warn!(holder = pid, "another daemon already holds the lock");
                inner.phase.send_replace(DaemonPhase::Stopped);
                Err(DaemonError::AlreadyRunning { pid })
            }
            Err(err) => {
                inner.phase.send_replace(DaemonPhase::Stopped);
                Err(err)
            }
        }
    }

    fn abandon_start(&self) {
        if let Some(handle) = take_handle(&self.inner.signal_task) {
            handle.abort();
        }
        if let Err(err) = self.inner.lock.release() {
            tracing::warn!(error = %err, "failed to release lock after aborted start");
        }
        self.inner.phase.send_replace(DaemonPhase::Stopped);
    }
}

impl<E: SyncExecutor> Inner<E> {
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    fn take_fatal(&self) -> Option<DaemonError> {
        match self.fatal.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Record `err` and begin shutting down from inside a pass.
    ///
    /// The pass gate is held here, so `stop()` cannot be used; the schedule
    /// loop finishes the shutdown once the pass returns.
    fn fail(&self, err: DaemonError) {
        tracing::error!(error = %err, "fatal error; daemon shutting down");
        match self.fatal.lock() {
            Ok(mut guard) => {
                guard.get_or_insert(err);
            }
            Err(poisoned) => {
                poisoned.into_inner().get_or_insert(err);
            }
        }
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.cancel.send_replace(true);
        self.phase.send_if_modified(|phase| {
            if *phase == DaemonPhase::Running {
                *phase = DaemonPhase::ShuttingDown;
                true
            } else {
                false
            }
        });
    }

    fn has_failed(&self) -> bool {
        match self.fatal.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    async fn schedule_loop(self: Arc<Self>) {
        let mut cancel = self.cancel.subscribe();
        loop {
            if self.is_shutdown_requested() {
                break;
            }
            tracing::debug!(
                delay_secs = self.options.interval.as_secs(),
                "next pass scheduled"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.options.interval) => {}
                _ = cancel.changed() => break,
            }
            if self.scheduled_pass().await.is_none() {
                break;
            }
        }
        tracing::debug!("scheduler loop exited");

        if self.has_failed() {
            if let Some(handle) = take_handle(&self.signal_task) {
                handle.abort();
            }
            if let Err(err) = self.lock.release() {
                tracing::warn!(error = %err, "failed to release lock after fatal error");
            }
            self.phase.send_replace(DaemonPhase::Stopped);
            tracing::info!(passes = self.passes.load(Ordering::SeqCst), "daemon stopped");
        }
    }

    async fn initial_pass(self: &Arc<Self>) -> PassReport {
        let _gate = self.pass_gate.lock().await;
        self.execute_pass().await
    }

    /// `None` when shutdown began while waiting for the gate.
    async fn scheduled_pass(self: &Arc<Self>) -> Option<PassReport> {
        let _gate = self.pass_gate.lock().await;
        if self.is_shutdown_requested() {
            return None;
        }
        Some(self.execute_pass().await)
    }

    async fn execute_pass(self: &Arc<Self>) -> PassReport {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        let clock = tokio::time::Instant::now();
        tracing::info!(pass, "sync pass started");

        let (success, message, outcomes) = match self.invoke_executor().await {
            Ok(report) => (report.success, report.message, report.repositories),
            Err(err) => (false, err.to_string(), Vec::new()),
        };
        let finished_at = Utc::now();

        let mut status = self.store.load();
        status.record_pass(
            started_at,
            finished_at,
            chrono_interval(self.options.interval),
            success,
            &outcomes,
        );
        if let Err(err) = self.store.save(&status) {
            if err.is_permission_denied() {
                self.fail(DaemonError::State(err));
            } else {
                tracing::error!(
                    pass,
                    path = %self.store.path().display(),
                    error = %err,
                    "failed to persist sync state",
                );
            }
        }

        let duration_ms = clock.elapsed().as_millis();
        if success {
            tracing::info!(
                pass,
                duration_ms,
                success_count = status.success_count,
                %message,
                "sync pass succeeded",
            );
        } else {
            tracing::warn!(
                pass,
                duration_ms,
                failure_count = status.failure_count,
                %message,
                "sync pass failed",
            );
        }

        PassReport {
            pass,
            started_at,
            finished_at,
            next_sync: status.next_sync,
            success,
            message,
        }
    }

    /// Run the executor on its own task so a panic becomes a failed pass.
    async fn invoke_executor(self: &Arc<Self>) -> Result<ExecutionReport, ExecutorError> {
        let inner = self.clone();
        let mut handle = tokio::spawn(async move { inner.executor.execute().await });

        let joined = match self.options.executor_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    // Wait for the abort to land so the executor's own tasks
                    // are dropped before this pass is recorded.
                    handle.abort();
                    let _ = handle.await;
                    return Err(ExecutorError::Timeout(limit));
                }
            },
            None => handle.await,
        };
        joined.map_err(|err| ExecutorError::Join(err.to_string()))?
    }
}

/// Whether a live daemon holds the lock under `paths`.
pub fn is_running(paths: &FleetPaths) -> bool {
    holder(paths).is_some()
}

/// The live lock holder under `paths`, if any.
pub fn holder(paths: &FleetPaths) -> Option<LockRecord> {
    ProcessLock::new(&paths.lock_file).holder()
}

/// The persisted ledger under `paths`; zero-valued when none exists.
pub fn status(paths: &FleetPaths) -> SyncStatus {
    SyncStateStore::new(&paths.state_file).load()
}

fn chrono_interval(interval: Duration) -> chrono::Duration {
    chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

fn store_handle(slot: &Mutex<Option<JoinHandle<()>>>, handle: JoinHandle<()>) {
    match slot.lock() {
        Ok(mut guard) => *guard = Some(handle),
        Err(poisoned) => *poisoned.into_inner() = Some(handle),
    }
}

fn take_handle(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

fn spawn_signal_listener<E: SyncExecutor>(
    daemon: Daemon<E>,
) -> Result<JoinHandle<()>, DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| DaemonError::Signal(format!("SIGTERM handler: {e}")))?;
    let mut interrupt = signal(SignalKind::interrupt())
        .map_err(|e| DaemonError::Signal(format!("SIGINT handler: {e}")))?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = terminate.recv() => "SIGTERM",
                Some(()) = interrupt.recv() => "SIGINT",
                else => break,
            };
            if daemon.inner.is_shutdown_requested() {
                tracing::debug!(signal = name, "ignoring repeated shutdown signal");
                continue;
            }
            tracing::info!(signal = name, "received termination signal");
            // stop() aborts this task, so it must run elsewhere.
            let daemon = daemon.clone();
            tokio::spawn(async move {
                if let Err(err) = daemon.stop().await {
                    tracing::error!(error = %err, "graceful shutdown failed");
                }
            });
        }
    }))
}
