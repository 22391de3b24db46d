//! `fleet daemon`: background scheduler lifecycle.

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;

use fleet_daemon::{holder, is_running, start_blocking, status, DaemonError, ProcessLock};

use super::Workspace;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground until SIGTERM or SIGINT.
    Start,
    /// Ask the running daemon to shut down gracefully.
    Stop(StopArgs),
    /// Report whether a daemon holds the lock, plus the ledger summary.
    Status,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Seconds to wait for the daemon to release its lock.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DaemonStatusJson {
    running: bool,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    lock_file: String,
    last_sync: Option<DateTime<Utc>>,
    next_sync: Option<DateTime<Utc>>,
    success_count: u64,
    failure_count: u64,
}

pub fn run(command: DaemonCommand, org: Option<&str>) -> Result<()> {
    let workspace = Workspace::load()?;

    match command {
        DaemonCommand::Start => {
            let organization = workspace.organization(org)?;
            match start_blocking(&workspace.config, &workspace.paths, organization) {
                Ok(()) => {}
                Err(DaemonError::AlreadyRunning { pid }) => {
                    bail!("daemon already running (pid {pid})")
                }
                Err(err) => return Err(err).context("daemon exited with error"),
            }
        }
        DaemonCommand::Stop(args) => {
            let lock = ProcessLock::new(&workspace.paths.lock_file);
            let Some(pid) = lock
                .terminate_holder()
                .context("failed to signal daemon")?
            else {
                println!("daemon is not running");
                return Ok(());
            };
            println!("stop requested (pid {pid})");

            let deadline = Instant::now() + Duration::from_secs(args.timeout);
            while is_running(&workspace.paths) {
                if Instant::now() >= deadline {
                    bail!("daemon (pid {pid}) did not stop within {}s", args.timeout);
                }
                sleep(Duration::from_millis(100));
            }
            println!("daemon stopped");
        }
        DaemonCommand::Status => {
            let record = holder(&workspace.paths);
            let ledger = status(&workspace.paths);
            let payload = DaemonStatusJson {
                running: record.is_some(),
                pid: record.as_ref().map(|r| r.pid),
                started_at: record.as_ref().map(|r| r.started_at),
                lock_file: workspace.paths.lock_file.display().to_string(),
                last_sync: ledger.last_sync,
                next_sync: ledger.next_sync,
                success_count: ledger.success_count,
                failure_count: ledger.failure_count,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
    }

    Ok(())
}
