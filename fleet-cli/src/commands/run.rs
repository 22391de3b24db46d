//! `fleet run`: one foreground sync pass.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;

use fleet_daemon::{run_once_blocking, DaemonError};

use super::{relative_time, Workspace};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Emit the pass report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self, org: Option<&str>) -> Result<()> {
        let workspace = Workspace::load()?;
        let organization = workspace.organization(org)?;

        let report = match run_once_blocking(&workspace.config, &workspace.paths, organization) {
            Ok(report) => report,
            Err(DaemonError::AlreadyRunning { pid }) => {
                bail!("a sync daemon is already running (pid {pid}); it holds the lock")
            }
            Err(err) => return Err(err).context("sync pass could not run"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render pass JSON")?
            );
        } else {
            let label = if report.success {
                "SUCCESS".green().bold()
            } else {
                "FAILED".red().bold()
            };
            println!("{label} {}", report.message);
            println!(
                "next scheduled sync: {}",
                relative_time(report.next_sync, Utc::now())
            );
        }

        if !report.success {
            bail!("sync pass failed: {}", report.message);
        }
        Ok(())
    }
}
