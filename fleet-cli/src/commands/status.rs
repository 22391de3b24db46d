//! `fleet status`: the sync ledger at a glance.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use fleet_core::{LockRecord, RepoSyncState, SyncStatus};
use fleet_daemon::{holder, status};

use super::{relative_time, Workspace};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusJson {
    running: bool,
    pid: Option<u32>,
    #[serde(flatten)]
    ledger: SyncStatus,
}

#[derive(Tabled)]
struct RepositoryRow {
    #[tabled(rename = "repository")]
    name: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "message")]
    message: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let workspace = Workspace::load()?;
        let record = holder(&workspace.paths);
        let ledger = status(&workspace.paths);

        if self.json {
            let payload = StatusJson {
                running: record.is_some(),
                pid: record.map(|r| r.pid),
                ledger,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(record, ledger, Utc::now());
        Ok(())
    }
}

fn print_table(record: Option<LockRecord>, ledger: SyncStatus, now: DateTime<Utc>) {
    let daemon = match &record {
        Some(record) => format!("daemon running (pid {})", record.pid).green().to_string(),
        None => "daemon stopped".bright_black().to_string(),
    };
    println!(
        "Fleet v{} | {} | {} ok | {} failed",
        env!("CARGO_PKG_VERSION"),
        daemon,
        ledger.success_count,
        ledger.failure_count,
    );
    println!(
        "last sync: {} | next sync: {}",
        relative_time(ledger.last_sync, now),
        relative_time(ledger.next_sync, now),
    );

    if ledger.repositories.is_empty() {
        println!("No repositories synced yet.");
        return;
    }

    let rows: Vec<RepositoryRow> = ledger
        .repositories
        .into_iter()
        .map(|(name, entry)| RepositoryRow {
            name,
            status: state_label(entry.status),
            last_sync: relative_time(Some(entry.last_sync), now),
            message: entry.message,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn state_label(state: RepoSyncState) -> String {
    match state {
        RepoSyncState::Success => "SUCCESS".green().bold().to_string(),
        RepoSyncState::Failed => "FAILED".red().bold().to_string(),
        RepoSyncState::Pending => "PENDING".yellow().bold().to_string(),
    }
}
