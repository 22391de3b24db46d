//! `fleet discover`: show the repository set a pass would cover.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use fleet_core::Repository;
use fleet_daemon::{discoverer, init_tracing};

use super::{relative_time, Workspace};

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Bypass the cache and fetch a fresh listing.
    #[arg(long)]
    pub refresh: bool,

    /// Emit the repository list as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct RepositoryRow {
    #[tabled(rename = "repository")]
    name: String,
    #[tabled(rename = "visibility")]
    visibility: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "flags")]
    flags: String,
    #[tabled(rename = "updated")]
    updated: String,
}

impl DiscoverArgs {
    pub fn run(self, org: Option<&str>) -> Result<()> {
        init_tracing();
        let workspace = Workspace::load()?;
        let organization = workspace.organization(org)?;

        let repositories = discoverer(&workspace.config, &workspace.paths)
            .discover(&organization, &workspace.config.filters, self.refresh)
            .with_context(|| format!("discovery failed for '{organization}'"))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&repositories)
                    .context("failed to render repository JSON")?
            );
            return Ok(());
        }

        println!(
            "{} | {} repositories",
            organization.as_str().bold(),
            repositories.len()
        );
        if repositories.is_empty() {
            println!("No repositories matched the configured filters.");
            return Ok(());
        }

        let now = Utc::now();
        let rows: Vec<RepositoryRow> = repositories.iter().map(|repo| row(repo, now)).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn row(repo: &Repository, now: chrono::DateTime<Utc>) -> RepositoryRow {
    let mut flags = Vec::new();
    if repo.archived {
        flags.push("archived");
    }
    if repo.fork {
        flags.push("fork");
    }
    RepositoryRow {
        name: repo.name.clone(),
        visibility: repo.visibility.to_string(),
        branch: repo.default_branch.clone().unwrap_or_else(|| "-".to_string()),
        flags: flags.join(","),
        updated: relative_time(Some(repo.updated_at), now),
    }
}
