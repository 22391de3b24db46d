//! Fleet: scheduled reconciliation for every repository in an organization.
//!
//! # Usage
//!
//! ```text
//! fleet [--org <name>] run [--json]
//! fleet [--org <name>] daemon start|stop|status
//! fleet [--org <name>] discover [--refresh] [--json]
//! fleet status [--json]
//! fleet cache clear
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    cache::CacheCommand, daemon::DaemonCommand, discover::DiscoverArgs, run::RunArgs,
    status::StatusArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "fleet",
    version,
    about = "Keep every repository in an organization reconciled on a schedule",
    long_about = None,
)]
struct Cli {
    /// Organization to operate on; overrides $FLEET_ORG and config.yaml.
    #[arg(long, global = true)]
    org: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single sync pass in the foreground.
    Run(RunArgs),

    /// Manage the background sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// List the repositories a sync pass would cover.
    Discover(DiscoverArgs),

    /// Show the sync ledger and daemon state.
    Status(StatusArgs),

    /// Manage the discovery cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let org = cli.org.as_deref();
    match cli.command {
        Commands::Run(args) => args.run(org),
        Commands::Daemon { command } => commands::daemon::run(command, org),
        Commands::Discover(args) => args.run(org),
        Commands::Status(args) => args.run(),
        Commands::Cache { command } => commands::cache::run(command),
    }
}
