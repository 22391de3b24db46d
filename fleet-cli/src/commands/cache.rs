//! `fleet cache`: discovery cache maintenance.

use anyhow::{Context, Result};
use clap::Subcommand;

use fleet_discovery::DiscoveryCache;

use super::Workspace;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Delete the cached repository listing; the next pass refetches it.
    Clear,
}

pub fn run(command: CacheCommand) -> Result<()> {
    let workspace = Workspace::load()?;
    let cache = DiscoveryCache::new(
        &workspace.paths.cache_file,
        workspace.config.discovery.cache_ttl(),
    );

    match command {
        CacheCommand::Clear => {
            let removed = cache
                .clear()
                .with_context(|| format!("failed to remove {}", cache.path().display()))?;
            if removed {
                println!("cleared discovery cache: {}", cache.path().display());
            } else {
                println!("discovery cache already empty");
            }
        }
    }
    Ok(())
}
