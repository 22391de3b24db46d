//! Process entry points: tracing setup, executor wiring, and the blocking
//! runners the CLI calls.

use tokio::runtime::Runtime;

use fleet_core::{FleetConfig, FleetPaths, Organization};
use fleet_discovery::{Discoverer, DiscoveryCache, DiscoverySettings, GithubClient};

use crate::action::ConfiguredAction;
use crate::error::{io_err, DaemonError};
use crate::executor::{FleetExecutor, SyncExecutor};
use crate::scheduler::{Daemon, DaemonOptions, PassReport};

/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "FLEET_LOG_FORMAT";

pub type ConfiguredExecutor = FleetExecutor<GithubClient, ConfiguredAction>;

/// Discoverer backed by the hosting API and the on-disk cache under `paths`.
pub fn discoverer(config: &FleetConfig, paths: &FleetPaths) -> Discoverer<GithubClient> {
    Discoverer::new(
        GithubClient::from_config(config),
        DiscoveryCache::new(&paths.cache_file, config.discovery.cache_ttl()),
        DiscoverySettings::from(&config.discovery),
    )
}

pub fn build_executor(
    config: &FleetConfig,
    paths: &FleetPaths,
    organization: Organization,
) -> ConfiguredExecutor {
    FleetExecutor::new(
        discoverer(config, paths),
        organization,
        config.filters.clone(),
        ConfiguredAction::from_argv(&config.executor.command),
        config.executor.concurrency,
    )
}

pub fn build_daemon(
    config: &FleetConfig,
    paths: &FleetPaths,
    organization: Organization,
) -> Daemon<ConfiguredExecutor> {
    Daemon::new(
        paths.clone(),
        DaemonOptions::from_schedule(&config.schedule),
        build_executor(config, paths, organization),
    )
}

/// Start the daemon and block the current thread until it stops.
pub fn start_blocking(
    config: &FleetConfig,
    paths: &FleetPaths,
    organization: Organization,
) -> Result<(), DaemonError> {
    init_tracing();
    let daemon = build_daemon(config, paths, organization);
    runtime()?.block_on(run(daemon))
}

/// Run a single pass in the foreground.
pub fn run_once_blocking(
    config: &FleetConfig,
    paths: &FleetPaths,
    organization: Organization,
) -> Result<PassReport, DaemonError> {
    init_tracing();
    let daemon = build_daemon(config, paths, organization);
    runtime()?.block_on(daemon.run_once())
}

/// Start `daemon` and wait until something stops it.
///
/// Fails if the daemon went down on a fatal error rather than a stop request.
pub async fn run<E: SyncExecutor>(daemon: Daemon<E>) -> Result<(), DaemonError> {
    daemon.start().await?;
    daemon.wait().await;
    match daemon.take_fatal() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // stdout is reserved for command output.
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    };
}

fn runtime() -> Result<Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
}
