//! Config loading, defaults, and validation.

use assert_fs::prelude::*;
use fleet_core::{
    config::{OwnerKind, RepoFilters},
    CoreError, FleetConfig, FleetPaths, Organization,
};
use predicates::prelude::{predicate, Predicate};
use rstest::rstest;

// ---------------------------------------------------------------------------
// 1. Defaults
// ---------------------------------------------------------------------------

#[test]
fn missing_config_file_yields_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let paths = FleetPaths::at(home.path());
    let config = FleetConfig::load(&paths).expect("load");

    assert_eq!(config, FleetConfig::default());
    assert_eq!(config.discovery.cache_ttl_secs, 3600);
    assert_eq!(config.discovery.page_size, 100);
    assert_eq!(config.discovery.rate_limit_threshold, 10);
    assert!(config.schedule.enabled);
    assert_eq!(config.filters, RepoFilters::default());
}

#[test]
fn partial_config_fills_remaining_fields_with_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".fleet/config.yaml");
    file.write_str(
        "organization: Acme\nowner_kind: user\nschedule:\n  interval_secs: 900\n",
    )
    .expect("write");

    let config = FleetConfig::load(&FleetPaths::at(home.path())).expect("load");
    assert_eq!(config.organization, Some(Organization::from("acme")));
    assert_eq!(config.owner_kind, OwnerKind::User);
    assert_eq!(config.schedule.interval_secs, 900);
    assert!(config.schedule.enabled, "unset fields keep their defaults");
    assert_eq!(config.executor.concurrency, 4);
}

#[test]
fn full_config_round_trips_through_yaml() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".fleet/config.yaml");
    file.write_str(
        r#"
organization: acme
api_base_url: http://localhost:8080
token_env: ACME_TOKEN
discovery:
  cache_ttl_secs: 60
  page_size: 50
  page_delay_ms: 0
  rate_limit_threshold: 25
filters:
  include_archived: true
  include_private: false
  include_forks: false
  exclude: [legacy, acme/scratch]
schedule:
  enabled: false
  interval_secs: 120
  executor_timeout_secs: 30
executor:
  command: ["./sync-repo.sh", "--quiet"]
  concurrency: 8
"#,
    )
    .expect("write");

    let config = FleetConfig::load(&FleetPaths::at(home.path())).expect("load");
    assert_eq!(config.api_base_url, "http://localhost:8080");
    assert_eq!(config.token_env, "ACME_TOKEN");
    assert_eq!(config.discovery.page_size, 50);
    assert!(config.filters.include_archived);
    assert_eq!(config.filters.exclude, vec!["legacy", "acme/scratch"]);
    assert!(!config.schedule.enabled);
    assert_eq!(
        config.schedule.executor_timeout(),
        Some(std::time::Duration::from_secs(30))
    );
    assert_eq!(config.executor.command, vec!["./sync-repo.sh", "--quiet"]);
}

// ---------------------------------------------------------------------------
// 2. Errors
// ---------------------------------------------------------------------------

#[test]
fn malformed_yaml_reports_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".fleet/config.yaml");
    file.write_str("schedule: [unclosed").expect("write");

    let err = FleetConfig::load(&FleetPaths::at(home.path())).unwrap_err();
    assert!(matches!(err, CoreError::ParseConfig { .. }), "got: {err}");
    assert!(predicate::str::contains("config.yaml").eval(&err.to_string()));
}

#[rstest]
#[case("schedule:\n  interval_secs: 0\n", "interval_secs")]
#[case("discovery:\n  page_size: 0\n", "page_size")]
#[case("executor:\n  concurrency: 0\n", "concurrency")]
fn zero_values_are_rejected(#[case] yaml: &str, #[case] field: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".fleet/config.yaml").write_str(yaml).expect("write");

    let err = FleetConfig::load(&FleetPaths::at(home.path())).unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfig(_)), "got: {err}");
    assert!(err.to_string().contains(field), "got: {err}");
}

// ---------------------------------------------------------------------------
// 3. Organization resolution
// ---------------------------------------------------------------------------

#[test]
fn explicit_org_override_wins_over_config() {
    let config = FleetConfig {
        organization: Some(Organization::from("from-config")),
        ..FleetConfig::default()
    };
    let org = config.resolve_organization(Some("from-flag")).expect("org");
    assert_eq!(org.as_str(), "from-flag");
}

#[test]
fn blank_override_falls_through_to_config() {
    let config = FleetConfig {
        organization: Some(Organization::from("from-config")),
        ..FleetConfig::default()
    };
    if std::env::var(fleet_core::config::ORG_ENV).is_ok() {
        return;
    }
    let org = config.resolve_organization(Some("  ")).expect("org");
    assert_eq!(org.as_str(), "from-config");
}
