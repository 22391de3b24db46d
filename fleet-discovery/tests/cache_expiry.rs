use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_core::{config::RepoFilters, FleetPaths, Organization, Repository, Visibility};
use fleet_discovery::{
    cache::DEFAULT_TTL, Discoverer, DiscoveryCache, DiscoveryError, DiscoverySettings, RateLimit,
    RepositoryLister,
};
use tempfile::TempDir;

struct CountingLister {
    names: Vec<&'static str>,
    fetches: AtomicU32,
}

impl RepositoryLister for CountingLister {
    fn list_page(
        &self,
        organization: &Organization,
        page: u32,
        _page_size: u32,
    ) -> Result<Vec<Repository>, DiscoveryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if page > 1 {
            return Ok(Vec::new());
        }
        let ts = DateTime::from_timestamp(1_700_000_000, 0).expect("ts");
        Ok(self
            .names
            .iter()
            .map(|name| Repository {
                name: name.to_string(),
                full_name: format!("{organization}/{name}"),
                visibility: Visibility::Public,
                archived: false,
                fork: false,
                default_branch: None,
                created_at: ts,
                updated_at: ts,
                clone_url: format!("https://example.test/{organization}/{name}.git"),
                ssh_url: None,
            })
            .collect())
    }

    fn rate_limit(&self) -> Result<RateLimit, DiscoveryError> {
        Err(DiscoveryError::Network("probe unavailable".into()))
    }
}

fn discoverer(home: &TempDir, lister: CountingLister) -> Discoverer<CountingLister> {
    let paths = FleetPaths::at(home.path());
    Discoverer::new(
        lister,
        DiscoveryCache::new(paths.cache_file, DEFAULT_TTL),
        DiscoverySettings {
            page_size: 100,
            page_delay: Duration::ZERO,
            rate_limit_threshold: 10,
        },
    )
}

#[test]
fn expired_cache_triggers_refetch() {
    let home = TempDir::new().expect("home");
    let lister = CountingLister {
        names: vec!["api", "web"],
        fetches: AtomicU32::new(0),
    };
    let discoverer = discoverer(&home, lister);
    let org = Organization::from("Acme");

    // Backdate a cache entry past the TTL.
    let stale_at = Utc::now() - chrono::Duration::hours(2);
    discoverer.cache().write_at(&org, &[], stale_at);

    let repos = discoverer
        .discover(&org, &RepoFilters::default(), false)
        .expect("discover");
    assert_eq!(repos.len(), 2);

    let entry = discoverer.cache().load_entry().expect("entry rewritten");
    assert!(entry.last_fetch > stale_at);
    assert_eq!(entry.repositories.len(), 2);
}

#[test]
fn cache_for_another_org_is_never_served() {
    let home = TempDir::new().expect("home");
    let lister = CountingLister {
        names: vec!["api"],
        fetches: AtomicU32::new(0),
    };
    let discoverer = discoverer(&home, lister);

    discoverer
        .discover(&Organization::from("Globex"), &RepoFilters::default(), false)
        .expect("first org");
    let repos = discoverer
        .discover(&Organization::from("Acme"), &RepoFilters::default(), false)
        .expect("second org");

    assert_eq!(repos[0].full_name, "Acme/api");
    let entry = discoverer.cache().load_entry().expect("entry");
    assert_eq!(entry.organization, Organization::from("acme"));
}

#[test]
fn failed_probe_does_not_block_discovery() {
    let home = TempDir::new().expect("home");
    let lister = CountingLister {
        names: vec!["api"],
        fetches: AtomicU32::new(0),
    };
    let repos = discoverer(&home, lister)
        .discover(&Organization::from("Acme"), &RepoFilters::default(), true)
        .expect("discover");
    assert_eq!(repos.len(), 1);
}
