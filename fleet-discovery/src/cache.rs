//! Discovery cache: the last full listing for one organization.
//!
//! Persists a [`CacheEntry`] JSON document at `~/.fleet/cache/repositories.json`
//! using the atomic `.tmp` + rename pattern from [`fleet_core::store`].
//!
//! An entry is trusted only when it is younger than the TTL **and** was
//! fetched for the organization being asked about. Anything else: missing
//! file, corrupt JSON, unreadable file: reads as a miss.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_core::{store, CoreError, Organization, Repository};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// On-disk cache payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub repositories: Vec<Repository>,
    pub last_fetch: DateTime<Utc>,
    pub organization: Organization,
}

impl CacheEntry {
    pub fn is_fresh(&self, organization: &Organization, ttl: Duration, now: DateTime<Utc>) -> bool {
        if !self.organization.matches(organization) {
            return false;
        }
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return true;
        };
        now - self.last_fetch < ttl
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryCache {
    path: PathBuf,
    ttl: Duration,
}

impl DiscoveryCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached repositories for `organization`, if a fresh entry exists.
    pub fn read(&self, organization: &Organization) -> Option<Vec<Repository>> {
        self.read_at(organization, Utc::now())
    }

    /// [`read`](Self::read) evaluated at an explicit `now`.
    pub fn read_at(
        &self,
        organization: &Organization,
        now: DateTime<Utc>,
    ) -> Option<Vec<Repository>> {
        let entry = self.load_entry()?;
        if !entry.is_fresh(organization, self.ttl, now) {
            tracing::debug!(
                cached_org = %entry.organization,
                requested_org = %organization,
                last_fetch = %entry.last_fetch,
                "discovery cache expired or for another organization",
            );
            return None;
        }
        Some(entry.repositories)
    }

    /// Raw entry regardless of freshness; `None` when absent or unreadable.
    pub fn load_entry(&self) -> Option<CacheEntry> {
        match store::read_json::<CacheEntry>(&self.path) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "ignoring unreadable discovery cache",
                );
                None
            }
        }
    }

    /// Replace the cache with a fresh listing.
    ///
    /// Failures are logged and swallowed; the next discovery simply fetches
    /// again.
    pub fn write(&self, organization: &Organization, repositories: &[Repository]) {
        self.write_at(organization, repositories, Utc::now());
    }

    pub fn write_at(
        &self,
        organization: &Organization,
        repositories: &[Repository],
        fetched_at: DateTime<Utc>,
    ) {
        let entry = CacheEntry {
            repositories: repositories.to_vec(),
            last_fetch: fetched_at,
            organization: organization.clone(),
        };
        if let Err(err) = store::write_json_atomic(&self.path, &entry) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to write discovery cache",
            );
        }
    }

    /// Operator-triggered cache clear. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, CoreError> {
        store::remove_if_exists(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::Visibility;
    use tempfile::TempDir;

    fn repo(name: &str) -> Repository {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Repository {
            name: name.to_string(),
            full_name: format!("acme/{name}"),
            visibility: Visibility::Private,
            archived: false,
            fork: false,
            default_branch: Some("main".to_string()),
            created_at: ts,
            updated_at: ts,
            clone_url: format!("https://github.com/acme/{name}.git"),
            ssh_url: Some(format!("git@github.com:acme/{name}.git")),
        }
    }

    fn cache(tmp: &TempDir) -> DiscoveryCache {
        DiscoveryCache::new(tmp.path().join("cache").join("repositories.json"), DEFAULT_TTL)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn read_before_any_write_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        assert!(cache(&tmp).read(&Organization::from("Acme")).is_none());
    }

    #[test]
    fn hit_inside_ttl_and_miss_after() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let org = Organization::from("Acme");
        cache.write_at(&org, &[repo("api"), repo("web")], t0());

        let just_before = t0() + chrono::Duration::seconds(3599);
        let hit = cache.read_at(&org, just_before).expect("hit inside TTL");
        assert_eq!(hit.len(), 2);

        let just_after = t0() + chrono::Duration::seconds(3601);
        assert!(cache.read_at(&org, just_after).is_none());
    }

    #[test]
    fn exactly_ttl_old_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let org = Organization::from("Acme");
        cache.write_at(&org, &[repo("api")], t0());
        assert!(cache
            .read_at(&org, t0() + chrono::Duration::seconds(3600))
            .is_none());
    }

    #[test]
    fn other_organization_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        cache.write_at(&Organization::from("Acme"), &[repo("api")], t0());
        assert!(cache.read_at(&Organization::from("Globex"), t0()).is_none());
        assert!(cache.read_at(&Organization::from("acme"), t0()).is_some());
    }

    #[test]
    fn write_replaces_previous_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let org = Organization::from("Acme");
        cache.write_at(&org, &[repo("api"), repo("web")], t0());
        cache.write_at(&org, &[repo("worker")], t0());

        let names: Vec<_> = cache
            .read_at(&org, t0())
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["worker"]);
    }

    #[test]
    fn corrupt_cache_file_reads_as_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        std::fs::create_dir_all(cache.path().parent().unwrap()).unwrap();
        std::fs::write(cache.path(), "{\"repositories\": [").unwrap();
        assert!(cache.read(&Organization::from("Acme")).is_none());
    }

    #[test]
    fn persisted_shape_uses_camel_case_keys() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        cache.write_at(&Organization::from("Acme"), &[repo("api")], t0());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert_eq!(raw["organization"], "Acme");
        assert!(raw["lastFetch"].is_string());
        assert_eq!(raw["repositories"][0]["fullName"], "acme/api");
    }

    #[test]
    fn clear_removes_entry_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        cache.write(&Organization::from("Acme"), &[repo("api")]);
        assert!(cache.clear().unwrap());
        assert!(!cache.clear().unwrap());
        assert!(cache.read(&Organization::from("Acme")).is_none());
    }
}
