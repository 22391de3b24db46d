//! Repository discovery: cache first, then a paginated live listing.
//!
//! ## `discover`: protocol
//!
//! 1. Unless forced, serve a fresh cache entry for the organization.
//! 2. Probe the API quota and warn if it is nearly spent.
//! 3. Fetch page after page until a short page signals the end of the list,
//!    sleeping a fixed delay between pages.
//! 4. Cache the full, unfiltered listing.
//! 5. Probe the quota again.
//! 6. Apply filters and return.
//!
//! A failed fetch falls back to a fresh cache entry when one exists.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_core::{
    config::{DiscoveryConfig, RepoFilters},
    Organization, Repository,
};

use crate::cache::DiscoveryCache;
use crate::error::DiscoveryError;
use crate::filter;

/// Upper bound on pages per fetch, in case the API never returns a short page.
pub const MAX_PAGES: u32 = 1_000;

/// Quota snapshot from the listing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: Option<DateTime<Utc>>,
}

/// Paginated listing transport.
pub trait RepositoryLister: Send + Sync {
    /// One page of repositories; `page` is 1-based.
    fn list_page(
        &self,
        organization: &Organization,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Repository>, DiscoveryError>;

    fn rate_limit(&self) -> Result<RateLimit, DiscoveryError>;
}

impl<T: RepositoryLister + ?Sized> RepositoryLister for &T {
    fn list_page(
        &self,
        organization: &Organization,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Repository>, DiscoveryError> {
        (**self).list_page(organization, page, page_size)
    }

    fn rate_limit(&self) -> Result<RateLimit, DiscoveryError> {
        (**self).rate_limit()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub page_size: u32,
    pub page_delay: Duration,
    pub rate_limit_threshold: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for DiscoverySettings {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            page_delay: config.page_delay(),
            rate_limit_threshold: config.rate_limit_threshold,
        }
    }
}

pub struct Discoverer<L> {
    lister: L,
    cache: DiscoveryCache,
    settings: DiscoverySettings,
}

impl<L: RepositoryLister> Discoverer<L> {
    pub fn new(lister: L, cache: DiscoveryCache, settings: DiscoverySettings) -> Self {
        Self {
            lister,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    /// Filtered repositories for `organization`.
    ///
    /// Errors only when the live fetch fails and no fresh cache entry can
    /// stand in for it.
    pub fn discover(
        &self,
        organization: &Organization,
        filters: &RepoFilters,
        force_refresh: bool,
    ) -> Result<Vec<Repository>, DiscoveryError> {
        if !force_refresh {
            if let Some(cached) = self.cache.read(organization) {
                tracing::debug!(
                    organization = %organization,
                    repositories = cached.len(),
                    "discovery served from cache",
                );
                return Ok(filter::apply(filters, &cached));
            }
        }

        match self.fetch_all(organization) {
            Ok(repositories) => {
                self.cache.write(organization, &repositories);
                Ok(filter::apply(filters, &repositories))
            }
            Err(err) => match self.cache.read(organization) {
                Some(cached) => {
                    tracing::warn!(
                        organization = %organization,
                        error = %err,
                        "live discovery failed; using cached listing",
                    );
                    Ok(filter::apply(filters, &cached))
                }
                None => Err(err),
            },
        }
    }

    /// Every repository visible for `organization`, unfiltered.
    pub fn fetch_all(&self, organization: &Organization) -> Result<Vec<Repository>, DiscoveryError> {
        self.check_quota("before fetch");

        let page_size = self.settings.page_size;
        let mut repositories = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.lister.list_page(organization, page, page_size)?;
            let short_page = batch.len() < page_size as usize;
            repositories.extend(batch);
            if short_page {
                break;
            }
            if page >= MAX_PAGES {
                tracing::warn!(
                    organization = %organization,
                    pages = page,
                    "stopping discovery at page cap",
                );
                break;
            }
            page += 1;
            if !self.settings.page_delay.is_zero() {
                std::thread::sleep(self.settings.page_delay);
            }
        }

        tracing::info!(
            organization = %organization,
            repositories = repositories.len(),
            pages = page,
            "fetched repository listing",
        );
        self.check_quota("after fetch");
        Ok(repositories)
    }

    /// Warn when the remaining quota is under the threshold. Never throttles.
    fn check_quota(&self, phase: &'static str) -> Option<RateLimit> {
        match self.lister.rate_limit() {
            Ok(quota) => {
                if quota.remaining < self.settings.rate_limit_threshold {
                    tracing::warn!(
                        phase,
                        remaining = quota.remaining,
                        limit = quota.limit,
                        reset_at = ?quota.reset_at,
                        "API rate limit nearly exhausted",
                    );
                }
                Some(quota)
            }
            Err(err) => {
                tracing::debug!(phase, error = %err, "rate limit probe failed");
                None
            }
        }
    }
}
