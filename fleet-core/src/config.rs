//! `~/.fleet/config.yaml`.
//!
//! Every field has a default, so a missing file (or a file that sets only
//! `organization`) is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::paths::FleetPaths;
use crate::types::Organization;

pub const ORG_ENV: &str = "FLEET_ORG";

/// Whether the organization is an org account or a personal account; the
/// listing endpoint differs between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    #[default]
    Org,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub organization: Option<Organization>,
    pub owner_kind: OwnerKind,
    pub api_base_url: String,
    /// Name of the environment variable holding the API token.
    pub token_env: String,
    pub discovery: DiscoveryConfig,
    pub filters: RepoFilters,
    pub schedule: ScheduleConfig,
    pub executor: ExecutorConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            organization: None,
            owner_kind: OwnerKind::Org,
            api_base_url: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            discovery: DiscoveryConfig::default(),
            filters: RepoFilters::default(),
            schedule: ScheduleConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub cache_ttl_secs: u64,
    pub page_size: u32,
    pub page_delay_ms: u64,
    /// Remaining-quota level below which discovery logs a warning.
    pub rate_limit_threshold: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60 * 60,
            page_size: 100,
            page_delay_ms: 100,
            rate_limit_threshold: 10,
        }
    }
}

impl DiscoveryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Which discovered repositories make it into a pass.
///
/// Applied after the cache, never before, so changing these never forces a
/// re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoFilters {
    pub include_archived: bool,
    pub include_private: bool,
    pub include_forks: bool,
    /// Repository names (short or `owner/name`, case-insensitive) to skip.
    pub exclude: Vec<String>,
}

impl Default for RepoFilters {
    fn default() -> Self {
        Self {
            include_archived: false,
            include_private: true,
            include_forks: true,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// `false` keeps the initial pass but suppresses every later one.
    pub enabled: bool,
    pub interval_secs: u64,
    pub executor_timeout_secs: Option<u64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 6 * 60 * 60,
            executor_timeout_secs: None,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn executor_timeout(&self) -> Option<Duration> {
        self.executor_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Program and arguments run once per repository. Empty means no action.
    pub command: Vec<String>,
    pub concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            concurrency: 4,
        }
    }
}

impl FleetConfig {
    /// Load the config file for `paths`, or defaults if it does not exist.
    pub fn load(paths: &FleetPaths) -> Result<Self, CoreError> {
        Self::load_from(&paths.config_file)
    }

    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|source| CoreError::ParseConfig {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.schedule.interval_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "schedule.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.discovery.page_size == 0 {
            return Err(CoreError::InvalidConfig(
                "discovery.page_size must be greater than zero".to_string(),
            ));
        }
        if self.executor.concurrency == 0 {
            return Err(CoreError::InvalidConfig(
                "executor.concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Organization from, in order: explicit override, `$FLEET_ORG`, config.
    pub fn resolve_organization(
        &self,
        override_org: Option<&str>,
    ) -> Result<Organization, CoreError> {
        if let Some(org) = override_org.filter(|o| !o.trim().is_empty()) {
            return Ok(Organization::from(org.trim()));
        }
        if let Ok(org) = std::env::var(ORG_ENV) {
            if !org.trim().is_empty() {
                return Ok(Organization::from(org.trim()));
            }
        }
        self.organization.clone().ok_or_else(|| {
            CoreError::InvalidConfig(format!(
                "no organization configured; set `organization` in config.yaml, ${ORG_ENV}, or pass --org"
            ))
        })
    }

    /// API token from the configured environment variable, if set.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}
