//! Domain types for the fleet daemon.
//!
//! Every type that lands on disk serializes with camelCase keys so the
//! persisted files stay readable by operators and by other tooling.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// The organization (or user) whose repositories make up the fleet.
///
/// Comparison is case-insensitive, matching how the hosting API resolves
/// account names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Organization(pub String);

impl Organization {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, other: &Organization) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl PartialEq for Organization {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for Organization {}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Organization {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Organization {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Public => write!(f, "public"),
        }
    }
}

/// One repository as returned by discovery.
///
/// Never mutated after it is fetched; a refresh replaces the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Short name, unique within the organization.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub clone_url: String,
    #[serde(default)]
    pub ssh_url: Option<String>,
}

impl Repository {
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }
}

// ---------------------------------------------------------------------------
// Lock record
// ---------------------------------------------------------------------------

/// On-disk payload of the process lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockRecord {
    /// A record stamped with the current process and time.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync ledger
// ---------------------------------------------------------------------------

/// Outcome of the most recent pass that named a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepoSyncState {
    #[default]
    Pending,
    Success,
    Failed,
}

impl fmt::Display for RepoSyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoSyncState::Pending => write!(f, "pending"),
            RepoSyncState::Success => write!(f, "success"),
            RepoSyncState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSyncStatus {
    pub last_sync: DateTime<Utc>,
    pub status: RepoSyncState,
    #[serde(default)]
    pub message: String,
}

/// Per-repository result reported by an executor for a single pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoOutcome {
    pub name: String,
    pub status: RepoSyncState,
    #[serde(default)]
    pub message: String,
}

impl RepoOutcome {
    pub fn success(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RepoSyncState::Success,
            message: message.into(),
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RepoSyncState::Failed,
            message: message.into(),
        }
    }

    pub fn pending(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RepoSyncState::Pending,
            message: message.into(),
        }
    }
}

/// The persisted sync ledger.
///
/// Counters only ever grow and repository entries are upserted, never
/// removed. `Default` is the zero-valued ledger used on first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub repositories: BTreeMap<String, RepoSyncStatus>,
}

impl SyncStatus {
    /// Fold one completed pass into the ledger.
    ///
    /// `started` becomes `last_sync`; `next_sync` is measured from `finished`
    /// so a slow pass pushes the schedule out rather than compressing it.
    pub fn record_pass(
        &mut self,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
        interval: Duration,
        success: bool,
        outcomes: &[RepoOutcome],
    ) {
        if success {
            self.success_count = self.success_count.saturating_add(1);
        } else {
            self.failure_count = self.failure_count.saturating_add(1);
        }
        self.last_sync = Some(started);
        self.next_sync = Some(finished.checked_add_signed(interval).unwrap_or(finished));

        for outcome in outcomes {
            self.repositories.insert(
                outcome.name.clone(),
                RepoSyncStatus {
                    last_sync: started,
                    status: outcome.status,
                    message: outcome.message.clone(),
                },
            );
        }
    }

    pub fn total_passes(&self) -> u64 {
        self.success_count.saturating_add(self.failure_count)
    }

    /// Count of repositories currently in `state`.
    pub fn count_in(&self, state: RepoSyncState) -> usize {
        self.repositories
            .values()
            .filter(|entry| entry.status == state)
            .count()
    }
}
