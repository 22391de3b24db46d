//! The per-pass work the scheduler invokes.
//!
//! The scheduler only sees [`SyncExecutor::execute`] and whether it
//! succeeded. [`FleetExecutor`] is the stock implementation: discover the
//! fleet, then fan a [`RepoAction`] out over it with bounded concurrency.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use fleet_core::{config::RepoFilters, Organization, RepoOutcome, RepoSyncState, Repository};
use fleet_discovery::{Discoverer, RepositoryLister};

use crate::action::RepoAction;
use crate::error::ExecutorError;

/// What one executor call reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ExecutionReport {
    pub success: bool,
    pub message: String,
    pub repositories: Vec<RepoOutcome>,
}

impl ExecutionReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            repositories: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            repositories: Vec::new(),
        }
    }

    /// Summarize per-repository outcomes; the pass succeeds only if none failed.
    pub fn from_outcomes(repositories: Vec<RepoOutcome>) -> Self {
        let count = |state| repositories.iter().filter(|o| o.status == state).count();
        let (succeeded, failed, pending) = (
            count(RepoSyncState::Success),
            count(RepoSyncState::Failed),
            count(RepoSyncState::Pending),
        );
        Self {
            success: failed == 0,
            message: format!(
                "{} repositories: {succeeded} succeeded, {failed} failed, {pending} pending",
                repositories.len()
            ),
            repositories,
        }
    }
}

/// Idempotent unit of work run once per pass.
pub trait SyncExecutor: Send + Sync + 'static {
    fn execute(&self) -> impl Future<Output = Result<ExecutionReport, ExecutorError>> + Send;
}

/// Adapts a closure returning a future into a [`SyncExecutor`].
pub struct FnExecutor<F>(pub F);

impl<F, Fut> SyncExecutor for FnExecutor<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ExecutionReport, ExecutorError>> + Send,
{
    fn execute(&self) -> impl Future<Output = Result<ExecutionReport, ExecutorError>> + Send {
        (self.0)()
    }
}

pub struct FleetExecutor<L, A> {
    discoverer: Arc<Discoverer<L>>,
    organization: Organization,
    filters: RepoFilters,
    action: Arc<A>,
    concurrency: usize,
}

impl<L, A> FleetExecutor<L, A>
where
    L: RepositoryLister + 'static,
    A: RepoAction,
{
    pub fn new(
        discoverer: Discoverer<L>,
        organization: Organization,
        filters: RepoFilters,
        action: A,
        concurrency: usize,
    ) -> Self {
        Self {
            discoverer: Arc::new(discoverer),
            organization,
            filters,
            action: Arc::new(action),
            concurrency: concurrency.max(1),
        }
    }

    async fn discover(&self) -> Result<Vec<Repository>, ExecutorError> {
        let discoverer = self.discoverer.clone();
        let organization = self.organization.clone();
        let filters = self.filters.clone();
        let repositories = tokio::task::spawn_blocking(move || {
            discoverer.discover(&organization, &filters, false)
        })
        .await
        .map_err(|err| ExecutorError::Join(format!("discovery task: {err}")))??;
        Ok(repositories)
    }

    /// Fan `action` out over `repositories`, at most `concurrency` at a time.
    ///
    /// Actions live in a `JoinSet`, so dropping this future aborts every one
    /// of them. Outcomes keep the input order.
    async fn run_all(&self, repositories: Vec<Repository>) -> Vec<RepoOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let names: Vec<String> = repositories.iter().map(|repo| repo.name.clone()).collect();
        let mut tasks = JoinSet::new();

        for (index, repo) in repositories.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let action = self.action.clone();
            let organization = self.organization.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, action.run(&organization, &repo).await)
            });
        }

        let mut slots: Vec<Option<RepoOutcome>> = vec![None; names.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => tracing::error!(error = %err, "repository task failed"),
            }
        }

        names
            .into_iter()
            .zip(slots)
            .map(|(name, slot)| {
                let outcome = slot
                    .unwrap_or_else(|| RepoOutcome::failed(name, "task panicked or was cancelled"));
                if outcome.status == RepoSyncState::Failed {
                    tracing::warn!(repo = %outcome.name, message = %outcome.message, "repository sync failed");
                }
                outcome
            })
            .collect()
    }
}

impl<L, A> SyncExecutor for FleetExecutor<L, A>
where
    L: RepositoryLister + 'static,
    A: RepoAction,
{
    async fn execute(&self) -> Result<ExecutionReport, ExecutorError> {
        let repositories = self.discover().await?;
        tracing::info!(
            organization = %self.organization,
            repositories = repositories.len(),
            "running repository actions",
        );
        let outcomes = self.run_all(repositories).await;
        Ok(ExecutionReport::from_outcomes(outcomes))
    }
}
