//! Per-repository actions fanned out by [`crate::FleetExecutor`].

use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;

use fleet_core::{Organization, RepoOutcome, Repository};

pub trait RepoAction: Send + Sync + 'static {
    fn run(
        &self,
        organization: &Organization,
        repo: &Repository,
    ) -> impl Future<Output = RepoOutcome> + Send;
}

/// Used when no command is configured: every repository stays `pending`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAction;

impl RepoAction for NoopAction {
    async fn run(&self, _organization: &Organization, repo: &Repository) -> RepoOutcome {
        RepoOutcome::pending(&repo.name, "no action configured")
    }
}

/// Runs an external program once per repository.
///
/// The repository is described through `FLEET_ORG`, `FLEET_REPO`,
/// `FLEET_REPO_FULL_NAME`, `FLEET_CLONE_URL`, and `FLEET_DEFAULT_BRANCH`.
#[derive(Debug, Clone)]
pub struct CommandAction {
    program: String,
    args: Vec<String>,
}

impl CommandAction {
    /// `None` when `command` is empty.
    pub fn from_argv(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl RepoAction for CommandAction {
    async fn run(&self, organization: &Organization, repo: &Repository) -> RepoOutcome {
        let output = Command::new(&self.program)
            .args(&self.args)
            .env("FLEET_ORG", organization.as_str())
            .env("FLEET_REPO", &repo.name)
            .env("FLEET_REPO_FULL_NAME", &repo.full_name)
            .env("FLEET_CLONE_URL", &repo.clone_url)
            .env(
                "FLEET_DEFAULT_BRANCH",
                repo.default_branch.as_deref().unwrap_or(""),
            )
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                RepoOutcome::success(&repo.name, last_line(&output.stdout).unwrap_or("ok"))
            }
            Ok(output) => {
                let detail = last_line(&output.stderr)
                    .map(|line| format!("{}: {line}", output.status))
                    .unwrap_or_else(|| output.status.to_string());
                RepoOutcome::failed(&repo.name, detail)
            }
            Err(err) => RepoOutcome::failed(
                &repo.name,
                format!("failed to spawn {}: {err}", self.program),
            ),
        }
    }
}

/// The action selected by `executor.command` in the config.
#[derive(Debug, Clone)]
pub enum ConfiguredAction {
    Command(CommandAction),
    Noop,
}

impl ConfiguredAction {
    pub fn from_argv(command: &[String]) -> Self {
        CommandAction::from_argv(command)
            .map(Self::Command)
            .unwrap_or(Self::Noop)
    }
}

impl RepoAction for ConfiguredAction {
    async fn run(&self, organization: &Organization, repo: &Repository) -> RepoOutcome {
        match self {
            Self::Command(command) => command.run(organization, repo).await,
            Self::Noop => NoopAction.run(organization, repo).await,
        }
    }
}

fn last_line(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes)
        .ok()?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
}
