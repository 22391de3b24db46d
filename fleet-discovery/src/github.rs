//! GitHub REST listing transport over a blocking `ureq` agent.
//!
//! - `GET {base}/orgs/{org}/repos?type=all&per_page=N&page=P` (or
//!   `/users/{user}/repos` for personal accounts)
//! - `GET {base}/rate_limit` for the quota probe

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use fleet_core::{config::OwnerKind, FleetConfig, Organization, Repository, Visibility};

use crate::discoverer::{RateLimit, RepositoryLister};
use crate::error::DiscoveryError;

const USER_AGENT: &str = concat!("fleet/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Repository as the GitHub API returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepo {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub visibility: Option<String>,
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

impl From<GithubRepo> for Repository {
    fn from(repo: GithubRepo) -> Self {
        // "internal" repositories are not world-readable; treat them as private.
        let public = !repo.private
            && repo
                .visibility
                .as_deref()
                .map(|v| v.eq_ignore_ascii_case("public"))
                .unwrap_or(true);
        Repository {
            name: repo.name,
            full_name: repo.full_name,
            visibility: if public {
                Visibility::Public
            } else {
                Visibility::Private
            },
            archived: repo.archived,
            fork: repo.fork,
            default_branch: repo.default_branch,
            created_at: repo.created_at,
            updated_at: repo.updated_at,
            clone_url: repo.clone_url,
            ssh_url: repo.ssh_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    rate: RateLimitWindow,
}

#[derive(Debug, Deserialize)]
struct RateLimitWindow {
    limit: u32,
    remaining: u32,
    reset: i64,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

pub struct GithubClient {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
    owner_kind: OwnerKind,
}

impl GithubClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, owner_kind: OwnerKind) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            owner_kind,
        }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        let token = config.token();
        if token.is_none() {
            tracing::warn!(
                token_env = %config.token_env,
                "no API token set; only public repositories will be visible",
            );
        }
        Self::new(config.api_base_url.clone(), token, config.owner_kind)
    }

    fn listing_url(&self, organization: &Organization) -> String {
        match self.owner_kind {
            OwnerKind::Org => format!("{}/orgs/{}/repos", self.base_url, organization),
            OwnerKind::User => format!("{}/users/{}/repos", self.base_url, organization),
        }
    }

    fn request(&self, url: &str) -> ureq::Request {
        let request = self
            .agent
            .get(url)
            .set("User-Agent", USER_AGENT)
            .set("Accept", ACCEPT);
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    fn call(&self, request: ureq::Request, subject: &str) -> Result<ureq::Response, DiscoveryError> {
        match request.call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, response)) => {
                let remaining = response
                    .header("x-ratelimit-remaining")
                    .and_then(|v| v.trim().parse::<u32>().ok());
                let reset = response
                    .header("x-ratelimit-reset")
                    .and_then(|v| v.trim().parse::<i64>().ok());
                let message = response
                    .into_json::<ApiMessage>()
                    .map(|body| body.message)
                    .unwrap_or_default();
                Err(classify_status(status, remaining, reset, message, subject))
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(DiscoveryError::Network(transport.to_string()))
            }
        }
    }
}

impl RepositoryLister for GithubClient {
    fn list_page(
        &self,
        organization: &Organization,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Repository>, DiscoveryError> {
        let url = self.listing_url(organization);
        let request = self
            .request(&url)
            .query("type", "all")
            .query("per_page", &page_size.to_string())
            .query("page", &page.to_string());
        let response = self.call(request, organization.as_str())?;
        let repos: Vec<GithubRepo> = response
            .into_json()
            .map_err(|err| DiscoveryError::Decode(err.to_string()))?;
        tracing::debug!(organization = %organization, page, count = repos.len(), "fetched page");
        Ok(repos.into_iter().map(Repository::from).collect())
    }

    fn rate_limit(&self) -> Result<RateLimit, DiscoveryError> {
        let url = format!("{}/rate_limit", self.base_url);
        let response = self.call(self.request(&url), "rate_limit")?;
        let body: RateLimitResponse = response
            .into_json()
            .map_err(|err| DiscoveryError::Decode(err.to_string()))?;
        Ok(RateLimit {
            remaining: body.rate.remaining,
            limit: body.rate.limit,
            reset_at: DateTime::from_timestamp(body.rate.reset, 0),
        })
    }
}

/// Map a non-2xx response onto a [`DiscoveryError`].
pub fn classify_status(
    status: u16,
    remaining: Option<u32>,
    reset: Option<i64>,
    message: String,
    subject: &str,
) -> DiscoveryError {
    let reset_at = reset.and_then(|secs| DateTime::from_timestamp(secs, 0));
    match status {
        401 => DiscoveryError::Auth(non_empty(message, "bad credentials")),
        429 => DiscoveryError::RateLimited { reset_at },
        403 if remaining == Some(0) => DiscoveryError::RateLimited { reset_at },
        403 => DiscoveryError::Auth(non_empty(message, "forbidden")),
        404 => DiscoveryError::NotFound(subject.to_string()),
        _ => DiscoveryError::Api {
            status,
            message: non_empty(message, "no message"),
        },
    }
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
