//! Error types for fleet-discovery.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures of a live listing fetch.
///
/// Cache problems never show up here; they degrade to a cache miss.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Credentials missing, expired, or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API quota is spent; callers should defer until `reset_at` rather
    /// than retry immediately.
    #[error("API rate limit exhausted (resets at {})", format_reset(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// The organization or user does not exist or is not visible.
    #[error("organization '{0}' not found")]
    NotFound(String),

    /// Transport-level failure (DNS, connect, TLS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with a status we do not classify further.
    #[error("unexpected API response ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("failed to decode API response: {0}")]
    Decode(String),
}

impl DiscoveryError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DiscoveryError::RateLimited { .. })
    }
}

fn format_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    reset_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}
