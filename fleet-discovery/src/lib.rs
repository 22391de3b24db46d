//! # fleet-discovery
//!
//! Repository discovery with a TTL-bounded disk cache.
//!
//! Call [`Discoverer::discover`] to get the filtered repository set for an
//! organization. The [`cache`] always holds the full unfiltered listing;
//! [`filter`] is applied on every read.

pub mod cache;
pub mod discoverer;
pub mod error;
pub mod filter;
pub mod github;

pub use cache::DiscoveryCache;
pub use discoverer::{Discoverer, DiscoverySettings, RateLimit, RepositoryLister};
pub use error::DiscoveryError;
pub use github::GithubClient;
