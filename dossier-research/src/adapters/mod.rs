//! Source adapters - one per platform
//!
//! Every adapter implements `SourceAdapter`: given a query and a time budget
//! it returns zero or more raw records, or a classified `AdapterError`.
//! "No results" is an empty vector, never an error.
//!
//! Adapters are thin: they translate one platform's public surface into
//! `RawRecord`s and carry no cross-source logic. Rate limiting across runs,
//! caching, deadlines and correlation all live in the orchestrator.

pub mod fixture;
pub mod http;
pub mod linkedin;
pub mod screening;
pub mod twitter;
pub mod web_search;

pub use fixture::{FixtureAdapter, FixtureSet};
pub use linkedin::LinkedInAdapter;
pub use twitter::TwitterAdapter;
pub use web_search::WebSearchAdapter;

use crate::types::{Query, RawRecord, SourceId, TimeBudget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Heuristic retry delay when a throttled source gives no Retry-After
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Classified adapter failure
///
/// Recoverable by skipping the source for the current run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterError {
    /// Source throttled us; retry no sooner than `retry_after`
    #[error("Rate limited (retry after {}s)", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Network failure, timeout or server-side error
    #[error("Unreachable: {message}")]
    Unreachable { message: String },

    /// Response could not be decoded
    #[error("Parse failure: {message}")]
    ParseFailure { message: String },

    /// Source refused access to the requested data
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Source returned credential-like data; all its records are dropped
    #[error("Credential material in field '{field}'")]
    CredentialLeak { field: String },
}

impl AdapterError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        AdapterError::Unreachable {
            message: message.into(),
        }
    }

    pub fn parse_failure(message: impl Into<String>) -> Self {
        AdapterError::ParseFailure {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AdapterError::Forbidden {
            message: message.into(),
        }
    }

    /// Short machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::RateLimited { .. } => "rate_limited",
            AdapterError::Unreachable { .. } => "unreachable",
            AdapterError::ParseFailure { .. } => "parse_failure",
            AdapterError::Forbidden { .. } => "forbidden",
            AdapterError::CredentialLeak { .. } => "credential_leak",
        }
    }
}

/// How quickly a source's data goes stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    /// Feeds and timelines (minutes)
    Volatile,
    /// Search results (hours)
    Stable,
    /// Profile bios (a day)
    Static,
}

impl Volatility {
    /// Cache TTL used when configuration does not override it
    pub fn default_ttl(&self) -> Duration {
        match self {
            Volatility::Volatile => Duration::from_secs(10 * 60),
            Volatility::Stable => Duration::from_secs(6 * 60 * 60),
            Volatility::Static => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Uniform capability implemented by every platform adapter
///
/// `fetch` must honor `budget`: once it expires the adapter returns what it
/// has (possibly nothing) instead of blocking. The orchestrator additionally
/// cancels calls still pending at the run deadline.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source identifier (e.g. "web_search", "linkedin", "x")
    fn source_id(&self) -> &SourceId;

    /// Staleness class used to pick a cache TTL
    fn volatility(&self) -> Volatility {
        Volatility::Stable
    }

    /// Query the platform for candidate records
    async fn fetch(&self, query: &Query, budget: TimeBudget)
        -> Result<Vec<RawRecord>, AdapterError>;
}
