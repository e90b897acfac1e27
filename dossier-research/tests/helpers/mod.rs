//! Shared test helpers for dossier-research integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dossier_research::adapters::{AdapterError, SourceAdapter, Volatility};
use dossier_research::cache::ResultCache;
use dossier_research::orchestrator::{Orchestrator, OrchestratorConfig};
use dossier_research::rate_limiter::RateLimiter;
use dossier_research::types::{Query, RawRecord, SourceId, TimeBudget};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted adapter: fixed records or a fixed error, optional delay
///
/// By default the delay ignores the time budget, so a slow mock behaves like
/// an adapter that does not cooperate with cancellation. `watching_budget`
/// makes it stop at the deadline and hand back its result anyway.
pub struct MockAdapter {
    id: SourceId,
    records: Vec<RawRecord>,
    error: Option<AdapterError>,
    delay: Duration,
    watches_budget: bool,
    panics: bool,
    volatility: Volatility,
    calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(id: &str) -> Self {
        Self {
            id: SourceId::from(id),
            records: Vec::new(),
            error: None,
            delay: Duration::ZERO,
            watches_budget: false,
            panics: false,
            volatility: Volatility::Stable,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_records(mut self, records: Vec<RawRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn failing(mut self, error: AdapterError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cut the delay short when the budget runs out
    pub fn watching_budget(mut self) -> Self {
        self.watches_budget = true;
        self
    }

    /// Panic inside `fetch` after the delay
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn with_volatility(mut self, volatility: Volatility) -> Self {
        self.volatility = volatility;
        self
    }

    /// Number of `fetch` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn source_id(&self) -> &SourceId {
        &self.id
    }

    fn volatility(&self) -> Volatility {
        self.volatility
    }

    async fn fetch(&self, _query: &Query, budget: TimeBudget) -> Result<Vec<RawRecord>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            if self.watches_budget {
                budget.run(tokio::time::sleep(self.delay)).await;
            } else {
                tokio::time::sleep(self.delay).await;
            }
        }
        if self.panics {
            panic!("{} adapter crashed", self.id);
        }
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self.records.clone()),
        }
    }
}

pub fn jane() -> Query {
    Query::new("Jane Doe").unwrap()
}

pub fn jane_linkedin() -> RawRecord {
    RawRecord::builder("linkedin", "https://www.linkedin.com/in/janedoe")
        .field("name", "Jane Doe")
        .field("employer", "Acme")
        .field("title", "Engineer")
        .confidence(0.9)
        .build()
}

pub fn jane_web() -> RawRecord {
    RawRecord::builder("web_search", "https://blog.example.org/jane")
        .field("name", "Jane Doe")
        .field("employer", "Acme")
        .confidence(0.6)
        .build()
}

pub fn jane_x() -> RawRecord {
    RawRecord::builder("x", "https://x.com/janedoe")
        .field("name", "Jane Doe")
        .field("handle", "@janedoe")
        .confidence(0.6)
        .build()
}

pub fn orchestrator_with_deadline(deadline: Duration) -> Orchestrator {
    Orchestrator::new(
        OrchestratorConfig {
            deadline,
            ..OrchestratorConfig::default()
        },
        Arc::new(ResultCache::new()),
        Arc::new(RateLimiter::default()),
    )
}

pub fn orchestrator() -> Orchestrator {
    orchestrator_with_deadline(Duration::from_secs(5))
}
