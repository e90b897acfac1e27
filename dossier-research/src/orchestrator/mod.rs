//! Research Orchestrator
//!
//! Fans a query out to every registered source under one wall-clock
//! deadline, then correlates whatever came back.
//!
//! # Per-source decision (dispatch order)
//! 1. Disabled in config → `Disabled`
//! 2. Fresh cache entry → `Cached` (no fetch)
//! 3. No rate-limit permit right now → `Skipped` (never queued)
//! 4. Otherwise spawned into the run's `JoinSet` holding its permit
//!
//! # Deadline
//! Fetches share one deadline and one cancellation token. At the deadline
//! the token is cancelled and budget-aware adapters get one scheduler turn
//! to return; then remaining tasks are aborted (dropping their permits) and
//! their sources are noted `TimedOut`. Nothing is cached for them, so a
//! later run retries. A `RateLimited` returned after the deadline still
//! engages backoff.
//!
//! # Failure semantics
//! Adapter errors become `Failed` coverage notes, as does a panicking
//! adapter task. Only a run where no source contributed fails, with
//! `ResearchError::NoSourcesAvailable`.

pub mod coverage;
pub mod session;

pub use coverage::{CoverageNote, CoverageStatus, SkipReason};
pub use session::{ResearchOutcome, SessionSummary};

use crate::adapters::screening::screen_records;
use crate::adapters::{AdapterError, SourceAdapter};
use crate::cache::ResultCache;
use crate::correlation::{Correlator, CorrelatorConfig};
use crate::error::ResearchError;
use crate::rate_limiter::RateLimiter;
use crate::types::{Query, RawRecord, SourceId, TimeBudget};
use chrono::Utc;
use dossier_common::events::{EventBus, ResearchEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Orchestrator tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Wall-clock bound on the whole fan-out
    pub deadline: Duration,
    pub correlator: CorrelatorConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(5),
            correlator: CorrelatorConfig::default(),
        }
    }
}

/// A registered source and its per-source settings
#[derive(Clone)]
pub struct SourceRegistration {
    pub adapter: Arc<dyn SourceAdapter>,
    pub enabled: bool,
    /// Overrides the adapter's volatility-based TTL
    pub cache_ttl: Option<Duration>,
}

impl SourceRegistration {
    pub fn new(adapter: Arc<dyn SourceAdapter>) -> Self {
        Self {
            adapter,
            enabled: true,
            cache_ttl: None,
        }
    }

    pub fn source_id(&self) -> &SourceId {
        self.adapter.source_id()
    }

    fn ttl(&self) -> Duration {
        self.cache_ttl
            .unwrap_or_else(|| self.adapter.volatility().default_ttl())
    }
}

/// What a spawned fetch task reports back
enum FetchOutcome {
    Completed(Result<Vec<RawRecord>, AdapterError>),
    /// Returned only because the deadline passed; records are discarded
    Expired(Result<Vec<RawRecord>, AdapterError>),
}

type FetchReport = (usize, Duration, FetchOutcome);

/// Multi-source research orchestrator
///
/// Cache and rate limiter are shared handles, so several orchestrators (or
/// concurrent `research` calls on one) see the same state.
pub struct Orchestrator {
    sources: Vec<SourceRegistration>,
    cache: Arc<ResultCache>,
    limiter: Arc<RateLimiter>,
    correlator: Correlator,
    deadline: Duration,
    events: Option<EventBus>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, cache: Arc<ResultCache>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            sources: Vec::new(),
            cache,
            limiter,
            correlator: Correlator::new(config.correlator),
            deadline: config.deadline,
            events: None,
        }
    }

    /// Register an enabled adapter with its default TTL
    pub fn with_adapter(self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.with_source(SourceRegistration::new(adapter))
    }

    /// Register a source; registration order is dispatch order
    pub fn with_source(mut self, registration: SourceRegistration) -> Self {
        self.sources.push(registration);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.source_id().clone()).collect()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Research one person across all registered sources
    pub async fn research(&self, query: &Query) -> Result<ResearchOutcome, ResearchError> {
        let session_id = Uuid::new_v4();
        let started = Instant::now();
        let deadline = started + self.deadline;
        let cancel = CancellationToken::new();

        info!(
            session_id = %session_id,
            subject = %query.full_name(),
            sources = self.sources.len(),
            "Research started"
        );
        self.emit(ResearchEvent::SessionStarted {
            session_id,
            subject: query.full_name().to_string(),
            sources: self.sources.len(),
            timestamp: Utc::now(),
        });

        let mut statuses: Vec<Option<CoverageStatus>> = vec![None; self.sources.len()];
        let mut records: Vec<Vec<RawRecord>> = vec![Vec::new(); self.sources.len()];
        let mut tasks: JoinSet<FetchReport> = JoinSet::new();
        let mut task_sources: HashMap<task::Id, usize> = HashMap::new();

        // Phase 1: decide per source, spawn eligible fetches
        for (idx, source) in self.sources.iter().enumerate() {
            let source_id = source.source_id().clone();

            if !source.enabled {
                statuses[idx] = Some(CoverageStatus::Disabled);
                self.emit(ResearchEvent::SourceSkipped {
                    session_id,
                    source: source_id.to_string(),
                    reason: "disabled".to_string(),
                });
                continue;
            }

            if let Some(cached) = self.cache.get(&source_id, query).await {
                debug!(source = %source_id, records = cached.len(), "Cache hit");
                self.emit(ResearchEvent::CacheHit {
                    session_id,
                    source: source_id.to_string(),
                    records: cached.len(),
                });
                statuses[idx] = Some(CoverageStatus::Cached {
                    records: cached.len(),
                });
                records[idx] = cached;
                continue;
            }

            let Some(permit) = self.limiter.try_acquire(&source_id).await else {
                let reason = match self.limiter.backoff_remaining(&source_id).await {
                    Some(remaining) => SkipReason::Backoff { remaining },
                    None => SkipReason::Saturated,
                };
                warn!(source = %source_id, reason = ?reason, "Source skipped");
                let note = CoverageNote::new(source_id.clone(), CoverageStatus::Skipped { reason });
                self.emit(ResearchEvent::SourceSkipped {
                    session_id,
                    source: source_id.to_string(),
                    reason: note.to_string(),
                });
                statuses[idx] = Some(note.status);
                continue;
            };

            let adapter = Arc::clone(&source.adapter);
            let query = query.clone();
            let budget = TimeBudget::new(deadline, cancel.child_token());
            let handle = tasks.spawn(async move {
                // Permit lives exactly as long as the fetch (incl. abort)
                let _permit = permit;
                let fetch_started = Instant::now();
                let result = adapter.fetch(&query, budget.clone()).await;
                let outcome = if budget.is_exhausted() {
                    FetchOutcome::Expired(result)
                } else {
                    FetchOutcome::Completed(result)
                };
                (idx, fetch_started.elapsed(), outcome)
            });
            task_sources.insert(handle.id(), idx);
        }

        // Phase 2: collect until the deadline
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(None) => break,
                Ok(Some(joined)) => {
                    self.absorb(session_id, query, &task_sources, joined, &mut statuses, &mut records)
                        .await;
                }
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        if deadline_hit {
            cancel.cancel();
            // One turn for cancelled adapters to hand back their result
            task::yield_now().await;
            while let Some(joined) = tasks.try_join_next_with_id() {
                self.absorb(session_id, query, &task_sources, joined, &mut statuses, &mut records)
                    .await;
            }
            tasks.abort_all();
        }

        let purged = self.cache.purge_expired().await;
        if purged > 0 {
            debug!(purged = purged, "Purged expired cache entries");
        }

        // Every finished task has a status; the rest were cut off
        let coverage: Vec<CoverageNote> = self
            .sources
            .iter()
            .zip(statuses)
            .map(|(source, status)| {
                let status = status.unwrap_or_else(|| {
                    warn!(source = %source.source_id(), "Fetch cancelled at deadline");
                    self.timed_out(session_id, source.source_id())
                });
                CoverageNote::new(source.source_id().clone(), status)
            })
            .collect();

        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !coverage.iter().any(|n| n.status.contributed()) {
            warn!(
                session_id = %session_id,
                sources = coverage.len(),
                "No source contributed records"
            );
            self.emit(ResearchEvent::SessionCompleted {
                session_id,
                elapsed_ms,
                success: false,
                timestamp: Utc::now(),
            });
            return Err(ResearchError::NoSourcesAvailable { coverage });
        }

        // Phase 3: correlate in dispatch order
        let all_records: Vec<RawRecord> = records.into_iter().flatten().collect();
        let correlation = self.correlator.correlate(&all_records, query);
        self.emit(ResearchEvent::CorrelationCompleted {
            session_id,
            records: all_records.len(),
            entities: correlation.entities.len(),
            top_confidence: correlation.entities.first().map(|e| e.aggregate_confidence),
        });

        let summary = SessionSummary::from_coverage(&coverage, all_records.len(), elapsed_ms);
        info!(
            session_id = %session_id,
            fetched = summary.fetched,
            cached = summary.cached,
            skipped = summary.skipped,
            failed = summary.failed,
            timed_out = summary.timed_out,
            entities = correlation.entities.len(),
            elapsed_ms = elapsed_ms,
            "Research completed"
        );
        self.emit(ResearchEvent::SessionCompleted {
            session_id,
            elapsed_ms,
            success: true,
            timestamp: Utc::now(),
        });

        Ok(ResearchOutcome {
            session_id,
            query: query.clone(),
            entities: correlation.entities,
            ambiguous: correlation.ambiguous,
            coverage,
            summary,
        })
    }

    /// Record the status of one joined fetch task
    async fn absorb(
        &self,
        session_id: Uuid,
        query: &Query,
        task_sources: &HashMap<task::Id, usize>,
        joined: Result<(task::Id, FetchReport), JoinError>,
        statuses: &mut [Option<CoverageStatus>],
        records: &mut [Vec<RawRecord>],
    ) {
        match joined {
            Ok((_, (idx, elapsed, outcome))) => {
                let (status, fetched) = self
                    .handle_fetch(session_id, query, &self.sources[idx], elapsed, outcome)
                    .await;
                statuses[idx] = Some(status);
                records[idx] = fetched;
            }
            Err(join_error) => {
                let Some(&idx) = task_sources.get(&join_error.id()) else {
                    warn!(session_id = %session_id, error = %join_error, "Unknown adapter task failed");
                    return;
                };
                let source_id = self.sources[idx].source_id();
                let error = if join_error.is_panic() {
                    AdapterError::unreachable("adapter task panicked")
                } else {
                    AdapterError::unreachable("adapter task aborted")
                };
                warn!(source = %source_id, error = %join_error, "Adapter task failed");
                self.emit(ResearchEvent::FetchFailed {
                    session_id,
                    source: source_id.to_string(),
                    error: error.to_string(),
                });
                statuses[idx] = Some(CoverageStatus::Failed { error });
            }
        }
    }

    fn timed_out(&self, session_id: Uuid, source_id: &SourceId) -> CoverageStatus {
        self.emit(ResearchEvent::FetchTimedOut {
            session_id,
            source: source_id.to_string(),
            deadline_ms: self.deadline.as_millis() as u64,
        });
        CoverageStatus::TimedOut
    }

    /// Classify one finished fetch, caching and backing off as needed
    async fn handle_fetch(
        &self,
        session_id: Uuid,
        query: &Query,
        source: &SourceRegistration,
        elapsed: Duration,
        outcome: FetchOutcome,
    ) -> (CoverageStatus, Vec<RawRecord>) {
        let source_id = source.source_id();

        let error = match outcome {
            FetchOutcome::Expired(result) => {
                if let Err(AdapterError::RateLimited { retry_after }) = &result {
                    self.limiter.backoff(source_id, *retry_after).await;
                }
                debug!(source = %source_id, "Fetch returned after deadline; discarded");
                return (self.timed_out(session_id, source_id), Vec::new());
            }
            FetchOutcome::Completed(Ok(fetched)) => match screen_records(&fetched) {
                Ok(()) => {
                    self.cache
                        .put(source_id, query, fetched.clone(), source.ttl())
                        .await;
                    debug!(
                        source = %source_id,
                        records = fetched.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Fetch completed"
                    );
                    self.emit(ResearchEvent::FetchCompleted {
                        session_id,
                        source: source_id.to_string(),
                        records: fetched.len(),
                        elapsed_ms: elapsed.as_millis() as u64,
                    });
                    return (
                        CoverageStatus::Fetched {
                            records: fetched.len(),
                        },
                        fetched,
                    );
                }
                Err(leak) => leak,
            },
            FetchOutcome::Completed(Err(error)) => error,
        };

        if let AdapterError::RateLimited { retry_after } = &error {
            self.limiter.backoff(source_id, *retry_after).await;
        }
        warn!(source = %source_id, error = %error, "Source failed");
        self.emit(ResearchEvent::FetchFailed {
            session_id,
            source: source_id.to_string(),
            error: error.to_string(),
        });
        (CoverageStatus::Failed { error }, Vec::new())
    }

    fn emit(&self, event: ResearchEvent) {
        if let Some(events) = &self.events {
            events.emit_lossy(event);
        }
    }
}
