//! Per-source token buckets with backoff override
//!
//! Each source gets a bucket of `capacity` tokens refilled at
//! `refill_per_second`, plus a cap on concurrent in-flight calls. A
//! `RateLimited(retry_after)` from an adapter empties the bucket and blocks
//! it until `retry_after` has passed; the first call after the block is
//! granted a single trial token.
//!
//! State is shared across concurrent research runs behind one async mutex.
//! Time comes from `tokio::time`, so tests can drive it with a paused clock.

use crate::types::SourceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Bucket parameters for one source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Burst size C
    pub capacity: u32,
    /// Refill rate R (tokens per second)
    pub refill_per_second: f64,
    /// Longest `acquire` will wait for a token
    pub max_wait_ms: u64,
    /// Concurrent calls allowed per source
    pub max_in_flight: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 5,
            refill_per_second: 1.0,
            max_wait_ms: 2000,
            max_in_flight: 2,
        }
    }
}

impl RateLimitSettings {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Reject parameters that would leave a bucket unable to refill
    pub fn validate(&self) -> Result<(), InvalidSettings> {
        if self.capacity == 0 {
            return Err(InvalidSettings("capacity must be at least 1".to_string()));
        }
        if !self.refill_per_second.is_finite() || self.refill_per_second <= 0.0 {
            return Err(InvalidSettings(format!(
                "refill_per_second must be a positive number (got {})",
                self.refill_per_second
            )));
        }
        if self.max_in_flight == 0 {
            return Err(InvalidSettings("max_in_flight must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Bucket parameters rejected by [`RateLimitSettings::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid rate limit settings: {0}")]
pub struct InvalidSettings(pub String);

/// `acquire` failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("No permit for {source_id} within {}ms", waited.as_millis())]
    WaitExceeded { source_id: SourceId, waited: Duration },
}

/// Grant to make one call to a source
///
/// Holds the source's in-flight slot until dropped, whether the call
/// completed, failed or was cancelled.
#[derive(Debug)]
pub struct Permit {
    source_id: SourceId,
    _in_flight: OwnedSemaphorePermit,
}

impl Permit {
    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }
}

#[derive(Debug)]
struct Bucket {
    settings: RateLimitSettings,
    tokens: f64,
    last_refill: Instant,
    blocked_until: Option<Instant>,
    in_flight: Arc<Semaphore>,
}

impl Bucket {
    fn new(settings: RateLimitSettings, now: Instant) -> Self {
        Self {
            settings,
            tokens: settings.capacity as f64,
            last_refill: now,
            blocked_until: None,
            in_flight: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
        }
    }

    fn refill(&mut self, now: Instant) {
        if let Some(until) = self.blocked_until {
            if now < until {
                return;
            }
            // Backoff over: restart refill from the end of the block with a
            // single trial token
            self.blocked_until = None;
            self.last_refill = until;
            self.tokens = self.tokens.max(1.0);
        }

        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.settings.refill_per_second)
            .min(self.settings.capacity as f64);
        self.last_refill = now;
    }

    fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        self.blocked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Earliest instant a token could be available
    ///
    /// `None` when the bucket would never refill within a representable
    /// instant.
    fn next_token_at(&self, now: Instant) -> Option<Instant> {
        if let Some(until) = self.blocked_until.filter(|until| *until > now) {
            return Some(until);
        }
        let deficit = (1.0 - self.tokens).max(0.0);
        if deficit == 0.0 {
            return Some(now);
        }
        if self.settings.refill_per_second <= 0.0 {
            return None;
        }
        let wait = Duration::try_from_secs_f64(deficit / self.settings.refill_per_second).ok()?;
        now.checked_add(wait)
    }
}

/// Rate limiter / backoff controller shared by all research runs
#[derive(Debug)]
pub struct RateLimiter {
    default_settings: RateLimitSettings,
    source_settings: HashMap<SourceId, RateLimitSettings>,
    buckets: Mutex<HashMap<SourceId, Bucket>>,
}

impl RateLimiter {
    pub fn new(default_settings: RateLimitSettings) -> Result<Self, InvalidSettings> {
        default_settings.validate()?;
        Ok(Self {
            default_settings,
            source_settings: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
        })
    }

    /// Override bucket parameters for one source
    pub fn with_source(
        mut self,
        source_id: SourceId,
        settings: RateLimitSettings,
    ) -> Result<Self, InvalidSettings> {
        settings
            .validate()
            .map_err(|e| InvalidSettings(format!("{}: {}", source_id, e.0)))?;
        self.source_settings.insert(source_id, settings);
        Ok(self)
    }

    pub fn settings_for(&self, source_id: &SourceId) -> RateLimitSettings {
        self.source_settings
            .get(source_id)
            .copied()
            .unwrap_or(self.default_settings)
    }

    /// Non-blocking check: would `try_acquire` succeed right now?
    ///
    /// Does not consume a token.
    pub async fn available(&self, source_id: &SourceId) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = self.bucket(&mut buckets, source_id, now);
        bucket.refill(now);
        bucket.tokens >= 1.0 && bucket.in_flight.available_permits() > 0
    }

    /// Take a permit if one is available immediately
    pub async fn try_acquire(&self, source_id: &SourceId) -> Option<Permit> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = self.bucket(&mut buckets, source_id, now);
        bucket.refill(now);

        if bucket.tokens < 1.0 {
            debug!(source = %source_id, tokens = bucket.tokens, "No token available");
            return None;
        }
        let in_flight = bucket.in_flight.clone().try_acquire_owned().ok()?;
        bucket.tokens -= 1.0;

        Some(Permit {
            source_id: source_id.clone(),
            _in_flight: in_flight,
        })
    }

    /// Wait for a permit, up to the source's `max_wait`
    pub async fn acquire(&self, source_id: &SourceId) -> Result<Permit, AcquireError> {
        let max_wait = self.settings_for(source_id).max_wait();
        let started = Instant::now();
        let deadline = started + max_wait;
        let exceeded = || AcquireError::WaitExceeded {
            source_id: source_id.clone(),
            waited: max_wait,
        };

        let semaphore = {
            let mut buckets = self.buckets.lock().await;
            self.bucket(&mut buckets, source_id, started).in_flight.clone()
        };
        let in_flight = tokio::time::timeout_at(deadline, semaphore.acquire_owned())
            .await
            .map_err(|_| exceeded())?
            .map_err(|_| exceeded())?;

        loop {
            let now = Instant::now();
            let ready_at = {
                let mut buckets = self.buckets.lock().await;
                let bucket = self.bucket(&mut buckets, source_id, now);
                bucket.refill(now);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(Permit {
                        source_id: source_id.clone(),
                        _in_flight: in_flight,
                    });
                }
                bucket.next_token_at(now)
            };

            match ready_at {
                Some(ready_at) if ready_at <= deadline => {
                    tokio::time::sleep_until(ready_at).await;
                }
                _ => {
                    debug!(source = %source_id, "Permit wait would exceed max_wait");
                    return Err(exceeded());
                }
            }
        }
    }

    /// Force the bucket empty until `retry_after` has passed
    ///
    /// An existing longer backoff is kept.
    pub async fn backoff(&self, source_id: &SourceId, retry_after: Duration) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = self.bucket(&mut buckets, source_id, now);

        let until = now + retry_after;
        bucket.blocked_until = Some(bucket.blocked_until.map_or(until, |u| u.max(until)));
        bucket.tokens = 0.0;

        debug!(
            source = %source_id,
            retry_after_secs = retry_after.as_secs(),
            "Backoff engaged"
        );
    }

    /// Remaining backoff for a source, if any
    pub async fn backoff_remaining(&self, source_id: &SourceId) -> Option<Duration> {
        let now = Instant::now();
        let buckets = self.buckets.lock().await;
        buckets.get(source_id)?.backoff_remaining(now)
    }

    fn bucket<'a>(
        &self,
        buckets: &'a mut HashMap<SourceId, Bucket>,
        source_id: &SourceId,
        now: Instant,
    ) -> &'a mut Bucket {
        buckets
            .entry(source_id.clone())
            .or_insert_with(|| Bucket::new(self.settings_for(source_id), now))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            default_settings: RateLimitSettings::default(),
            source_settings: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
        }
    }
}
