//! Research lifecycle events and the EventBus that broadcasts them
//!
//! Every research run emits events tagged with its session id so that a
//! front end (CLI progress output, HTTP streaming, test harness) can follow
//! the fan-out without coupling to the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Research event types
///
/// Events are broadcast via EventBus and can be serialized for streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResearchEvent {
    /// A research run started
    SessionStarted {
        session_id: Uuid,
        /// Full name being researched
        subject: String,
        /// Number of registered sources
        sources: usize,
        timestamp: DateTime<Utc>,
    },

    /// Records for a source were served from the cache
    CacheHit {
        session_id: Uuid,
        source: String,
        records: usize,
    },

    /// A source was not dispatched for this run
    SourceSkipped {
        session_id: Uuid,
        source: String,
        /// Human-readable skip reason (backoff, saturated, disabled)
        reason: String,
    },

    /// A source fetch returned records
    FetchCompleted {
        session_id: Uuid,
        source: String,
        records: usize,
        elapsed_ms: u64,
    },

    /// A source fetch failed with a classified adapter error
    FetchFailed {
        session_id: Uuid,
        source: String,
        error: String,
    },

    /// A source fetch was cancelled at the run deadline
    FetchTimedOut {
        session_id: Uuid,
        source: String,
        deadline_ms: u64,
    },

    /// Records were correlated into ranked entities
    CorrelationCompleted {
        session_id: Uuid,
        records: usize,
        entities: usize,
        /// Confidence of the best entity, if any
        top_confidence: Option<f64>,
    },

    /// A research run finished (successfully or not)
    SessionCompleted {
        session_id: Uuid,
        elapsed_ms: u64,
        /// Whether at least one source contributed records
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

impl ResearchEvent {
    /// Session id carried by every event
    pub fn session_id(&self) -> Uuid {
        match self {
            ResearchEvent::SessionStarted { session_id, .. }
            | ResearchEvent::CacheHit { session_id, .. }
            | ResearchEvent::SourceSkipped { session_id, .. }
            | ResearchEvent::FetchCompleted { session_id, .. }
            | ResearchEvent::FetchFailed { session_id, .. }
            | ResearchEvent::FetchTimedOut { session_id, .. }
            | ResearchEvent::CorrelationCompleted { session_id, .. }
            | ResearchEvent::SessionCompleted { session_id, .. } => *session_id,
        }
    }
    /// Variant name, used as the SSE event type
    pub fn event_type(&self) -> &'static str {
        match self {
            ResearchEvent::SessionStarted { .. } => "SessionStarted",
            ResearchEvent::CacheHit { .. } => "CacheHit",
            ResearchEvent::SourceSkipped { .. } => "SourceSkipped",
            ResearchEvent::FetchCompleted { .. } => "FetchCompleted",
            ResearchEvent::FetchFailed { .. } => "FetchFailed",
            ResearchEvent::FetchTimedOut { .. } => "FetchTimedOut",
            ResearchEvent::CorrelationCompleted { .. } => "CorrelationCompleted",
            ResearchEvent::SessionCompleted { .. } => "SessionCompleted",
        }
    }
}

/// Broadcast bus for research events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ResearchEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers start
    ///   lagging
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ResearchEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ResearchEvent,
    ) -> Result<usize, broadcast::error::SendError<ResearchEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ResearchEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
