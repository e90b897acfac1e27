//! dossier-research library interface
//!
//! Multi-source person research: source adapters, rate limiting, result
//! caching, deadline-bounded orchestration, entity correlation and report
//! assembly. The `dossier` binary and the HTTP API are thin front ends over
//! `Orchestrator::research`.

pub mod adapters;
pub mod api;
pub mod cache;
pub mod config;
pub mod correlation;
pub mod error;
pub mod orchestrator;
pub mod rate_limiter;
pub mod report;
pub mod types;

pub use crate::config::DossierConfig;
pub use crate::error::{ApiError, ApiResult, ResearchError};
pub use crate::orchestrator::{CoverageNote, CoverageStatus, Orchestrator, ResearchOutcome};
pub use crate::types::{Entity, HintKind, Query, RawRecord, SourceId};

use axum::Router;
use chrono::{DateTime, Utc};
use dossier_common::events::EventBus;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Event bus the orchestrator publishes research events to
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last research failure for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wrap an orchestrator, attaching `event_bus` to it
    pub fn new(orchestrator: Orchestrator, event_bus: EventBus) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator.with_event_bus(event_bus.clone())),
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::research_routes())
        .merge(api::event_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
