//! Research endpoint
//!
//! POST /research
//! ```json
//! { "name": "Jane Doe", "hints": { "employer": "Acme", "location": "Berlin" } }
//! ```
//! Responds with the full outcome plus the assembled report.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::orchestrator::ResearchOutcome;
use crate::report::{assemble_report, Report};
use crate::types::{HintKind, Query};
use crate::AppState;

/// Research request body
#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub name: String,
    /// Hint kind → value (location, employer, profession, education)
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
}

impl ResearchRequest {
    pub fn to_query(&self) -> Result<Query, ApiError> {
        let mut query = Query::new(&self.name)?;
        for (kind, value) in &self.hints {
            let kind: HintKind = kind.parse()?;
            query = query.with_hint(kind, value.clone());
        }
        Ok(query)
    }
}

/// Research response body
#[derive(Debug, Serialize)]
pub struct ResearchResponse {
    pub outcome: ResearchOutcome,
    pub report: Report,
}

/// POST /research
pub async fn research(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> ApiResult<Json<ResearchResponse>> {
    let query = request.to_query()?;

    match state.orchestrator.research(&query).await {
        Ok(outcome) => {
            let report = assemble_report(&outcome);
            Ok(Json(ResearchResponse { outcome, report }))
        }
        Err(err) => {
            warn!(subject = %query.full_name(), error = %err, "Research failed");
            *state.last_error.write().await = Some(err.to_string());
            Err(err.into())
        }
    }
}

pub fn research_routes() -> Router<AppState> {
    Router::new().route("/research", post(research))
}
