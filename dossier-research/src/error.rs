//! Error types for dossier-research
//!
//! Only `InvalidQuery` and `NoSourcesAvailable` reach the caller of a
//! research run; adapter failures are recorded as coverage notes instead.

use crate::orchestrator::CoverageNote;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Research-level error
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Malformed query (empty name, unknown hint kind)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Every source failed, timed out or was skipped
    #[error("No sources available ({} skipped or failed)", coverage.len())]
    NoSourcesAvailable { coverage: Vec<CoverageNote> },

    /// Configuration rejected at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Export serialization failed
    #[error("Export error: {0}")]
    Export(String),

    /// dossier-common error
    #[error("Common error: {0}")]
    Common(#[from] dossier_common::Error),
}

/// API error type for the HTTP front end
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No source could answer (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ResearchError> for ApiError {
    fn from(err: ResearchError) -> Self {
        match err {
            ResearchError::InvalidQuery(msg) => ApiError::BadRequest(msg),
            ResearchError::NoSourcesAvailable { .. } => ApiError::Unavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NO_SOURCES_AVAILABLE",
                msg,
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_error_maps_to_api_status() {
        let api: ApiError = ResearchError::InvalidQuery("empty".to_string()).into();
        assert_eq!(api.into_response().status(), StatusCode::BAD_REQUEST);

        let api: ApiError = ResearchError::NoSourcesAvailable { coverage: vec![] }.into();
        assert_eq!(api.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let api: ApiError = ResearchError::Export("csv".to_string()).into();
        assert_eq!(api.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
