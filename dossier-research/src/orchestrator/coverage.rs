//! Per-source coverage notes
//!
//! Every registered source ends a research run with exactly one note saying
//! whether it contributed and, if not, why.

use crate::adapters::AdapterError;
use crate::types::SourceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a source was not dispatched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Source asked us to back off earlier
    Backoff { remaining: Duration },
    /// Token bucket empty or in-flight cap reached
    Saturated,
}

/// Outcome for one source in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoverageStatus {
    Fetched { records: usize },
    Cached { records: usize },
    Skipped { reason: SkipReason },
    Failed { error: AdapterError },
    TimedOut,
    Disabled,
}

impl CoverageStatus {
    /// Whether the source's records reached the correlator
    pub fn contributed(&self) -> bool {
        matches!(
            self,
            CoverageStatus::Fetched { .. } | CoverageStatus::Cached { .. }
        )
    }
}

/// Coverage annotation for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageNote {
    pub source_id: SourceId,
    #[serde(flatten)]
    pub status: CoverageStatus,
}

impl CoverageNote {
    pub fn new(source_id: SourceId, status: CoverageStatus) -> Self {
        Self { source_id, status }
    }

    pub fn is_gap(&self) -> bool {
        !self.status.contributed()
    }
}

impl fmt::Display for CoverageNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CoverageStatus::Fetched { records } => {
                write!(f, "{}: fetched {} record(s)", self.source_id, records)
            }
            CoverageStatus::Cached { records } => {
                write!(f, "{}: {} cached record(s)", self.source_id, records)
            }
            CoverageStatus::Skipped {
                reason: SkipReason::Backoff { remaining },
            } => write!(
                f,
                "{}: skipped, backing off for another {}s after being rate limited",
                self.source_id,
                remaining.as_secs().max(1)
            ),
            CoverageStatus::Skipped {
                reason: SkipReason::Saturated,
            } => write!(f, "{}: skipped, request budget exhausted", self.source_id),
            CoverageStatus::Failed { error } => write!(f, "{}: failed ({})", self.source_id, error),
            CoverageStatus::TimedOut => {
                write!(f, "{}: no answer before the deadline", self.source_id)
            }
            CoverageStatus::Disabled => write!(f, "{}: disabled", self.source_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaps() {
        let fetched = CoverageNote::new(SourceId::from("linkedin"), CoverageStatus::Fetched { records: 2 });
        let cached = CoverageNote::new(SourceId::from("web_search"), CoverageStatus::Cached { records: 0 });
        let timed_out = CoverageNote::new(SourceId::from("x"), CoverageStatus::TimedOut);
        assert!(!fetched.is_gap());
        assert!(!cached.is_gap());
        assert!(timed_out.is_gap());
    }

    #[test]
    fn test_display_backoff() {
        let note = CoverageNote::new(
            SourceId::from("x"),
            CoverageStatus::Skipped {
                reason: SkipReason::Backoff {
                    remaining: Duration::from_secs(25),
                },
            },
        );
        assert_eq!(
            note.to_string(),
            "x: skipped, backing off for another 25s after being rate limited"
        );
    }

    #[test]
    fn test_serializes_flat() {
        let note = CoverageNote::new(
            SourceId::from("x"),
            CoverageStatus::Failed {
                error: AdapterError::forbidden("HTTP 403"),
            },
        );
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["source_id"], "x");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"]["kind"], "forbidden");
    }
}
