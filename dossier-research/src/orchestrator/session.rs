//! Research run results and session summary

use super::coverage::{CoverageNote, CoverageStatus};
use crate::types::{Entity, Query};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counters for one research run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub fetched: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub disabled: usize,
    /// Raw records handed to the correlator
    pub records: usize,
    pub elapsed_ms: u64,
}

impl SessionSummary {
    pub fn from_coverage(coverage: &[CoverageNote], records: usize, elapsed_ms: u64) -> Self {
        let mut summary = Self {
            records,
            elapsed_ms,
            ..Self::default()
        };
        for note in coverage {
            match note.status {
                CoverageStatus::Fetched { .. } => summary.fetched += 1,
                CoverageStatus::Cached { .. } => summary.cached += 1,
                CoverageStatus::Skipped { .. } => summary.skipped += 1,
                CoverageStatus::Failed { .. } => summary.failed += 1,
                CoverageStatus::TimedOut => summary.timed_out += 1,
                CoverageStatus::Disabled => summary.disabled += 1,
            }
        }
        summary
    }

    /// Sources whose records reached the correlator
    pub fn contributing(&self) -> usize {
        self.fetched + self.cached
    }
}

/// Result of a successful research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub session_id: Uuid,
    pub query: Query,
    /// Ranked best-first; empty when `ambiguous`
    pub entities: Vec<Entity>,
    /// No candidate cleared the relevance threshold
    pub ambiguous: bool,
    /// One note per registered source, in dispatch order
    pub coverage: Vec<CoverageNote>,
    pub summary: SessionSummary,
}

impl ResearchOutcome {
    /// Best-ranked entity
    pub fn best(&self) -> Option<&Entity> {
        self.entities.first()
    }

    /// Lower-ranked candidate identities
    pub fn alternates(&self) -> &[Entity] {
        self.entities.get(1..).unwrap_or(&[])
    }

    /// Sources that did not contribute records
    pub fn coverage_gaps(&self) -> Vec<&CoverageNote> {
        self.coverage.iter().filter(|n| n.is_gap()).collect()
    }
}
