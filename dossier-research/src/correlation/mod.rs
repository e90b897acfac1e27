//! Entity correlation
//!
//! Raw records from all sources are scored pairwise, merged through a
//! disjoint-set forest, and folded into ranked `Entity` values.

pub mod correlator;
pub mod similarity;
pub mod union_find;

pub use correlator::{Correlation, Correlator};
pub use union_find::UnionFind;

use serde::{Deserialize, Serialize};

/// Relative weights of the pairwise score components
///
/// Components a pair has no data for (e.g. no shared attributes) are left
/// out of the weighted average rather than counted as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationWeights {
    pub name: f64,
    pub attributes: f64,
    pub hints: f64,
    pub cross_reference: f64,
}

impl Default for CorrelationWeights {
    fn default() -> Self {
        Self {
            name: 0.5,
            attributes: 0.25,
            hints: 0.25,
            cross_reference: 1.0,
        }
    }
}

impl CorrelationWeights {
    pub fn total(&self) -> f64 {
        self.name + self.attributes + self.hints + self.cross_reference
    }
}

/// Correlator tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Pairwise score at or above which two records merge
    pub similarity_threshold: f64,
    /// Minimum name relevance to the query for a record to be considered
    pub relevance_threshold: f64,
    pub weights: CorrelationWeights,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            relevance_threshold: 0.75,
            weights: CorrelationWeights::default(),
        }
    }
}
