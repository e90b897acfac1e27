//! Offline fixture adapter
//!
//! Serves canned records from a JSON file so research runs can be replayed
//! without network access (demos, CLI `--fixtures`, integration tests).
//!
//! File layout: source id → normalized name → records
//!
//! ```json
//! {
//!   "linkedin": {
//!     "jane doe": [
//!       { "identifier": "https://www.linkedin.com/in/janedoe",
//!         "confidence": 0.9,
//!         "fields": { "name": "Jane Doe", "employer": "Acme" } }
//!     ]
//!   }
//! }
//! ```

use super::{AdapterError, SourceAdapter, Volatility};
use crate::correlation::similarity::normalize_name;
use crate::error::ResearchError;
use crate::types::{Query, RawRecord, SourceId, TimeBudget};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
struct FixtureRecord {
    identifier: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

fn default_confidence() -> f64 {
    0.5
}

type NameIndex = BTreeMap<String, Vec<FixtureRecord>>;

/// Parsed fixture file
#[derive(Debug, Clone, Default)]
pub struct FixtureSet {
    sources: BTreeMap<SourceId, NameIndex>,
}

impl FixtureSet {
    /// Load a fixture file
    pub fn load(path: &Path) -> Result<Self, ResearchError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ResearchError::Config(format!("Cannot read fixtures {}: {}", path.display(), e)))?;
        let set = Self::from_json(&content)?;
        info!(path = %path.display(), sources = set.sources.len(), "Loaded fixtures");
        Ok(set)
    }

    pub fn from_json(content: &str) -> Result<Self, ResearchError> {
        let raw: BTreeMap<String, NameIndex> = serde_json::from_str(content)
            .map_err(|e| ResearchError::Config(format!("Invalid fixture file: {}", e)))?;

        // Re-key names through the same normalization queries use
        let sources = raw
            .into_iter()
            .map(|(source, names)| {
                let names = names
                    .into_iter()
                    .map(|(name, records)| (normalize_name(&name), records))
                    .collect();
                (SourceId::from(source), names)
            })
            .collect();

        Ok(Self { sources })
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &SourceId> {
        self.sources.keys()
    }

    /// One adapter per source in the file, in source-id order
    pub fn adapters(&self) -> Vec<Arc<dyn SourceAdapter>> {
        self.sources
            .keys()
            .map(|id| Arc::new(FixtureAdapter::new(self.clone(), id.clone())) as Arc<dyn SourceAdapter>)
            .collect()
    }
}

/// Adapter replaying fixture records for one source
pub struct FixtureAdapter {
    source_id: SourceId,
    records: NameIndex,
    volatility: Volatility,
    latency: Duration,
}

impl FixtureAdapter {
    pub fn new(set: FixtureSet, source_id: SourceId) -> Self {
        let records = set.sources.get(&source_id).cloned().unwrap_or_default();
        Self {
            source_id,
            records,
            volatility: Volatility::Stable,
            latency: Duration::ZERO,
        }
    }

    pub fn with_volatility(mut self, volatility: Volatility) -> Self {
        self.volatility = volatility;
        self
    }

    /// Simulated response latency (still bounded by the time budget)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl SourceAdapter for FixtureAdapter {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn volatility(&self) -> Volatility {
        self.volatility
    }

    async fn fetch(
        &self,
        query: &Query,
        budget: TimeBudget,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        if !self.latency.is_zero()
            && budget.run(tokio::time::sleep(self.latency)).await.is_none()
        {
            return Ok(vec![]);
        }

        let key = normalize_name(query.full_name());
        let records: Vec<RawRecord> = self
            .records
            .get(&key)
            .map(|fixtures| {
                fixtures
                    .iter()
                    .map(|f| {
                        f.fields
                            .iter()
                            .fold(
                                RawRecord::builder(self.source_id.clone(), f.identifier.clone()),
                                |b, (name, value)| b.field(name, value.clone()),
                            )
                            .confidence(f.confidence)
                            .build()
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(source = %self.source_id, key = %key, records = records.len(), "Fixture lookup");
        Ok(records)
    }
}
