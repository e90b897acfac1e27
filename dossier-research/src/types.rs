//! Core data model for research runs
//!
//! - `Query`: the person being researched plus optional disambiguator hints
//! - `RawRecord`: one candidate record produced by exactly one source adapter
//! - `TimeBudget`: wall-clock deadline and cancellation handed to adapters
//! - `Entity`: a correlated identity merged from one or more raw records
//!
//! Raw records and entities are immutable once built; the correlator is the
//! only component that reads raw records and the only one that builds
//! entities.

use crate::correlation::similarity::{normalize_name, normalize_text};
use crate::error::ResearchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Well-known attribute names used across adapters
pub mod fields {
    pub const NAME: &str = "name";
    pub const EMPLOYER: &str = "employer";
    pub const TITLE: &str = "title";
    pub const LOCATION: &str = "location";
    pub const EDUCATION: &str = "education";
    pub const HEADLINE: &str = "headline";
    pub const BIO: &str = "bio";
    pub const SNIPPET: &str = "snippet";
    pub const HANDLE: &str = "handle";
    pub const URL: &str = "url";
    pub const WEBSITE: &str = "website";
    pub const LINKS: &str = "links";

    /// Attributes expected to differ per source (not reported as conflicts)
    pub const PER_SOURCE: &[&str] = &[URL, WEBSITE, LINKS, HANDLE, SNIPPET, BIO, HEADLINE];

    /// Attributes compared between records during correlation
    pub const IDENTITY: &[&str] = &[EMPLOYER, TITLE, LOCATION, EDUCATION];

    /// Attributes that may carry cross-reference URLs
    pub const REFERENCES: &[&str] = &[URL, WEBSITE, LINKS];
}

// ============================================================================
// Source identity
// ============================================================================

/// Identifier of a source adapter (e.g. "web_search", "linkedin", "x")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Query
// ============================================================================

/// Disambiguator hint kinds accepted alongside a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    Location,
    Employer,
    Profession,
    Education,
}

impl HintKind {
    pub const ALL: [HintKind; 4] = [
        HintKind::Location,
        HintKind::Employer,
        HintKind::Profession,
        HintKind::Education,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HintKind::Location => "location",
            HintKind::Employer => "employer",
            HintKind::Profession => "profession",
            HintKind::Education => "education",
        }
    }

    /// Record attribute names a hint of this kind is compared against
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            HintKind::Location => &[fields::LOCATION],
            HintKind::Employer => &[fields::EMPLOYER],
            HintKind::Profession => &[fields::TITLE, fields::HEADLINE],
            HintKind::Education => &[fields::EDUCATION],
        }
    }
}

impl std::fmt::Display for HintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HintKind {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "location" => Ok(HintKind::Location),
            "employer" | "company" | "organization" => Ok(HintKind::Employer),
            "profession" | "title" => Ok(HintKind::Profession),
            "education" | "school" => Ok(HintKind::Education),
            other => Err(ResearchError::InvalidQuery(format!(
                "Unknown hint kind: {}",
                other
            ))),
        }
    }
}

/// A research request: a full name plus optional disambiguators
///
/// Immutable once constructed; `with_hint` consumes and returns a new value.
/// Deserialization goes through the same checks as `new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QueryData")]
pub struct Query {
    full_name: String,
    hints: BTreeMap<HintKind, String>,
}

/// Unchecked wire form of `Query`
#[derive(Deserialize)]
struct QueryData {
    full_name: String,
    #[serde(default)]
    hints: BTreeMap<HintKind, String>,
}

impl TryFrom<QueryData> for Query {
    type Error = ResearchError;

    fn try_from(data: QueryData) -> Result<Self, Self::Error> {
        Ok(data
            .hints
            .into_iter()
            .fold(Query::new(data.full_name)?, |query, (kind, value)| {
                query.with_hint(kind, value)
            }))
    }
}

impl Query {
    /// Create a query, rejecting empty names
    pub fn new(full_name: impl Into<String>) -> Result<Self, ResearchError> {
        let full_name = full_name.into().split_whitespace().collect::<Vec<_>>().join(" ");
        if full_name.is_empty() {
            return Err(ResearchError::InvalidQuery(
                "Name cannot be empty".to_string(),
            ));
        }
        if normalize_name(&full_name).is_empty() {
            return Err(ResearchError::InvalidQuery(format!(
                "Name '{}' has no searchable characters",
                full_name
            )));
        }
        Ok(Self {
            full_name,
            hints: BTreeMap::new(),
        })
    }

    /// Add a disambiguator hint (blank values are ignored)
    pub fn with_hint(mut self, kind: HintKind, value: impl Into<String>) -> Self {
        let value = value.into().trim().to_string();
        if !value.is_empty() {
            self.hints.insert(kind, value);
        }
        self
    }

    /// Add an optional hint, as collected from optional prompts or flags
    pub fn with_optional_hint(self, kind: HintKind, value: Option<String>) -> Self {
        match value {
            Some(value) => self.with_hint(kind, value),
            None => self,
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn hints(&self) -> &BTreeMap<HintKind, String> {
        &self.hints
    }

    pub fn hint(&self, kind: HintKind) -> Option<&str> {
        self.hints.get(&kind).map(String::as_str)
    }

    /// Canonical form used as cache key input
    ///
    /// Equal for queries that differ only in case, punctuation or spacing.
    pub fn normalized(&self) -> String {
        let mut out = normalize_name(&self.full_name);
        for (kind, value) in &self.hints {
            out.push('|');
            out.push_str(kind.as_str());
            out.push('=');
            out.push_str(&normalize_text(value));
        }
        out
    }

    /// Free-text search string: name, then employer, profession, location
    pub fn search_terms(&self) -> String {
        let mut parts = vec![self.full_name.as_str()];
        for kind in [
            HintKind::Employer,
            HintKind::Profession,
            HintKind::Location,
        ] {
            if let Some(value) = self.hint(kind) {
                parts.push(value);
            }
        }
        parts.join(" ")
    }
}

// ============================================================================
// Raw records
// ============================================================================

/// Candidate record produced by a single adapter call
///
/// Fields are private: a record cannot be modified once built.
/// Deserialized records are normalized like built ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRecordData")]
pub struct RawRecord {
    source_id: SourceId,
    retrieved_at: DateTime<Utc>,
    fields: BTreeMap<String, String>,
    confidence: f64,
    source_identifier: String,
}

/// Unchecked wire form of `RawRecord`
#[derive(Deserialize)]
struct RawRecordData {
    source_id: SourceId,
    retrieved_at: DateTime<Utc>,
    fields: BTreeMap<String, String>,
    confidence: f64,
    source_identifier: String,
}

impl From<RawRecordData> for RawRecord {
    fn from(data: RawRecordData) -> Self {
        data.fields
            .into_iter()
            .fold(
                RawRecord::builder(data.source_id, data.source_identifier),
                |builder, (name, value)| builder.field(name, value),
            )
            .retrieved_at(data.retrieved_at)
            .confidence(data.confidence)
            .build()
    }
}

impl RawRecord {
    /// Start building a record for `source_id` identified by `source_identifier`
    /// (typically the profile or result URL)
    pub fn builder(
        source_id: impl Into<SourceId>,
        source_identifier: impl Into<String>,
    ) -> RawRecordBuilder {
        RawRecordBuilder {
            source_id: source_id.into(),
            source_identifier: source_identifier.into(),
            retrieved_at: None,
            fields: BTreeMap::new(),
            confidence: 0.5,
        }
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.field(fields::NAME)
    }

    /// Confidence in [0, 1]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn source_identifier(&self) -> &str {
        &self.source_identifier
    }
}

/// Builder for `RawRecord`
#[derive(Debug, Clone)]
pub struct RawRecordBuilder {
    source_id: SourceId,
    source_identifier: String,
    retrieved_at: Option<DateTime<Utc>>,
    fields: BTreeMap<String, String>,
    confidence: f64,
}

impl RawRecordBuilder {
    /// Confidence, clamped to [0, 1] (NaN becomes 0)
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    /// Add an attribute; names are lowercased, blank values dropped
    pub fn field(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        let name = name.as_ref().trim().to_lowercase();
        let value = value.into().trim().to_string();
        if !name.is_empty() && !value.is_empty() {
            self.fields.insert(name, value);
        }
        self
    }

    pub fn optional_field(self, name: impl AsRef<str>, value: Option<String>) -> Self {
        match value {
            Some(value) => self.field(name, value),
            None => self,
        }
    }

    pub fn retrieved_at(mut self, at: DateTime<Utc>) -> Self {
        self.retrieved_at = Some(at);
        self
    }

    pub fn build(self) -> RawRecord {
        RawRecord {
            source_id: self.source_id,
            retrieved_at: self.retrieved_at.unwrap_or_else(Utc::now),
            fields: self.fields,
            confidence: self.confidence,
            source_identifier: self.source_identifier,
        }
    }
}

// ============================================================================
// Time budget
// ============================================================================

/// Deadline plus cancellation signal for one adapter call
///
/// Adapters must stop working once `expired()` resolves and return whatever
/// partial results they have (or none).
#[derive(Debug, Clone)]
pub struct TimeBudget {
    deadline: Instant,
    cancel: CancellationToken,
}

impl TimeBudget {
    pub fn new(deadline: Instant, cancel: CancellationToken) -> Self {
        Self { deadline, cancel }
    }

    /// Budget ending `timeout` from now with its own cancellation token
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Instant::now() + timeout, CancellationToken::new())
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_exhausted(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolves when the deadline passes or the budget is cancelled
    pub async fn expired(&self) {
        tokio::select! {
            _ = tokio::time::sleep_until(self.deadline) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    /// Run `fut` within the budget; `None` if the budget ran out first
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            output = fut => Some(output),
            _ = self.expired() => None,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// One distinct value of an attribute and the sources that reported it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedValue {
    pub value: String,
    pub supporting_sources: BTreeSet<SourceId>,
}

/// All values reported for one attribute of an entity
///
/// Conflicting values are kept side by side, ordered by number of supporting
/// sources (descending) and then by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedField {
    pub values: Vec<AttributedValue>,
}

impl MergedField {
    /// Best-supported value
    pub fn primary(&self) -> Option<&AttributedValue> {
        self.values.first()
    }

    /// Whether sources disagree on this attribute
    pub fn is_conflicted(&self) -> bool {
        self.values.len() > 1
    }

    /// Union of sources supporting any value
    pub fn supporting_sources(&self) -> BTreeSet<SourceId> {
        self.values
            .iter()
            .flat_map(|v| v.supporting_sources.iter().cloned())
            .collect()
    }
}

/// Attribute on which sources reported different values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub values: Vec<AttributedValue>,
}

/// A correlated identity built from one or more raw records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic id derived from the member records
    pub entity_id: Uuid,
    pub merged_fields: BTreeMap<String, MergedField>,
    /// Corroborated confidence in [0, 1]
    pub aggregate_confidence: f64,
    /// Distinct sources contributing at least one record (never empty)
    pub supporting_sources: BTreeSet<SourceId>,
    /// Identifiers (URLs) of the member records, sorted
    pub source_identifiers: Vec<String>,
    /// Number of raw records merged into this entity
    pub record_count: usize,
}

impl Entity {
    /// Primary value of an attribute
    pub fn field(&self, name: &str) -> Option<&str> {
        self.merged_fields
            .get(name)
            .and_then(MergedField::primary)
            .map(|v| v.value.as_str())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.field(fields::NAME)
    }

    /// Attributes where sources disagree
    pub fn conflicts(&self) -> Vec<FieldConflict> {
        self.merged_fields
            .iter()
            .filter(|(field, merged)| {
                merged.is_conflicted() && !fields::PER_SOURCE.contains(&field.as_str())
            })
            .map(|(field, merged)| FieldConflict {
                field: field.clone(),
                values: merged.values.clone(),
            })
            .collect()
    }

    /// Attribute values attributed to `source`, in attribute-name order
    pub fn fields_from(&self, source: &SourceId) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for (field, merged) in &self.merged_fields {
            for value in &merged.values {
                if value.supporting_sources.contains(source) {
                    out.push((field.as_str(), value.value.as_str()));
                }
            }
        }
        out
    }
}
