//! Web search adapter
//!
//! Queries a SearXNG-compatible JSON search endpoint
//! (`GET {endpoint}?q=...&format=json`) and turns each hit into a low- to
//! medium-confidence record. Search hits are loosely structured, so the
//! adapter only records what it can read directly off the result: the name
//! segment of the title, the headline, the snippet, and any query hints the
//! snippet corroborates.

use super::http::HttpSource;
use super::{AdapterError, SourceAdapter, Volatility};
use crate::correlation::similarity::name_similarity;
use crate::types::{fields, Query, RawRecord, SourceId, TimeBudget};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Title separators used by most result pages ("Jane Doe - Engineer - Acme")
const TITLE_SEPARATORS: &[&str] = &[" - ", " | ", " – ", " — ", " · "];

/// Name-segment similarity needed to treat a title as naming the subject
const NAME_MATCH_THRESHOLD: f64 = 0.85;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: Option<String>,
}

/// Web search source adapter
pub struct WebSearchAdapter {
    source_id: SourceId,
    endpoint: String,
    max_results: usize,
    http: HttpSource,
}

impl WebSearchAdapter {
    pub fn new(endpoint: impl Into<String>, max_results: usize) -> Result<Self, AdapterError> {
        Ok(Self {
            source_id: SourceId::from("web_search"),
            endpoint: endpoint.into(),
            max_results,
            http: HttpSource::new(2)?,
        })
    }
}

#[async_trait]
impl SourceAdapter for WebSearchAdapter {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn volatility(&self) -> Volatility {
        Volatility::Stable
    }

    async fn fetch(
        &self,
        query: &Query,
        budget: TimeBudget,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let terms = query.search_terms();
        debug!(endpoint = %self.endpoint, terms = %terms, "Web search");

        let response: Option<SearchResponse> = self
            .http
            .get_json(&self.endpoint, &[("q", terms.as_str()), ("format", "json")], &budget)
            .await?;

        Ok(response
            .map(|r| parse_results(&self.source_id, query, r, self.max_results))
            .unwrap_or_default())
    }
}

/// Convert search hits to records, best-ranked first
pub(crate) fn parse_results(
    source_id: &SourceId,
    query: &Query,
    response: SearchResponse,
    max_results: usize,
) -> Vec<RawRecord> {
    response
        .results
        .into_iter()
        .filter(|hit| !hit.url.trim().is_empty())
        .take(max_results)
        .map(|hit| hit_to_record(source_id, query, hit))
        .collect()
}

fn hit_to_record(source_id: &SourceId, query: &Query, hit: SearchHit) -> RawRecord {
    let mut segments = split_title(&hit.title);
    let mut confidence: f64 = 0.4;
    let mut builder = RawRecord::builder(source_id.clone(), hit.url.clone())
        .field(fields::URL, hit.url.clone());

    if let Some(first) = segments.first() {
        if name_similarity(first, query.full_name()) >= NAME_MATCH_THRESHOLD {
            builder = builder.field(fields::NAME, first.clone());
            segments.remove(0);
            confidence += 0.15;
        }
    }
    if !segments.is_empty() {
        builder = builder.field(fields::HEADLINE, segments.join(" - "));
    }

    let haystack = format!(
        "{} {}",
        hit.title.to_lowercase(),
        hit.content.as_deref().unwrap_or("").to_lowercase()
    );
    for (kind, value) in query.hints() {
        if haystack.contains(&value.to_lowercase()) {
            builder = builder.field(kind.field_names()[0], value.clone());
            confidence += 0.1;
        }
    }

    builder
        .optional_field(fields::SNIPPET, hit.content)
        .confidence(confidence.min(0.8))
        .build()
}

fn split_title(title: &str) -> Vec<String> {
    let mut parts = vec![title.to_string()];
    for sep in TITLE_SEPARATORS {
        parts = parts
            .iter()
            .flat_map(|p| p.split(sep).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
