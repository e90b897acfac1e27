//! LinkedIn public-profile adapter
//!
//! Reads public profile summaries from a JSON lookup endpoint
//! (`GET {endpoint}/people?name=...&location=...&company=...`). No login or
//! session is used; profiles hidden behind the login wall surface as 401/403
//! and become `AdapterError::Forbidden`.
//!
//! Profile bios change rarely, so records are cached for a day by default.

use super::http::HttpSource;
use super::{AdapterError, SourceAdapter, Volatility};
use crate::correlation::similarity::normalize_text;
use crate::types::{fields, HintKind, Query, RawRecord, SourceId, TimeBudget};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Structured profile data: high baseline confidence
const BASE_CONFIDENCE: f64 = 0.75;

#[derive(Debug, Deserialize)]
pub(crate) struct PeopleResponse {
    #[serde(default)]
    profiles: Vec<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    public_url: String,
    full_name: Option<String>,
    headline: Option<String>,
    company: Option<String>,
    location: Option<String>,
    education: Option<String>,
    #[serde(default)]
    websites: Vec<String>,
}

/// LinkedIn source adapter
pub struct LinkedInAdapter {
    source_id: SourceId,
    endpoint: String,
    http: HttpSource,
}

impl LinkedInAdapter {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AdapterError> {
        Ok(Self {
            source_id: SourceId::from("linkedin"),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http: HttpSource::new(1)?,
        })
    }
}

#[async_trait]
impl SourceAdapter for LinkedInAdapter {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn volatility(&self) -> Volatility {
        Volatility::Static
    }

    async fn fetch(
        &self,
        query: &Query,
        budget: TimeBudget,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let url = format!("{}/people", self.endpoint);
        let mut params = vec![("name", query.full_name())];
        if let Some(location) = query.hint(HintKind::Location) {
            params.push(("location", location));
        }
        if let Some(company) = query.hint(HintKind::Employer) {
            params.push(("company", company));
        }

        debug!(url = %url, "LinkedIn profile lookup");
        let response: Option<PeopleResponse> = self.http.get_json(&url, &params, &budget).await?;

        Ok(response
            .map(|r| parse_profiles(&self.source_id, query, r))
            .unwrap_or_default())
    }
}

pub(crate) fn parse_profiles(
    source_id: &SourceId,
    query: &Query,
    response: PeopleResponse,
) -> Vec<RawRecord> {
    response
        .profiles
        .into_iter()
        .filter(|p| !p.public_url.trim().is_empty())
        .map(|profile| profile_to_record(source_id, query, profile))
        .collect()
}

fn profile_to_record(source_id: &SourceId, query: &Query, profile: Profile) -> RawRecord {
    let (title, employer) = split_headline(profile.headline.as_deref());
    let employer = profile.company.clone().or(employer);

    let record = RawRecord::builder(source_id.clone(), profile.public_url.clone())
        .field(fields::URL, profile.public_url.clone())
        .optional_field(fields::NAME, profile.full_name.clone())
        .optional_field(fields::HEADLINE, profile.headline.clone())
        .optional_field(fields::TITLE, title)
        .optional_field(fields::EMPLOYER, employer)
        .optional_field(fields::LOCATION, profile.location.clone())
        .optional_field(fields::EDUCATION, profile.education.clone())
        .optional_field(fields::WEBSITE, profile.websites.first().cloned());

    let record = if profile.websites.len() > 1 {
        record.field(fields::LINKS, profile.websites.join(" "))
    } else {
        record
    };

    // Draft record to count corroborated hints before fixing confidence
    let draft = record.clone().build();
    let matched = query
        .hints()
        .iter()
        .filter(|(kind, value)| {
            kind.field_names().iter().any(|f| {
                draft
                    .field(f)
                    .map(|v| normalize_text(v).contains(&normalize_text(value)))
                    .unwrap_or(false)
            })
        })
        .count();

    record
        .confidence((BASE_CONFIDENCE + 0.1 * matched as f64).min(0.95))
        .build()
}

/// "Staff Engineer at Acme" → (Some("Staff Engineer"), Some("Acme"))
fn split_headline(headline: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(headline) = headline else {
        return (None, None);
    };
    match headline.split_once(" at ") {
        Some((title, employer)) => (
            Some(title.trim().to_string()),
            Some(employer.trim().to_string()),
        ),
        None => (Some(headline.trim().to_string()), None),
    }
}
