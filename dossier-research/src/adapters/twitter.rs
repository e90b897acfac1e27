//! X (Twitter) public user lookup adapter
//!
//! Uses a public user-search endpoint (`GET {endpoint}/users/search?query=...`)
//! returning `{"data": [{name, username, description, location, url}]}`.
//! Profiles on X change often, so records are treated as volatile.

use super::http::HttpSource;
use super::{AdapterError, SourceAdapter, Volatility};
use crate::correlation::similarity::name_similarity;
use crate::types::{fields, Query, RawRecord, SourceId, TimeBudget};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const PROFILE_BASE_URL: &str = "https://x.com";

#[derive(Debug, Deserialize)]
pub(crate) struct UserSearchResponse {
    #[serde(default)]
    data: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: String,
    name: Option<String>,
    description: Option<String>,
    location: Option<String>,
    url: Option<String>,
}

/// X source adapter (source id "x")
pub struct TwitterAdapter {
    source_id: SourceId,
    endpoint: String,
    http: HttpSource,
}

impl TwitterAdapter {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AdapterError> {
        Ok(Self {
            source_id: SourceId::from("x"),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http: HttpSource::new(1)?,
        })
    }
}

#[async_trait]
impl SourceAdapter for TwitterAdapter {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn volatility(&self) -> Volatility {
        Volatility::Volatile
    }

    async fn fetch(
        &self,
        query: &Query,
        budget: TimeBudget,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let url = format!("{}/users/search", self.endpoint);
        debug!(url = %url, "X user lookup");

        let response: Option<UserSearchResponse> = self
            .http
            .get_json(&url, &[("query", query.full_name())], &budget)
            .await?;

        Ok(response
            .map(|r| parse_users(&self.source_id, query, r))
            .unwrap_or_default())
    }
}

pub(crate) fn parse_users(
    source_id: &SourceId,
    query: &Query,
    response: UserSearchResponse,
) -> Vec<RawRecord> {
    response
        .data
        .into_iter()
        .filter(|u| !u.username.trim().is_empty())
        .map(|user| {
            let username = user.username.trim().trim_start_matches('@').to_string();
            let profile_url = format!("{}/{}", PROFILE_BASE_URL, username);

            // Display names on X are free-form; trust them less unless they
            // clearly match the query
            let confidence = match user.name.as_deref() {
                Some(name) if name_similarity(name, query.full_name()) >= 0.9 => 0.6,
                Some(_) => 0.35,
                None => 0.3,
            };

            RawRecord::builder(source_id.clone(), profile_url.clone())
                .field(fields::URL, profile_url)
                .field(fields::HANDLE, format!("@{}", username))
                .optional_field(fields::NAME, user.name)
                .optional_field(fields::BIO, user.description)
                .optional_field(fields::LOCATION, user.location)
                .optional_field(fields::WEBSITE, user.url)
                .confidence(confidence)
                .build()
        })
        .collect()
}
