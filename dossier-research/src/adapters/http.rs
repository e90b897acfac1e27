//! Shared HTTP plumbing for network adapters
//!
//! Wraps a `reqwest::Client` with a per-adapter governor pacer and maps HTTP
//! outcomes onto `AdapterError`:
//! - 429 → `RateLimited` (Retry-After seconds or HTTP-date, else 60s)
//! - 401 / 403 / 451 → `Forbidden`
//! - 5xx, connect errors, timeouts → `Unreachable`
//! - undecodable body → `ParseFailure`
//! - 404 → no results (`Ok(None)`)

use super::{AdapterError, DEFAULT_RETRY_AFTER};
use crate::types::TimeBudget;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("dossier/", env!("CARGO_PKG_VERSION"));

/// HTTP client plus local pacing for one adapter
pub struct HttpSource {
    client: reqwest::Client,
    pacer: DefaultDirectRateLimiter,
}

impl HttpSource {
    /// Create a source pacing itself to `requests_per_second` (minimum 1)
    pub fn new(requests_per_second: u32) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AdapterError::unreachable(format!("HTTP client init failed: {}", e)))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            pacer: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// GET `url` with `params` and decode a JSON body
    ///
    /// Returns `Ok(None)` when the budget ran out before a response arrived
    /// or the resource does not exist.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        budget: &TimeBudget,
    ) -> Result<Option<T>, AdapterError> {
        // Local pacing counts against the budget too
        if budget.run(self.pacer.until_ready()).await.is_none() {
            debug!(url = %url, "Budget exhausted while pacing");
            return Ok(None);
        }

        let request = self
            .client
            .get(url)
            .query(params)
            .timeout(budget.remaining())
            .send();

        let response = match budget.run(request).await {
            None => return Ok(None),
            Some(result) => result.map_err(classify_transport_error)?,
        };

        if let Some(err) = classify_status(response.status(), response.headers()) {
            return Err(err);
        }
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = match budget.run(response.bytes()).await {
            None => return Ok(None),
            Some(result) => result.map_err(classify_transport_error)?,
        };

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| AdapterError::parse_failure(format!("Invalid JSON from {}: {}", url, e)))
    }
}

/// Map a non-success status to an adapter error (`None` for success / 404)
pub fn classify_status(status: StatusCode, headers: &HeaderMap) -> Option<AdapterError> {
    if status.is_success() || status == StatusCode::NOT_FOUND {
        return None;
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => Some(AdapterError::RateLimited {
            retry_after: parse_retry_after(headers).unwrap_or(DEFAULT_RETRY_AFTER),
        }),
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => Some(AdapterError::forbidden(format!(
            "HTTP {}",
            status.as_u16()
        ))),
        // 503 with Retry-After is a throttling signal too
        StatusCode::SERVICE_UNAVAILABLE if headers.contains_key(RETRY_AFTER) => {
            Some(AdapterError::RateLimited {
                retry_after: parse_retry_after(headers).unwrap_or(DEFAULT_RETRY_AFTER),
            })
        }
        s if s.is_server_error() => Some(AdapterError::unreachable(format!(
            "HTTP {}",
            s.as_u16()
        ))),
        s => Some(AdapterError::parse_failure(format!(
            "Unexpected HTTP {}",
            s.as_u16()
        ))),
    }
}

/// Parse `Retry-After` as delta-seconds or an HTTP-date
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let date = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

fn classify_transport_error(err: reqwest::Error) -> AdapterError {
    if err.is_decode() {
        AdapterError::parse_failure(err.to_string())
    } else {
        AdapterError::unreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_success_and_not_found_are_not_errors() {
        let headers = HeaderMap::new();
        assert!(classify_status(StatusCode::OK, &headers).is_none());
        assert!(classify_status(StatusCode::NOT_FOUND, &headers).is_none());
    }

    #[test]
    fn test_429_uses_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &headers),
            Some(AdapterError::RateLimited {
                retry_after: Duration::from_secs(30)
            })
        );
    }

    #[test]
    fn test_429_without_header_uses_heuristic() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new()),
            Some(AdapterError::RateLimited {
                retry_after: DEFAULT_RETRY_AFTER
            })
        );
    }

    #[test]
    fn test_retry_after_http_date_in_past_is_zero() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn test_auth_walls_are_forbidden() {
        let headers = HeaderMap::new();
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            assert!(matches!(
                classify_status(status, &headers),
                Some(AdapterError::Forbidden { .. })
            ));
        }
    }

    #[test]
    fn test_server_errors_are_unreachable() {
        let headers = HeaderMap::new();
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, &headers),
            Some(AdapterError::Unreachable { .. })
        ));

        let mut throttled = HeaderMap::new();
        throttled.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, &throttled),
            Some(AdapterError::RateLimited { .. })
        ));
    }
}
