//! Orchestrator integration tests
//!
//! All tests run on a paused tokio clock: deadlines, backoff and cache TTLs
//! are driven with `tokio::time::advance` instead of real sleeps.

mod helpers;

use dossier_research::adapters::AdapterError;
use dossier_research::cache::ResultCache;
use dossier_research::orchestrator::{
    CoverageStatus, Orchestrator, OrchestratorConfig, SkipReason, SourceRegistration,
};
use dossier_research::rate_limiter::{RateLimitSettings, RateLimiter};
use dossier_research::report::assemble_report;
use dossier_research::types::{Query, RawRecord, SourceId};
use dossier_research::{HintKind, ResearchError};
use helpers::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_two_sources_merge_into_one_entity() {
    let linkedin = Arc::new(MockAdapter::new("linkedin").with_records(vec![jane_linkedin()]));
    let web = Arc::new(MockAdapter::new("web_search").with_records(vec![jane_web()]));
    let orchestrator = orchestrator().with_adapter(linkedin).with_adapter(web);

    let outcome = orchestrator.research(&jane()).await.unwrap();

    assert_eq!(outcome.entities.len(), 1);
    let best = outcome.best().unwrap();
    assert!(best.aggregate_confidence > 0.9);
    assert_eq!(best.supporting_sources.len(), 2);
    assert_eq!(best.field("employer"), Some("Acme"));
    assert_eq!(outcome.summary.fetched, 2);
    assert_eq!(outcome.summary.records, 2);
    assert!(outcome.coverage_gaps().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_source_is_skipped_during_backoff() {
    let linkedin = Arc::new(MockAdapter::new("linkedin").with_records(vec![jane_linkedin()]));
    let x = Arc::new(MockAdapter::new("x").failing(AdapterError::RateLimited {
        retry_after: Duration::from_secs(30),
    }));
    let orchestrator = orchestrator()
        .with_adapter(linkedin.clone())
        .with_adapter(x.clone());

    let first = orchestrator.research(&jane()).await.unwrap();
    assert!(matches!(
        &first.coverage[1].status,
        CoverageStatus::Failed {
            error: AdapterError::RateLimited { .. }
        }
    ));
    assert_eq!(x.calls(), 1);

    // Second run 10s later: x is not called at all
    tokio::time::advance(Duration::from_secs(10)).await;
    let second = orchestrator.research(&jane()).await.unwrap();
    assert_eq!(x.calls(), 1);
    match &second.coverage[1].status {
        CoverageStatus::Skipped {
            reason: SkipReason::Backoff { remaining },
        } => {
            assert!(*remaining <= Duration::from_secs(20));
            assert!(*remaining >= Duration::from_secs(19));
        }
        other => panic!("expected backoff skip, got {:?}", other),
    }
    assert_eq!(second.entities.len(), 1);

    let report = assemble_report(&second);
    let coverage = report.coverage.as_ref().expect("coverage paragraph");
    assert!(coverage.text.contains("x: skipped, backing off"));
    assert!(report.to_text().contains("x: skipped, backing off"));

    // After the backoff window a single trial call goes through
    tokio::time::advance(Duration::from_secs(21)).await;
    orchestrator.research(&jane()).await.unwrap();
    assert_eq!(x.calls(), 2);
    // linkedin was served from cache every time after the first run
    assert_eq!(linkedin.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_source_times_out_at_deadline() {
    let web = Arc::new(MockAdapter::new("web_search").with_records(vec![jane_web()]));
    let linkedin = Arc::new(
        MockAdapter::new("linkedin")
            .with_records(vec![jane_linkedin()])
            .with_delay(Duration::from_secs(10)),
    );
    let orchestrator = orchestrator_with_deadline(Duration::from_secs(5))
        .with_adapter(web)
        .with_adapter(linkedin.clone());

    let started = Instant::now();
    let outcome = orchestrator.research(&jane()).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(10));
    assert_eq!(outcome.coverage[0].status, CoverageStatus::Fetched { records: 1 });
    assert_eq!(outcome.coverage[1].status, CoverageStatus::TimedOut);
    assert_eq!(outcome.summary.timed_out, 1);

    let best = outcome.best().unwrap();
    assert!(!best.supporting_sources.contains(&SourceId::from("linkedin")));

    // Timed-out fetches are never cached
    assert!(orchestrator
        .cache()
        .get(&SourceId::from("linkedin"), &jane())
        .await
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_partial_records_returned_at_deadline_are_discarded() {
    let web = Arc::new(MockAdapter::new("web_search").with_records(vec![jane_web()]));
    let linkedin = Arc::new(
        MockAdapter::new("linkedin")
            .with_records(vec![jane_linkedin()])
            .with_delay(Duration::from_secs(10))
            .watching_budget(),
    );
    let orchestrator = orchestrator_with_deadline(Duration::from_secs(5))
        .with_adapter(web)
        .with_adapter(linkedin.clone());

    let outcome = orchestrator.research(&jane()).await.unwrap();

    assert_eq!(linkedin.calls(), 1);
    assert_eq!(outcome.coverage[1].status, CoverageStatus::TimedOut);
    assert!(outcome
        .entities
        .iter()
        .all(|e| !e.supporting_sources.contains(&SourceId::from("linkedin"))));
    assert!(orchestrator
        .cache()
        .get(&SourceId::from("linkedin"), &jane())
        .await
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_reported_at_deadline_engages_backoff() {
    let web = Arc::new(MockAdapter::new("web_search").with_records(vec![jane_web()]));
    let x = Arc::new(
        MockAdapter::new("x")
            .failing(AdapterError::RateLimited {
                retry_after: Duration::from_secs(30),
            })
            .with_delay(Duration::from_secs(10))
            .watching_budget(),
    );
    let orchestrator = orchestrator_with_deadline(Duration::from_secs(5))
        .with_adapter(web)
        .with_adapter(x.clone());

    let outcome = orchestrator.research(&jane()).await.unwrap();
    assert_eq!(outcome.coverage[1].status, CoverageStatus::TimedOut);

    let remaining = orchestrator
        .limiter()
        .backoff_remaining(&SourceId::from("x"))
        .await
        .expect("backoff engaged");
    assert!(remaining > Duration::from_secs(25), "remaining {:?}", remaining);

    // The next run does not call x while the backoff lasts
    let second = orchestrator
        .research(&Query::new("Jane Doe").unwrap().with_hint(HintKind::Location, "Berlin"))
        .await
        .unwrap();
    assert!(matches!(
        second.coverage[1].status,
        CoverageStatus::Skipped {
            reason: SkipReason::Backoff { .. }
        }
    ));
    assert_eq!(x.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_adapter_is_failed_not_timed_out() {
    let web = Arc::new(MockAdapter::new("web_search").with_records(vec![jane_web()]));
    let crashing = Arc::new(MockAdapter::new("linkedin").panicking());
    let slow = Arc::new(
        MockAdapter::new("x")
            .with_records(vec![jane_x()])
            .with_delay(Duration::from_secs(10)),
    );
    let orchestrator = orchestrator_with_deadline(Duration::from_secs(5))
        .with_adapter(web)
        .with_adapter(crashing)
        .with_adapter(slow);

    let outcome = orchestrator.research(&jane()).await.unwrap();

    assert!(matches!(
        &outcome.coverage[1].status,
        CoverageStatus::Failed {
            error: AdapterError::Unreachable { message }
        } if message.contains("panicked")
    ));
    assert_eq!(outcome.coverage[2].status, CoverageStatus::TimedOut);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.summary.timed_out, 1);
}

#[tokio::test(start_paused = true)]
async fn test_research_purges_expired_cache_entries() {
    let linkedin = Arc::new(MockAdapter::new("linkedin").with_records(vec![jane_linkedin()]));
    let orchestrator = orchestrator().with_source(SourceRegistration {
        cache_ttl: Some(Duration::from_secs(60)),
        ..SourceRegistration::new(linkedin)
    });

    let john = Query::new("John Roe").unwrap();
    orchestrator.research(&john).await.unwrap();
    assert_eq!(orchestrator.cache().len().await, 1);

    // The entry for John is never looked up again, yet is dropped
    tokio::time::advance(Duration::from_secs(61)).await;
    orchestrator.research(&jane()).await.unwrap();
    assert_eq!(orchestrator.cache().len().await, 1);
    assert!(orchestrator.cache().get(&SourceId::from("linkedin"), &jane()).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_all_sources_failing_is_an_error() {
    let web = Arc::new(MockAdapter::new("web_search").failing(AdapterError::unreachable("connection refused")));
    let x = Arc::new(MockAdapter::new("x").failing(AdapterError::forbidden("login wall")));
    let orchestrator = orchestrator().with_adapter(web).with_adapter(x);

    match orchestrator.research(&jane()).await {
        Err(ResearchError::NoSourcesAvailable { coverage }) => {
            assert_eq!(coverage.len(), 2);
            assert!(coverage
                .iter()
                .all(|n| matches!(n.status, CoverageStatus::Failed { .. })));
        }
        other => panic!("expected NoSourcesAvailable, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_skips_second_fetch() {
    let linkedin = Arc::new(MockAdapter::new("linkedin").with_records(vec![jane_linkedin()]));
    let orchestrator = orchestrator().with_adapter(linkedin.clone());

    let first = orchestrator.research(&jane()).await.unwrap();
    let second = orchestrator
        .research(&Query::new("  JANE doe ").unwrap())
        .await
        .unwrap();

    assert_eq!(linkedin.calls(), 1);
    assert_eq!(second.coverage[0].status, CoverageStatus::Cached { records: 1 });
    assert_eq!(second.summary.cached, 1);
    assert_eq!(first.entities[0].entity_id, second.entities[0].entity_id);
}

#[tokio::test(start_paused = true)]
async fn test_empty_result_is_cached() {
    let web = Arc::new(MockAdapter::new("web_search"));
    let linkedin = Arc::new(MockAdapter::new("linkedin").with_records(vec![jane_linkedin()]));
    let orchestrator = orchestrator().with_adapter(web.clone()).with_adapter(linkedin);

    orchestrator.research(&jane()).await.unwrap();
    let second = orchestrator.research(&jane()).await.unwrap();

    assert_eq!(web.calls(), 1);
    assert_eq!(second.coverage[0].status, CoverageStatus::Cached { records: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_expired_cache_entry_is_refetched() {
    let linkedin = Arc::new(MockAdapter::new("linkedin").with_records(vec![jane_linkedin()]));
    let orchestrator = orchestrator().with_source(SourceRegistration {
        cache_ttl: Some(Duration::from_secs(60)),
        ..SourceRegistration::new(linkedin.clone())
    });

    orchestrator.research(&jane()).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    orchestrator.research(&jane()).await.unwrap();
    assert_eq!(linkedin.calls(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    let outcome = orchestrator.research(&jane()).await.unwrap();
    assert_eq!(linkedin.calls(), 2);
    assert_eq!(outcome.coverage[0].status, CoverageStatus::Fetched { records: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_credential_leak_drops_source() {
    let leaky = RawRecord::builder("x", "https://x.com/janedoe")
        .field("name", "Jane Doe")
        .field("api_token", "abc123")
        .confidence(0.6)
        .build();
    let x = Arc::new(MockAdapter::new("x").with_records(vec![leaky]));
    let linkedin = Arc::new(MockAdapter::new("linkedin").with_records(vec![jane_linkedin()]));
    let orchestrator = orchestrator().with_adapter(linkedin).with_adapter(x);

    let outcome = orchestrator.research(&jane()).await.unwrap();

    assert_eq!(
        outcome.coverage[1].status,
        CoverageStatus::Failed {
            error: AdapterError::CredentialLeak {
                field: "api_token".to_string()
            }
        }
    );
    assert!(outcome
        .entities
        .iter()
        .all(|e| !e.supporting_sources.contains(&SourceId::from("x"))));
    assert!(orchestrator
        .cache()
        .get(&SourceId::from("x"), &jane())
        .await
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_saturated_source_is_skipped() {
    let limiter = RateLimiter::default().with_source(
        SourceId::from("x"),
        RateLimitSettings {
            capacity: 1,
            refill_per_second: 0.01,
            ..RateLimitSettings::default()
        },
    )
    .unwrap();
    let x = Arc::new(MockAdapter::new("x").with_records(vec![jane_x()]));
    let linkedin = Arc::new(MockAdapter::new("linkedin").with_records(vec![jane_linkedin()]));
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(ResultCache::new()),
        Arc::new(limiter),
    )
    .with_adapter(linkedin)
    .with_adapter(x.clone());

    orchestrator.research(&jane()).await.unwrap();
    // Different query: cache misses, but the bucket is empty
    let outcome = orchestrator
        .research(&Query::new("Jane Doe").unwrap().with_hint(HintKind::Employer, "Acme"))
        .await
        .unwrap();

    assert_eq!(x.calls(), 1);
    assert_eq!(
        outcome.coverage[1].status,
        CoverageStatus::Skipped {
            reason: SkipReason::Saturated
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_every_valid_query_yields_outcome_or_no_sources() {
    let linkedin = Arc::new(MockAdapter::new("linkedin").with_records(vec![jane_linkedin()]));
    let x = Arc::new(MockAdapter::new("x").failing(AdapterError::parse_failure("bad json")));
    let orchestrator = orchestrator().with_adapter(linkedin).with_adapter(x);

    for name in ["Jane Doe", "Zed", "Ana María López", "Doe, Jane", "Dr. J. Doe"] {
        let query = Query::new(name).unwrap();
        match orchestrator.research(&query).await {
            Ok(outcome) => {
                assert_eq!(outcome.ambiguous, outcome.entities.is_empty(), "{}", name);
                assert_eq!(outcome.coverage.len(), 2);
            }
            Err(ResearchError::NoSourcesAvailable { .. }) => {}
            Err(other) => panic!("unexpected error for {}: {:?}", name, other),
        }
    }
}
