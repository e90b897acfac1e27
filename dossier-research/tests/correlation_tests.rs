//! Entity correlation properties over realistic record sets

use dossier_research::correlation::{Correlator, CorrelatorConfig};
use dossier_research::types::{Entity, Query, RawRecord, SourceId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

fn record(source: &str, id: &str, confidence: f64, fields: &[(&str, &str)]) -> RawRecord {
    fields
        .iter()
        .fold(RawRecord::builder(source, id), |b, (k, v)| b.field(k, *v))
        .confidence(confidence)
        .build()
}

fn query() -> Query {
    Query::new("Jane Doe").unwrap()
}

/// Two different people called Jane Doe, seen by three sources
fn two_jane_does() -> Vec<RawRecord> {
    vec![
        record("linkedin", "https://www.linkedin.com/in/janedoe", 0.9, &[
            ("name", "Jane Doe"),
            ("employer", "Acme"),
            ("title", "Engineer"),
            ("location", "Berlin"),
        ]),
        record("web_search", "https://blog.example.org/jane", 0.6, &[
            ("name", "Jane Doe"),
            ("employer", "Acme"),
        ]),
        record("x", "https://x.com/janedoe", 0.6, &[
            ("name", "Jane Doe"),
            ("location", "Berlin"),
            ("website", "https://blog.example.org/jane"),
        ]),
        record("linkedin", "https://www.linkedin.com/in/jane-doe-chef", 0.8, &[
            ("name", "Jane Doe"),
            ("employer", "Globex"),
            ("title", "Head Chef"),
            ("location", "Lyon"),
        ]),
        record("web_search", "https://news.example.com/chef", 0.5, &[
            ("name", "Jane Doe"),
            ("employer", "Globex"),
            ("location", "Lyon"),
        ]),
        record("web_search", "https://people.example.com/john", 0.5, &[
            ("name", "Robert Brown"),
            ("employer", "Initech"),
        ]),
    ]
}

fn sorted_by_id(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort_by_key(|e| e.entity_id);
    entities
}

#[test]
fn test_linkedin_and_web_search_merge() {
    let records = vec![
        record("linkedin", "https://www.linkedin.com/in/janedoe", 0.9, &[
            ("name", "Jane Doe"),
            ("employer", "Acme"),
        ]),
        record("web_search", "https://blog.example.org/jane", 0.6, &[
            ("name", "Jane Doe"),
            ("employer", "Acme"),
        ]),
    ];

    let correlation = Correlator::default().correlate(&records, &query());

    assert_eq!(correlation.entities.len(), 1);
    let entity = &correlation.entities[0];
    assert!(entity.aggregate_confidence > 0.9);
    assert_eq!(
        entity.supporting_sources.iter().map(SourceId::as_str).collect::<Vec<_>>(),
        vec!["linkedin", "web_search"]
    );
    assert_eq!(entity.record_count, 2);
}

#[test]
fn test_two_people_stay_separate() {
    let correlation = Correlator::default().correlate(&two_jane_does(), &query());

    assert_eq!(correlation.entities.len(), 2);
    assert_eq!(correlation.irrelevant_records, 1);

    let best = &correlation.entities[0];
    assert_eq!(best.field("employer"), Some("Acme"));
    assert_eq!(best.supporting_sources.len(), 3);

    let other = &correlation.entities[1];
    assert_eq!(other.field("location"), Some("Lyon"));
    assert!(best.aggregate_confidence >= other.aggregate_confidence);
}

#[test]
fn test_correlation_is_idempotent() {
    let correlator = Correlator::default();
    let records = two_jane_does();

    let first = correlator.correlate(&records, &query());
    let second = correlator.correlate(&records, &query());

    assert_eq!(first.entities, second.entities);
    assert_eq!(first.ambiguous, second.ambiguous);
}

#[test]
fn test_input_order_does_not_change_entities() {
    let correlator = Correlator::default();
    let records = two_jane_does();
    let baseline = sorted_by_id(correlator.correlate(&records, &query()).entities);

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let mut shuffled = records.clone();
        shuffled.shuffle(&mut rng);
        let entities = sorted_by_id(correlator.correlate(&shuffled, &query()).entities);
        assert_eq!(entities, baseline);
    }
}

#[test]
fn test_merging_is_transitive() {
    let correlator = Correlator::default();
    let a = record("linkedin", "https://www.linkedin.com/in/janedoe", 0.9, &[
        ("name", "Jane Doe"),
        ("employer", "Acme"),
        ("location", "Berlin"),
    ]);
    let b = record("web_search", "https://blog.example.org/jane", 0.6, &[
        ("name", "Jane Doe"),
        ("employer", "Acme"),
        ("website", "https://janedoe.dev"),
    ]);
    let c = record("x", "https://x.com/jd", 0.5, &[
        ("name", "J. Doe"),
        ("location", "Paris"),
        ("website", "https://www.janedoe.dev/"),
    ]);

    let threshold = correlator.config().similarity_threshold;
    assert!(correlator.pair_score(&a, &b, &query()) >= threshold);
    assert!(correlator.pair_score(&b, &c, &query()) >= threshold);
    assert!(correlator.pair_score(&a, &c, &query()) < threshold);

    let correlation = correlator.correlate(&[a, b, c], &query());
    assert_eq!(correlation.entities.len(), 1);
    let entity = &correlation.entities[0];
    assert_eq!(entity.supporting_sources.len(), 3);
    // A and C disagree on location and spell the name differently; both
    // values are kept for each
    let conflicts = entity.conflicts();
    let fields: Vec<&str> = conflicts.iter().map(|c| c.field.as_str()).collect();
    assert_eq!(fields, vec!["location", "name"]);
    assert!(conflicts.iter().all(|c| c.values.len() == 2));
    assert_eq!(entity.display_name(), Some("Jane Doe"));
}

#[test]
fn test_stricter_threshold_splits_weak_links() {
    let strict = Correlator::new(CorrelatorConfig {
        similarity_threshold: 0.99,
        ..CorrelatorConfig::default()
    });
    let records = vec![
        record("linkedin", "a", 0.9, &[("name", "Jane Doe"), ("employer", "Acme")]),
        record("x", "b", 0.5, &[("name", "Jane M. Doe")]),
    ];

    let correlation = strict.correlate(&records, &query());
    assert_eq!(correlation.entities.len(), 2);
}

#[test]
fn test_no_relevant_records_is_ambiguous() {
    let records = vec![record("web_search", "a", 0.7, &[("name", "Robert Brown")])];
    let correlation = Correlator::default().correlate(&records, &query());

    assert!(correlation.ambiguous);
    assert!(correlation.entities.is_empty());
}
