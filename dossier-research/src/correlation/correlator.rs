//! Entity Correlator - union-find merge of raw records
//!
//! 1. Drop records whose name is not relevant to the query
//! 2. Score every remaining pair; union pairs scoring ≥ threshold
//! 3. Fold each disjoint set into an `Entity`
//! 4. Rank entities
//!
//! The pairwise score is symmetric and the merge is a pure function of the
//! resulting sets, so input order never changes which entities come out or
//! their confidence. Input order only breaks exact ranking ties.
//!
//! Confidence formula (per entity, over distinct sources):
//! `aggregate = 1 - Π(1 - best_confidence(source))`

use super::similarity::{attribute_similarity, name_similarity, normalize_text, normalize_url};
use super::union_find::UnionFind;
use super::CorrelatorConfig;
use crate::types::{fields, AttributedValue, Entity, MergedField, Query, RawRecord, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

/// Result of correlating one run's records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// Ranked best-first
    pub entities: Vec<Entity>,
    /// No record was relevant enough to form an entity
    pub ambiguous: bool,
    /// Records dropped by the relevance filter
    pub irrelevant_records: usize,
}

/// Entity correlator
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    config: CorrelatorConfig,
}

impl Correlator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Merge `records` into a ranked sequence of entities
    pub fn correlate(&self, records: &[RawRecord], query: &Query) -> Correlation {
        let relevant: Vec<(usize, &RawRecord)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| self.relevance(r, query) >= self.config.relevance_threshold)
            .collect();
        let irrelevant_records = records.len() - relevant.len();

        if relevant.is_empty() {
            debug!(
                records = records.len(),
                "No record relevant to query; correlation ambiguous"
            );
            return Correlation {
                entities: vec![],
                ambiguous: true,
                irrelevant_records,
            };
        }

        let mut forest = UnionFind::new(relevant.len());
        for i in 0..relevant.len() {
            for j in (i + 1)..relevant.len() {
                let score = self.pair_score(relevant[i].1, relevant[j].1, query);
                if score >= self.config.similarity_threshold && forest.union(i, j) {
                    debug!(
                        a = %relevant[i].1.source_identifier(),
                        b = %relevant[j].1.source_identifier(),
                        score = format!("{:.3}", score),
                        "Records correlated"
                    );
                }
            }
        }

        let mut ranked: Vec<(usize, Entity)> = forest
            .groups()
            .into_iter()
            .map(|group| {
                let members: Vec<&RawRecord> = group.iter().map(|&k| relevant[k].1).collect();
                let first_index = group.iter().map(|&k| relevant[k].0).min().unwrap_or(0);
                (first_index, build_entity(&members))
            })
            .collect();

        ranked.sort_by(|(ia, a), (ib, b)| {
            b.aggregate_confidence
                .total_cmp(&a.aggregate_confidence)
                .then_with(|| b.supporting_sources.len().cmp(&a.supporting_sources.len()))
                .then_with(|| ia.cmp(ib))
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });

        Correlation {
            entities: ranked.into_iter().map(|(_, e)| e).collect(),
            ambiguous: false,
            irrelevant_records,
        }
    }

    /// How strongly a record refers to the queried person, in [0, 1]
    ///
    /// Records without a name attribute are not attributable to anyone.
    pub fn relevance(&self, record: &RawRecord, query: &Query) -> f64 {
        record
            .name()
            .map(|name| name_similarity(name, query.full_name()))
            .unwrap_or(0.0)
    }

    /// Pairwise similarity of two records in [0, 1]
    pub fn pair_score(&self, a: &RawRecord, b: &RawRecord, query: &Query) -> f64 {
        let w = &self.config.weights;

        let name = match (a.name(), b.name()) {
            (Some(na), Some(nb)) => name_similarity(na, nb),
            _ => 0.0,
        };
        let mut components = vec![(w.name, name)];

        if let Some(s) = attribute_agreement(a, b) {
            components.push((w.attributes, s));
        }
        if let Some(s) = hint_agreement(a, b, query) {
            components.push((w.hints, s));
        }
        if shares_reference(a, b) {
            components.push((w.cross_reference, 1.0));
        }

        let total: f64 = components.iter().map(|(weight, _)| weight).sum();
        if total <= 0.0 {
            return 0.0;
        }
        components.iter().map(|(weight, s)| weight * s).sum::<f64>() / total
    }
}

/// Mean similarity over identity attributes both records declare
fn attribute_agreement(a: &RawRecord, b: &RawRecord) -> Option<f64> {
    let scores: Vec<f64> = fields::IDENTITY
        .iter()
        .filter_map(|f| Some(attribute_similarity(a.field(f)?, b.field(f)?)))
        .collect();
    mean(&scores)
}

/// Mean over query hints both records speak to of the weaker match
///
/// Two records that both corroborate "employer = Acme" support each other;
/// one matching and one contradicting the hint do not.
fn hint_agreement(a: &RawRecord, b: &RawRecord, query: &Query) -> Option<f64> {
    let scores: Vec<f64> = query
        .hints()
        .iter()
        .filter_map(|(kind, hint)| {
            let ma = hint_match(a, kind.field_names(), hint)?;
            let mb = hint_match(b, kind.field_names(), hint)?;
            Some(ma.min(mb))
        })
        .collect();
    mean(&scores)
}

fn hint_match(record: &RawRecord, field_names: &[&str], hint: &str) -> Option<f64> {
    field_names
        .iter()
        .filter_map(|f| record.field(f))
        .map(|value| attribute_similarity(value, hint))
        .reduce(f64::max)
}

fn shares_reference(a: &RawRecord, b: &RawRecord) -> bool {
    let refs_a = references(a);
    !refs_a.is_empty() && references(b).iter().any(|r| refs_a.contains(r))
}

fn references(record: &RawRecord) -> BTreeSet<String> {
    fields::REFERENCES
        .iter()
        .filter_map(|f| record.field(f))
        .flat_map(str::split_whitespace)
        .filter_map(normalize_url)
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Fold a correlated group of records into one entity
fn build_entity(members: &[&RawRecord]) -> Entity {
    // field → normalized value → (originals, sources)
    let mut grouped: BTreeMap<&str, BTreeMap<String, (BTreeSet<&str>, BTreeSet<SourceId>)>> =
        BTreeMap::new();
    let mut best_by_source: BTreeMap<SourceId, f64> = BTreeMap::new();

    for record in members {
        let best = best_by_source.entry(record.source_id().clone()).or_insert(0.0);
        *best = best.max(record.confidence());

        for (field, value) in record.fields() {
            let key = value_key(field, value);
            let slot = grouped
                .entry(field.as_str())
                .or_default()
                .entry(key)
                .or_default();
            slot.0.insert(value.as_str());
            slot.1.insert(record.source_id().clone());
        }
    }

    let merged_fields = grouped
        .into_iter()
        .map(|(field, values)| {
            let mut values: Vec<AttributedValue> = values
                .into_values()
                .map(|(originals, sources)| AttributedValue {
                    // Smallest original spelling stands in for the group
                    value: originals.iter().next().map(|s| s.to_string()).unwrap_or_default(),
                    supporting_sources: sources,
                })
                .collect();
            values.sort_by(|a, b| {
                b.supporting_sources
                    .len()
                    .cmp(&a.supporting_sources.len())
                    .then_with(|| a.value.cmp(&b.value))
            });
            (field.to_string(), MergedField { values })
        })
        .collect();

    let aggregate_confidence = 1.0
        - best_by_source
            .values()
            .fold(1.0, |acc, c| acc * (1.0 - c));

    let mut member_keys: Vec<String> = members
        .iter()
        .map(|r| format!("{}:{}", r.source_id(), r.source_identifier()))
        .collect();
    member_keys.sort();
    member_keys.dedup();

    let mut source_identifiers: Vec<String> = members
        .iter()
        .map(|r| r.source_identifier().to_string())
        .collect();
    source_identifiers.sort();
    source_identifiers.dedup();

    Entity {
        entity_id: Uuid::new_v5(&Uuid::NAMESPACE_URL, member_keys.join("\n").as_bytes()),
        merged_fields,
        aggregate_confidence: aggregate_confidence.clamp(0.0, 1.0),
        supporting_sources: best_by_source.into_keys().collect(),
        source_identifiers,
        record_count: members.len(),
    }
}

fn value_key(field: &str, value: &str) -> String {
    if fields::REFERENCES.contains(&field) {
        if let Some(url) = normalize_url(value) {
            return url;
        }
    }
    normalize_text(value)
}
