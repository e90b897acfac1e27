//! Report assembly - entity to prose
//!
//! Pure functions: no I/O. One paragraph per supporting source, in source-id
//! order, each summarizing only the attribute values that source reported.

use crate::orchestrator::ResearchOutcome;
use crate::types::{fields, Entity, SourceId};
use serde::{Deserialize, Serialize};

/// One block of report prose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub heading: String,
    /// Source the paragraph summarizes (`None` for summary/coverage blocks)
    pub source_id: Option<SourceId>,
    pub text: String,
}

/// Assembled research report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub paragraphs: Vec<Paragraph>,
    /// One line per lower-ranked candidate
    pub alternates: Vec<String>,
    /// Sources that did not contribute, if any
    pub coverage: Option<Paragraph>,
}

impl Report {
    /// Plain-text rendering for terminals
    pub fn to_text(&self) -> String {
        let mut out = format!("{}\n{}\n", self.title, "=".repeat(self.title.chars().count()));
        for paragraph in &self.paragraphs {
            out.push_str(&format!("\n{}\n{}\n", paragraph.heading, paragraph.text));
        }
        if !self.alternates.is_empty() {
            out.push_str("\nOther possible matches\n");
            for line in &self.alternates {
                out.push_str(&format!("- {}\n", line));
            }
        }
        if let Some(coverage) = &self.coverage {
            out.push_str(&format!("\n{}\n{}\n", coverage.heading, coverage.text));
        }
        out
    }
}

/// Paragraphs for one entity, grouped by source
pub fn format(entity: &Entity) -> Vec<Paragraph> {
    let subject = entity.display_name().unwrap_or("This person");

    entity
        .supporting_sources
        .iter()
        .filter_map(|source| {
            let text = source_paragraph(entity, source, subject);
            (!text.is_empty()).then(|| Paragraph {
                heading: source_heading(source),
                source_id: Some(source.clone()),
                text,
            })
        })
        .collect()
}

/// Full report for a research outcome
pub fn assemble_report(outcome: &ResearchOutcome) -> Report {
    let subject = outcome
        .best()
        .and_then(Entity::display_name)
        .unwrap_or(outcome.query.full_name());

    let mut paragraphs = Vec::new();
    match outcome.best() {
        Some(best) => {
            paragraphs.push(Paragraph {
                heading: "Summary".to_string(),
                source_id: None,
                text: summary_text(best),
            });
            paragraphs.extend(format(best));
        }
        None => paragraphs.push(Paragraph {
            heading: "Summary".to_string(),
            source_id: None,
            text: format!(
                "No candidate matched \"{}\" closely enough. Adding an employer, location or profession hint may help.",
                outcome.query.full_name()
            ),
        }),
    }

    let gaps = outcome.coverage_gaps();
    let coverage = (!gaps.is_empty()).then(|| Paragraph {
        heading: "Coverage".to_string(),
        source_id: None,
        text: format!(
            "Not every source contributed to this report. {}.",
            gaps.iter()
                .map(|note| note.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        ),
    });

    Report {
        title: format!("Research report: {}", subject),
        paragraphs,
        alternates: outcome.alternates().iter().map(alternate_line).collect(),
        coverage,
    }
}

fn source_heading(source: &SourceId) -> String {
    match source.as_str() {
        "web_search" => "Web search".to_string(),
        "linkedin" => "LinkedIn".to_string(),
        "x" => "X (Twitter)".to_string(),
        other => other.to_string(),
    }
}

fn summary_text(entity: &Entity) -> String {
    let sources: Vec<String> = entity
        .supporting_sources
        .iter()
        .map(source_heading)
        .collect();
    let mut text = format!(
        "Profile assembled from {} record(s) across {} source(s) ({}) with {:.0}% confidence.",
        entity.record_count,
        sources.len(),
        sources.join(", "),
        entity.aggregate_confidence * 100.0
    );

    let conflicts = entity.conflicts();
    if !conflicts.is_empty() {
        let fields: Vec<&str> = conflicts.iter().map(|c| c.field.as_str()).collect();
        text.push_str(&format!(" Sources disagree on: {}.", fields.join(", ")));
    }
    text
}

/// Values a source reported for `field`, joined
fn values_from(entity: &Entity, source: &SourceId, field: &str) -> Option<String> {
    let merged = entity.merged_fields.get(field)?;
    let values: Vec<&str> = merged
        .values
        .iter()
        .filter(|v| v.supporting_sources.contains(source))
        .map(|v| v.value.as_str())
        .collect();
    (!values.is_empty()).then(|| values.join("; "))
}

/// Whether this source's value for `field` differs from the primary one
fn disputed(entity: &Entity, source: &SourceId, field: &str) -> bool {
    entity
        .merged_fields
        .get(field)
        .and_then(|m| m.primary())
        .map(|primary| {
            !fields::PER_SOURCE.contains(&field)
                && !primary.supporting_sources.contains(source)
        })
        .unwrap_or(false)
}

fn source_paragraph(entity: &Entity, source: &SourceId, subject: &str) -> String {
    let get = |field: &str| values_from(entity, source, field);
    let mark = |field: &str, value: String| {
        if disputed(entity, source, field) {
            format!("{} (disputed)", value)
        } else {
            value
        }
    };

    let mut sentences = Vec::new();

    let title = get(fields::TITLE).map(|v| mark(fields::TITLE, v));
    let employer = get(fields::EMPLOYER).map(|v| mark(fields::EMPLOYER, v));
    match (title, employer) {
        (Some(t), Some(e)) => sentences.push(format!("{} is listed as {} at {}.", subject, t, e)),
        (Some(t), None) => sentences.push(format!("{} is listed as {}.", subject, t)),
        (None, Some(e)) => sentences.push(format!("{} is associated with {}.", subject, e)),
        (None, None) => {}
    }
    if let Some(v) = get(fields::LOCATION) {
        sentences.push(format!("Based in {}.", mark(fields::LOCATION, v)));
    }
    if let Some(v) = get(fields::EDUCATION) {
        sentences.push(format!("Education: {}.", mark(fields::EDUCATION, v)));
    }
    if let Some(v) = get(fields::HEADLINE) {
        sentences.push(format!("Headline: \"{}\".", v));
    }
    if let Some(v) = get(fields::BIO) {
        sentences.push(format!("Bio: \"{}\".", v));
    }
    if let Some(v) = get(fields::SNIPPET) {
        sentences.push(format!("Mentioned as: \"{}\".", v));
    }
    if let Some(v) = get(fields::HANDLE) {
        sentences.push(format!("Handle: {}.", v));
    }

    // Anything else the source reported, in attribute order
    const RENDERED: &[&str] = &[
        fields::NAME,
        fields::TITLE,
        fields::EMPLOYER,
        fields::LOCATION,
        fields::EDUCATION,
        fields::HEADLINE,
        fields::BIO,
        fields::SNIPPET,
        fields::HANDLE,
        fields::URL,
        fields::WEBSITE,
        fields::LINKS,
    ];
    for field in entity.merged_fields.keys() {
        if RENDERED.contains(&field.as_str()) {
            continue;
        }
        if let Some(v) = get(field.as_str()) {
            sentences.push(format!("{}: {}.", capitalize(field), v));
        }
    }

    let links: Vec<String> = [fields::WEBSITE, fields::LINKS]
        .iter()
        .filter_map(|f| get(*f))
        .collect();
    if !links.is_empty() {
        sentences.push(format!("Links: {}.", links.join("; ")));
    }
    if let Some(v) = get(fields::URL) {
        sentences.push(format!("Source: {}", v));
    }

    sentences.join(" ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>().replace('_', " "),
        None => String::new(),
    }
}

fn alternate_line(entity: &Entity) -> String {
    let mut details: Vec<&str> = [fields::EMPLOYER, fields::TITLE, fields::LOCATION]
        .iter()
        .filter_map(|f| entity.field(f))
        .collect();
    details.dedup();

    let sources: Vec<&str> = entity.supporting_sources.iter().map(SourceId::as_str).collect();
    let name = entity.display_name().unwrap_or("Unnamed candidate");
    if details.is_empty() {
        format!(
            "{} - {:.0}% confidence, sources: {}",
            name,
            entity.aggregate_confidence * 100.0,
            sources.join(", ")
        )
    } else {
        format!(
            "{} ({}) - {:.0}% confidence, sources: {}",
            name,
            details.join(", "),
            entity.aggregate_confidence * 100.0,
            sources.join(", ")
        )
    }
}
