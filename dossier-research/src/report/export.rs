//! Outcome export (JSON / CSV)
//!
//! JSON is a serde pass-through of `ResearchOutcome`. CSV flattens entities
//! to one row per attribute value:
//! `rank,entity_id,confidence,field,value,sources`

use crate::error::ResearchError;
use crate::orchestrator::ResearchOutcome;
use crate::report::assembler::assemble_report;
use std::str::FromStr;

/// Output format for research results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Human-readable report
    #[default]
    Text,
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(ExportFormat::Text),
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ResearchError::Export(format!("Unknown format: {}", other))),
        }
    }
}

/// Render an outcome in the requested format
pub fn export(outcome: &ResearchOutcome, format: ExportFormat) -> Result<String, ResearchError> {
    match format {
        ExportFormat::Text => Ok(assemble_report(outcome).to_text()),
        ExportFormat::Json => to_json(outcome),
        ExportFormat::Csv => to_csv(outcome),
    }
}

pub fn to_json(outcome: &ResearchOutcome) -> Result<String, ResearchError> {
    serde_json::to_string_pretty(outcome)
        .map_err(|e| ResearchError::Export(format!("JSON serialization failed: {}", e)))
}

pub fn to_csv(outcome: &ResearchOutcome) -> Result<String, ResearchError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| ResearchError::Export(format!("CSV write failed: {}", e));

    writer
        .write_record(["rank", "entity_id", "confidence", "field", "value", "sources"])
        .map_err(csv_err)?;

    for (rank, entity) in outcome.entities.iter().enumerate() {
        let entity_id = entity.entity_id.to_string();
        let confidence = format!("{:.4}", entity.aggregate_confidence);
        for (field, merged) in &entity.merged_fields {
            for value in &merged.values {
                let sources = value
                    .supporting_sources
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(";");
                writer
                    .write_record([
                        (rank + 1).to_string().as_str(),
                        entity_id.as_str(),
                        confidence.as_str(),
                        field.as_str(),
                        value.value.as_str(),
                        sources.as_str(),
                    ])
                    .map_err(csv_err)?;
            }
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ResearchError::Export(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ResearchError::Export(e.to_string()))
}
