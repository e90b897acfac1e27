//! Report assembly and export

pub mod assembler;
pub mod export;

pub use assembler::{assemble_report, format, Paragraph, Report};
pub use export::{export, to_csv, to_json, ExportFormat};
