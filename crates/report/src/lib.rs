//! PDF report generation
//!
//! Renders a [`ReportRecord`] into a single-column A4 document using the
//! built-in Helvetica faces, so no font files are embedded.

pub mod fonts;
pub mod layout;
pub mod render;

use dermai_common::DermError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use render::{render, DISCLAIMER, NO_REFERENCES, TITLE};

/// Download name used for rendered reports
pub const REPORT_FILENAME: &str = "DermAI_Report.pdf";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to encode page content: {0}")]
    Content(String),

    #[error("Failed to write PDF: {0}")]
    Write(String),
}

impl From<ReportError> for DermError {
    fn from(err: ReportError) -> Self {
        DermError::Report(err.to_string())
    }
}

/// Confidence as supplied by the client, either a number or free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Confidence {
    Number(serde_json::Number),
    Text(String),
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::Text("N/A".to_string())
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Number(n) => write!(f, "{n}"),
            Confidence::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Fields shown in a report
///
/// Deserialization is lenient: missing or null fields take their defaults,
/// scalar values are shown as text, and a `references` value that is not a
/// list is treated as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawReportRecord")]
pub struct ReportRecord {
    pub image_name: String,
    pub predicted_class: String,
    pub confidence: Confidence,
    pub description: String,
    pub treatment: String,
    pub references: Vec<String>,
}

impl Default for ReportRecord {
    fn default() -> Self {
        Self {
            image_name: "uploaded_image".to_string(),
            predicted_class: "Unknown".to_string(),
            confidence: Confidence::default(),
            description: "No description available.".to_string(),
            treatment: "No treatment available.".to_string(),
            references: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReportRecord {
    image_name: Value,
    predicted_class: Value,
    confidence: Value,
    description: Value,
    treatment: Value,
    references: Value,
}

fn display_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl From<RawReportRecord> for ReportRecord {
    fn from(raw: RawReportRecord) -> Self {
        let defaults = ReportRecord::default();

        let confidence = match raw.confidence {
            Value::Null => defaults.confidence,
            Value::Number(n) => Confidence::Number(n),
            Value::String(s) => Confidence::Text(s),
            other => Confidence::Text(other.to_string()),
        };

        let references = match raw.references {
            Value::Array(items) => items.into_iter().filter_map(display_text).collect(),
            _ => Vec::new(),
        };

        Self {
            image_name: display_text(raw.image_name).unwrap_or(defaults.image_name),
            predicted_class: display_text(raw.predicted_class).unwrap_or(defaults.predicted_class),
            confidence,
            description: display_text(raw.description).unwrap_or(defaults.description),
            treatment: display_text(raw.treatment).unwrap_or(defaults.treatment),
            references,
        }
    }
}
