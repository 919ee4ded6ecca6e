//! Structured analysis of an incident statement.
//!
//! The analysis service is asked for one JSON object. What comes back is
//! model output, so it is validated here before it can reach a record:
//! a malformed result is rejected whole, never stored partially.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Allowed urgency scores
pub const URGENCY_RANGE: RangeInclusive<u8> = 1..=5;

/// Incident classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCategory {
    Police,
    Workplace,
    Housing,
    Other,
}

impl IncidentCategory {
    /// Parse a category label, case-insensitively
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "police" => Some(Self::Police),
            "workplace" => Some(Self::Workplace),
            "housing" => Some(Self::Housing),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for IncidentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Police => "police",
            Self::Workplace => "workplace",
            Self::Housing => "housing",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// Validated analysis attached to an evidence record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// Incident type
    pub category: IncidentCategory,

    /// Urgency, 1 (low) to 5 (critical)
    pub urgency_score: u8,

    /// People, places, organisations named in the statement
    pub entities: Vec<String>,

    /// Formal incident report
    pub report: String,
}

/// Why an analysis response was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisShapeError {
    #[error("Response is not a JSON object: {0}")]
    NotJson(String),

    #[error("Unknown incident category: {0}")]
    UnknownCategory(String),

    #[error("Urgency {0} is outside 1..=5")]
    UrgencyOutOfRange(i64),

    #[error("Report is empty")]
    EmptyReport,
}

/// Shape the analysis service is instructed to return.
///
/// Record-side names are accepted as aliases so a stored analysis can be
/// fed back through the same validation.
#[derive(Debug, Deserialize)]
struct WireAnalysis {
    #[serde(rename = "incidentType", alias = "category")]
    incident_type: String,

    #[serde(alias = "urgencyScore", alias = "urgency_score")]
    urgency: i64,

    #[serde(rename = "extractedEntities", alias = "entities")]
    extracted_entities: Vec<String>,

    #[serde(rename = "formalReport", alias = "report")]
    formal_report: String,
}

impl Analysis {
    /// Validate raw service output into an analysis
    pub fn from_response(raw: &str) -> Result<Self, AnalysisShapeError> {
        let body = strip_code_fence(raw);

        let wire: WireAnalysis =
            serde_json::from_str(body).map_err(|e| AnalysisShapeError::NotJson(e.to_string()))?;

        let category = IncidentCategory::from_label(&wire.incident_type)
            .ok_or_else(|| AnalysisShapeError::UnknownCategory(wire.incident_type.clone()))?;

        let urgency_score = u8::try_from(wire.urgency)
            .ok()
            .filter(|u| URGENCY_RANGE.contains(u))
            .ok_or(AnalysisShapeError::UrgencyOutOfRange(wire.urgency))?;

        let report = wire.formal_report.trim().to_string();
        if report.is_empty() {
            return Err(AnalysisShapeError::EmptyReport);
        }

        let entities = wire
            .extracted_entities
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            category,
            urgency_score,
            entities,
            report,
        })
    }
}

/// Models often wrap JSON in a Markdown fence; drop it if present
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let without_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return trimmed,
    };

    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
