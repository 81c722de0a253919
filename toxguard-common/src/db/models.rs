//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Minimum analysable text length, counted in characters after trimming
pub const MIN_TEXT_CHARS: usize = 3;

/// One matched label and its positive-class probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub probability: f64,
}

/// Persisted outcome of one classification request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// Text as submitted (untrimmed)
    pub text: String,
    pub results: Vec<LabelScore>,
    pub threshold: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the caller when creating an analysis
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub text: String,
    pub results: Vec<LabelScore>,
    pub threshold: f64,
}

/// Check the text invariant and return the trimmed text
pub fn validate_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_TEXT_CHARS {
        return Err(Error::InvalidInput(format!(
            "Text must be at least {} characters",
            MIN_TEXT_CHARS
        )));
    }
    Ok(trimmed)
}
