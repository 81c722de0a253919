//! Analysis pipeline: validate, classify, keep matched labels, persist

use thiserror::Error;
use toxguard_common::config::is_valid_threshold;
use toxguard_common::db::{insert_analysis, validate_text, Database, LabelScore, NewAnalysis};
use uuid::Uuid;

use crate::model::{ModelError, ModelGate, Prediction};

pub const TEXT_TOO_SHORT: &str = "Text must be at least 3 characters";
pub const THRESHOLD_OUT_OF_RANGE: &str = "Threshold must be a number between 0 and 1";

/// Analysis failures
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// Rejected before any model or store call
    #[error("{0}")]
    Validation(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Failed to save analysis: {0}")]
    Store(#[source] toxguard_common::Error),
}

/// Result of a successful analysis
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub results: Vec<LabelScore>,
    pub analysis_id: Uuid,
    /// Threshold the text was actually classified at
    pub threshold: f64,
}

/// Runs one analysis end to end
pub struct AnalysisPipeline {
    gate: ModelGate,
    db: Database,
    default_threshold: f64,
    freeze_threshold: bool,
}

impl AnalysisPipeline {
    pub fn new(gate: ModelGate, db: Database, default_threshold: f64, freeze_threshold: bool) -> Self {
        Self {
            gate,
            db,
            default_threshold,
            freeze_threshold,
        }
    }

    /// Classify `text` and persist the outcome
    ///
    /// The stored text is the caller's original; classification sees it
    /// trimmed. With `freeze_threshold` set, the threshold the model was
    /// first loaded with overrides the requested one.
    pub async fn analyze(
        &self,
        text: Option<&str>,
        threshold: Option<f64>,
    ) -> Result<AnalysisOutcome, AnalyzeError> {
        let text = text.ok_or(AnalyzeError::Validation(TEXT_TOO_SHORT))?;
        let trimmed = validate_text(text).map_err(|_| AnalyzeError::Validation(TEXT_TOO_SHORT))?;

        let requested = threshold.unwrap_or(self.default_threshold);
        if !is_valid_threshold(requested) {
            return Err(AnalyzeError::Validation(THRESHOLD_OUT_OF_RANGE));
        }

        let model = self.gate.ensure_loaded(requested).await?;
        let effective = if self.freeze_threshold {
            model.threshold()
        } else {
            requested
        };

        let predictions = model.classify(&[trimmed.to_string()], effective).await?;
        let results = matched_labels(&predictions);

        let record = insert_analysis(
            &self.db,
            NewAnalysis {
                text: text.to_string(),
                results: results.clone(),
                threshold: effective,
            },
        )
        .await
        .map_err(AnalyzeError::Store)?;

        Ok(AnalysisOutcome {
            results,
            analysis_id: record.id,
            threshold: effective,
        })
    }
}

/// Labels whose first result matched, with the positive-class probability
pub fn matched_labels(predictions: &[Prediction]) -> Vec<LabelScore> {
    predictions
        .iter()
        .filter_map(|prediction| {
            let result = prediction.results.first()?;
            let probability = result.positive();
            (result.matched == Some(true) && (0.0..=1.0).contains(&probability)).then(|| {
                LabelScore {
                    label: prediction.label.clone(),
                    probability,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LabelResult;

    fn prediction(label: &str, positive: f64, matched: Option<bool>) -> Prediction {
        Prediction {
            label: label.to_string(),
            results: vec![LabelResult {
                probabilities: [1.0 - positive, positive],
                matched,
            }],
        }
    }

    #[test]
    fn test_matched_labels_keeps_only_true_matches() {
        let predictions = vec![
            prediction("insult", 0.97, Some(true)),
            prediction("threat", 0.02, Some(false)),
            prediction("toxicity", 0.6, None),
        ];

        let results = matched_labels(&predictions);

        assert_eq!(
            results,
            vec![LabelScore {
                label: "insult".to_string(),
                probability: 0.97,
            }]
        );
    }

    #[test]
    fn test_matched_labels_skips_empty_results() {
        let predictions = vec![Prediction {
            label: "insult".to_string(),
            results: Vec::new(),
        }];
        assert!(matched_labels(&predictions).is_empty());
    }
}
