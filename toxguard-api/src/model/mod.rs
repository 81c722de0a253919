//! Toxicity classification model
//!
//! The model is reached through two seams: a [`ModelLoader`] that produces a
//! [`ToxicityModel`] (the expensive step), and the model's `classify`.
//! [`ModelGate`] owns the single loaded instance.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub mod gate;
pub mod lexicon;

pub use gate::ModelGate;
pub use lexicon::{LexiconLoader, LexiconModel};

/// Model failures
///
/// Cloneable so one failed load can be handed to every caller that joined it.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Classification failed: {0}")]
    Classify(String),
}

/// Outcome for one label on one input text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelResult {
    /// `[negative, positive]`, summing to 1
    pub probabilities: [f64; 2],
    /// `Some(true)` if positive exceeds the threshold, `Some(false)` if negative
    /// does, `None` if neither is confident enough
    #[serde(rename = "match")]
    pub matched: Option<bool>,
}

impl LabelResult {
    /// Build from the positive-class probability at `threshold`
    pub fn from_probability(positive: f64, threshold: f64) -> Self {
        let positive = positive.clamp(0.0, 1.0);
        let negative = 1.0 - positive;
        let matched = if positive > threshold {
            Some(true)
        } else if negative > threshold {
            Some(false)
        } else {
            None
        };
        Self {
            probabilities: [negative, positive],
            matched,
        }
    }

    pub fn positive(&self) -> f64 {
        self.probabilities[1]
    }
}

/// One label evaluated over every input text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    /// One entry per input text, in input order
    pub results: Vec<LabelResult>,
}

/// A loaded classifier
#[async_trait]
pub trait ToxicityModel: Send + Sync {
    /// Labels this model evaluates
    fn labels(&self) -> Vec<String>;

    /// Classify `texts`, returning one prediction per label
    async fn classify(&self, texts: &[String], threshold: f64) -> anyhow::Result<Vec<Prediction>>;
}

/// Produces a model instance; may be slow and may fail
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, threshold: f64) -> anyhow::Result<Arc<dyn ToxicityModel>>;
}

/// Shared reference to the loaded model
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<dyn ToxicityModel>,
    threshold: f64,
}

impl ModelHandle {
    pub fn new(model: Arc<dyn ToxicityModel>, threshold: f64) -> Self {
        Self { model, threshold }
    }

    /// Threshold the model was loaded with
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub async fn classify(
        &self,
        texts: &[String],
        threshold: f64,
    ) -> Result<Vec<Prediction>, ModelError> {
        self.model
            .classify(texts, threshold)
            .await
            .map_err(|e| ModelError::Classify(format!("{:#}", e)))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("labels", &self.model.labels())
            .field("threshold", &self.threshold)
            .finish()
    }
}
