//! Weighted-lexicon toxicity classifier
//!
//! Each label has a bias and a table of term weights. A text's positive
//! probability for a label is `sigmoid(bias + sum of weights of the distinct
//! terms it contains)`. Assets are JSON:
//!
//! ```json
//! { "labels": [ { "label": "insult", "bias": -3.0, "terms": { "idiot": 3.5 } } ] }
//! ```

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::{LabelResult, ModelLoader, Prediction, ToxicityModel};

/// Lexicon shipped with the binary
const EMBEDDED_LEXICON: &str = include_str!("../../assets/toxicity_lexicon.json");

#[derive(Debug, Deserialize)]
struct LexiconFile {
    labels: Vec<LabelLexicon>,
}

#[derive(Debug, Deserialize)]
struct LabelLexicon {
    label: String,
    bias: f64,
    terms: HashMap<String, f64>,
}

/// Loaded lexicon classifier
#[derive(Debug)]
pub struct LexiconModel {
    labels: Vec<LabelLexicon>,
}

impl LexiconModel {
    /// Parse and validate lexicon JSON
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let file: LexiconFile = serde_json::from_str(json).context("invalid lexicon JSON")?;

        if file.labels.is_empty() {
            bail!("lexicon defines no labels");
        }

        let mut seen = HashSet::new();
        let mut labels = Vec::with_capacity(file.labels.len());
        for mut entry in file.labels {
            if !seen.insert(entry.label.clone()) {
                bail!("duplicate label '{}' in lexicon", entry.label);
            }
            if !entry.bias.is_finite() {
                bail!("label '{}' has a non-finite bias", entry.label);
            }
            if let Some((term, _)) = entry.terms.iter().find(|(_, w)| !w.is_finite()) {
                bail!("term '{}' of label '{}' has a non-finite weight", term, entry.label);
            }
            // Matching is case-insensitive
            entry.terms = entry
                .terms
                .into_iter()
                .map(|(term, weight)| (term.to_lowercase(), weight))
                .collect();
            labels.push(entry);
        }

        Ok(Self { labels })
    }

    /// The lexicon compiled into the binary
    pub fn embedded() -> anyhow::Result<Self> {
        Self::from_json(EMBEDDED_LEXICON)
    }

    /// Positive-class probability per label, in lexicon order
    pub fn score(&self, text: &str) -> Vec<(&str, f64)> {
        let tokens = tokenize(text);
        self.labels
            .iter()
            .map(|entry| {
                let logit = tokens
                    .iter()
                    .filter_map(|token| entry.terms.get(token.as_str()))
                    .fold(entry.bias, |acc, weight| acc + weight);
                (entry.label.as_str(), sigmoid(logit))
            })
            .collect()
    }
}

#[async_trait]
impl ToxicityModel for LexiconModel {
    fn labels(&self) -> Vec<String> {
        self.labels.iter().map(|entry| entry.label.clone()).collect()
    }

    async fn classify(&self, texts: &[String], threshold: f64) -> anyhow::Result<Vec<Prediction>> {
        let scores: Vec<Vec<(&str, f64)>> = texts.iter().map(|text| self.score(text)).collect();

        let predictions = self
            .labels
            .iter()
            .enumerate()
            .map(|(index, entry)| Prediction {
                label: entry.label.clone(),
                results: scores
                    .iter()
                    .map(|per_text| LabelResult::from_probability(per_text[index].1, threshold))
                    .collect(),
            })
            .collect();

        Ok(predictions)
    }
}

/// Lowercased alphanumeric words (apostrophes kept), deduplicated
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|word| word.trim_matches('\'').to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Loads a [`LexiconModel`] from a file, or the embedded lexicon
#[derive(Debug, Clone, Default)]
pub struct LexiconLoader {
    path: Option<PathBuf>,
}

impl LexiconLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ModelLoader for LexiconLoader {
    async fn load(&self, threshold: f64) -> anyhow::Result<Arc<dyn ToxicityModel>> {
        let model = match &self.path {
            Some(path) => {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("cannot read model assets {}", path.display()))?;
                LexiconModel::from_json(&json)
                    .with_context(|| format!("cannot parse model assets {}", path.display()))?
            }
            None => LexiconModel::embedded()?,
        };

        info!("Lexicon model ready with {} labels", model.labels.len());
        debug!("Model load threshold: {}", threshold);
        Ok(Arc::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEST_LEXICON: &str = r#"{
        "labels": [
            { "label": "insult", "bias": -4.0, "terms": { "Idiot": 6.0, "stupid": 3.0 } },
            { "label": "threat", "bias": -4.0, "terms": { "hurt": 6.0 } }
        ]
    }"#;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        let tokens = tokenize("You're an IDIOT, an idiot!!");
        assert!(tokens.contains("you're"));
        assert!(tokens.contains("idiot"));
        assert!(tokens.contains("an"));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_score_uses_distinct_terms() {
        let model = LexiconModel::from_json(TEST_LEXICON).unwrap();

        let once = model.score("idiot");
        let twice = model.score("idiot idiot");
        assert_eq!(once, twice);
        assert_eq!(once[0].0, "insult");
        assert!((once[0].1 - sigmoid(2.0)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_classify_shapes_predictions() {
        let model = LexiconModel::from_json(TEST_LEXICON).unwrap();
        let texts = vec!["what an idiot".to_string(), "lovely weather".to_string()];

        let predictions = model.classify(&texts, 0.85).await.unwrap();

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].label, "insult");
        assert_eq!(predictions[0].results.len(), 2);
        assert_eq!(predictions[0].results[0].matched, Some(true));
        assert_eq!(predictions[0].results[1].matched, Some(false));
        assert_eq!(predictions[1].results[0].matched, Some(false));
    }

    #[test]
    fn test_rejects_bad_lexicons() {
        assert!(LexiconModel::from_json("not json").is_err());
        assert!(LexiconModel::from_json(r#"{"labels": []}"#).is_err());
        assert!(LexiconModel::from_json(
            r#"{"labels": [
                {"label": "a", "bias": 0, "terms": {}},
                {"label": "a", "bias": 0, "terms": {}}
            ]}"#
        )
        .is_err());
    }

    #[test]
    fn test_embedded_lexicon_is_valid() {
        let model = LexiconModel::embedded().unwrap();
        let labels = model.labels();
        for expected in [
            "identity_attack",
            "insult",
            "obscene",
            "severe_toxicity",
            "sexual_explicit",
            "threat",
            "toxicity",
        ] {
            assert!(labels.iter().any(|l| l == expected), "missing label {}", expected);
        }
    }

    #[tokio::test]
    async fn test_embedded_lexicon_separates_obvious_cases() {
        let model = LexiconModel::embedded().unwrap();

        let kind = model
            .classify(&["You are wonderful".to_string()], 0.85)
            .await
            .unwrap();
        assert!(kind.iter().all(|p| p.results[0].matched != Some(true)));

        let rude = model
            .classify(&["you stupid idiot".to_string()], 0.85)
            .await
            .unwrap();
        let insult = rude.iter().find(|p| p.label == "insult").unwrap();
        assert_eq!(insult.results[0].matched, Some(true));
    }

    #[tokio::test]
    async fn test_loader_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", TEST_LEXICON).unwrap();

        let loader = LexiconLoader::new(Some(file.path().to_path_buf()));
        let model = loader.load(0.85).await.unwrap();
        assert_eq!(model.labels(), vec!["insult".to_string(), "threat".to_string()]);
    }

    #[tokio::test]
    async fn test_loader_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let loader = LexiconLoader::new(Some(dir.path().join("missing.json")));
        assert!(loader.load(0.85).await.is_err());
    }
}
