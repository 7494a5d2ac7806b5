//! Hybrid transaction categorizer
//!
//! Two layers in strict priority order:
//!
//! - **Rules** - a [`WeakLabeler`] (by default [`KeywordRules`]) that either
//!   labels a description or abstains.
//! - **Learned** - a TF-IDF + random forest [`TextClassifier`] trained only on
//!   the rows the rules could label.
//!
//! Anything neither layer can handle is [`Category::Other`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledgerlens_core::TransactionCategorizer;
//!
//! let mut categorizer = TransactionCategorizer::new();
//! categorizer.train(&records);
//! let labels = categorizer.predict(&records);
//! ```

pub mod evaluation;
pub mod forest;
pub mod rules;
pub mod text;

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::{default_model_path, CategorizerConfig};
use crate::error::{Error, Result};
use crate::metrics::{MetricsSnapshot, ModelReport, TrainingStatus};
use crate::models::{Category, Transaction};

pub use evaluation::{classification_scores, train_test_split, ClassificationScores, Split};
pub use forest::{ForestConfig, RandomForestClassifier};
pub use rules::{weak_label, KeywordRules, WeakLabeler};
pub use text::{tokenize, SparseVector, TfidfVectorizer};

/// Artifact layout version written by [`TransactionCategorizer::save`]
const ARTIFACT_VERSION: u32 = 1;

/// TF-IDF vectorizer and random forest, fitted together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextClassifier {
    vectorizer: TfidfVectorizer,
    forest: RandomForestClassifier,
    /// Forest class index → category
    classes: Vec<Category>,
}

impl TextClassifier {
    /// Fit on `(text, label)` pairs
    pub fn fit(samples: &[(&str, Category)], config: &CategorizerConfig) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::Training("no samples to fit".into()));
        }

        let texts: Vec<&str> = samples.iter().map(|(t, _)| *t).collect();
        let vectorizer = TfidfVectorizer::fit(&texts, config.max_vocabulary)?;
        let rows = vectorizer.transform_all(&texts)?;

        let classes: Vec<Category> = samples
            .iter()
            .map(|(_, c)| *c)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let labels: Vec<usize> = samples
            .iter()
            .map(|(_, c)| classes.iter().position(|k| k == c).unwrap_or(0))
            .collect();

        let mut forest = RandomForestClassifier::new(ForestConfig {
            n_trees: config.n_estimators,
            seed: config.seed,
            ..Default::default()
        });
        forest.fit(&rows, &labels, vectorizer.vocabulary_size(), classes.len())?;

        Ok(Self {
            vectorizer,
            forest,
            classes,
        })
    }

    pub fn predict(&self, text: &str) -> Result<Category> {
        let row = self.vectorizer.transform(text)?;
        let idx = self.forest.predict(&row)?;
        self.classes
            .get(idx)
            .copied()
            .ok_or_else(|| Error::InvalidData(format!("class index {} out of range", idx)))
    }

    /// Categories the classifier can emit
    pub fn classes(&self) -> &[Category] {
        &self.classes
    }

    /// Check that the vectorizer, forest and class list agree
    pub fn validate(&self) -> Result<()> {
        self.vectorizer.validate()?;
        if self.forest.n_trees() == 0 {
            return Err(Error::InvalidData("random forest has no trees".into()));
        }
        if self.classes.is_empty() || self.forest.n_classes() != self.classes.len() {
            return Err(Error::InvalidData(format!(
                "forest predicts {} classes but {} categories are listed",
                self.forest.n_classes(),
                self.classes.len()
            )));
        }
        Ok(())
    }
}

/// State of the learned layer
#[derive(Debug, Clone, Default)]
pub enum LearnedLayer {
    #[default]
    Untrained,
    Trained(Box<TextClassifier>),
}

/// Which layer produced a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    Rule,
    Learned,
    Default,
}

/// A category with the layer that assigned it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub source: CategorySource,
}

/// Evaluation of the learned layer on its held-out split
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizerMetrics {
    pub is_trained: bool,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Rows the rule layer could label
    pub labeled_rows: usize,
    pub train_rows: usize,
    pub eval_rows: usize,
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    classifier: &'a TextClassifier,
}

#[derive(Deserialize)]
struct Artifact {
    format_version: u32,
    classifier: TextClassifier,
}

/// Rule layer plus optional learned layer
pub struct TransactionCategorizer<L: WeakLabeler = KeywordRules> {
    labeler: L,
    config: CategorizerConfig,
    learned: LearnedLayer,
    metrics: CategorizerMetrics,
}

impl Default for TransactionCategorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionCategorizer {
    /// Default keyword rules and default settings
    pub fn new() -> Self {
        Self::with_config(CategorizerConfig::default())
    }

    pub fn with_config(config: CategorizerConfig) -> Self {
        Self::with_labeler(KeywordRules::default(), config)
    }
}

impl<L: WeakLabeler> TransactionCategorizer<L> {
    /// Use a custom weak labeler as the rule layer
    pub fn with_labeler(labeler: L, config: CategorizerConfig) -> Self {
        Self {
            labeler,
            config,
            learned: LearnedLayer::Untrained,
            metrics: CategorizerMetrics::default(),
        }
    }

    pub fn labeler(&self) -> &L {
        &self.labeler
    }

    pub fn learned_layer(&self) -> &LearnedLayer {
        &self.learned
    }

    /// Weak-label `records`, then fit and evaluate the learned layer.
    ///
    /// Too few labeled rows leaves the learned layer untrained. A fitting
    /// failure does the same; the rule layer keeps working either way.
    pub fn train(&mut self, records: &[Transaction]) -> TrainingStatus {
        let labeled = weak_label(&self.labeler, records);
        info!(
            labeler = self.labeler.name(),
            labeled = labeled.len(),
            total = records.len(),
            "Weak labeling complete"
        );

        self.learned = LearnedLayer::Untrained;
        self.metrics = CategorizerMetrics {
            labeled_rows: labeled.len(),
            ..Default::default()
        };

        let required = self.config.min_labeled_rows;
        if labeled.len() < required {
            warn!(
                labeled = labeled.len(),
                required, "Not enough rule-labeled rows; learned layer stays untrained"
            );
            return TrainingStatus::InsufficientData {
                available: labeled.len(),
                required,
            };
        }

        match self.fit_and_evaluate(&labeled) {
            Ok((classifier, metrics)) => {
                info!(
                    accuracy = metrics.accuracy,
                    f1 = metrics.f1,
                    train_rows = metrics.train_rows,
                    eval_rows = metrics.eval_rows,
                    "Learned layer trained"
                );
                self.learned = LearnedLayer::Trained(Box::new(classifier));
                self.metrics = metrics;
                TrainingStatus::Trained
            }
            Err(e) => {
                warn!(error = %e, "Learned layer training failed; using rules only");
                TrainingStatus::FitFailed
            }
        }
    }

    fn fit_and_evaluate(
        &self,
        labeled: &[(&str, Category)],
    ) -> Result<(TextClassifier, CategorizerMetrics)> {
        let labels: Vec<Category> = labeled.iter().map(|(_, c)| *c).collect();
        let split = train_test_split(&labels, self.config.test_size, self.config.seed);
        debug!(
            train = split.train.len(),
            eval = split.test.len(),
            stratified = split.stratified,
            "Split labeled rows"
        );

        let train: Vec<(&str, Category)> = split.train.iter().map(|&i| labeled[i]).collect();
        let classifier = TextClassifier::fit(&train, &self.config)?;

        let truth: Vec<Category> = split.test.iter().map(|&i| labeled[i].1).collect();
        let predicted = split
            .test
            .iter()
            .map(|&i| classifier.predict(labeled[i].0))
            .collect::<Result<Vec<_>>>()?;
        let scores = classification_scores(&truth, &predicted);

        let metrics = CategorizerMetrics {
            is_trained: true,
            accuracy: scores.accuracy,
            precision: scores.precision,
            recall: scores.recall,
            f1: scores.f1,
            labeled_rows: labeled.len(),
            train_rows: split.train.len(),
            eval_rows: split.test.len(),
        };
        Ok((classifier, metrics))
    }

    /// One category per record, in input order
    pub fn predict(&self, records: &[Transaction]) -> Vec<Category> {
        records
            .iter()
            .map(|tx| self.predict_description(&tx.clean_description))
            .collect()
    }

    pub fn predict_description(&self, text: &str) -> Category {
        self.classify(text).category
    }

    /// Category for `text` and the layer that decided it
    pub fn classify(&self, text: &str) -> Classification {
        if let Some(category) = self.labeler.label(text) {
            return Classification {
                category,
                source: CategorySource::Rule,
            };
        }

        if let LearnedLayer::Trained(classifier) = &self.learned {
            match classifier.predict(text) {
                Ok(category) => {
                    return Classification {
                        category,
                        source: CategorySource::Learned,
                    }
                }
                Err(e) => warn!(error = %e, "Learned layer prediction failed"),
            }
        }

        Classification {
            category: Category::Other,
            source: CategorySource::Default,
        }
    }

    /// Evaluation results from the last `train`
    pub fn evaluation(&self) -> &CategorizerMetrics {
        &self.metrics
    }

    /// Write the learned layer to `path` as JSON.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let LearnedLayer::Trained(classifier) = &self.learned else {
            return Err(Error::NotTrained(
                "categorizer has no learned layer to save".into(),
            ));
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let artifact = ArtifactRef {
            format_version: ARTIFACT_VERSION,
            classifier,
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, &artifact)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        info!(path = %path.display(), "Saved categorizer artifact");
        Ok(())
    }

    /// Restore the learned layer from `path`.
    ///
    /// Returns `Ok(false)` when no artifact exists. An artifact whose parts
    /// disagree is `Error::InvalidData` and leaves the current state alone.
    /// Evaluation metrics are not recomputed.
    pub fn load(&mut self, path: &Path) -> Result<bool> {
        if !path.exists() {
            debug!(path = %path.display(), "No categorizer artifact found");
            return Ok(false);
        }

        let content = fs::read_to_string(path)?;
        let artifact: Artifact = serde_json::from_str(&content)?;
        if artifact.format_version != ARTIFACT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported categorizer artifact version {}",
                artifact.format_version
            )));
        }

        artifact.classifier.validate()?;

        self.learned = LearnedLayer::Trained(Box::new(artifact.classifier));
        self.metrics.is_trained = true;
        info!(path = %path.display(), "Loaded categorizer artifact");
        Ok(true)
    }

    /// [`save`](Self::save) to the default artifact location
    pub fn save_default(&self) -> Result<PathBuf> {
        let path = model_path()?;
        self.save(&path)?;
        Ok(path)
    }

    /// [`load`](Self::load) from the default artifact location
    pub fn load_default(&mut self) -> Result<bool> {
        let path = model_path()?;
        self.load(&path)
    }
}

fn model_path() -> Result<PathBuf> {
    default_model_path()
        .ok_or_else(|| Error::InvalidData("could not determine data directory".into()))
}

impl<L: WeakLabeler> ModelReport for TransactionCategorizer<L> {
    fn name(&self) -> &'static str {
        "categorizer"
    }

    fn is_trained(&self) -> bool {
        matches!(self.learned, LearnedLayer::Trained(_))
    }

    fn metrics(&self) -> MetricsSnapshot {
        let m = &self.metrics;
        MetricsSnapshot::new(self.is_trained())
            .with("accuracy", m.accuracy)
            .with("precision", m.precision)
            .with("recall", m.recall)
            .with("f1", m.f1)
            .with("labeled_rows", m.labeled_rows)
            .with("train_rows", m.train_rows)
            .with("eval_rows", m.eval_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;
    use chrono::NaiveDate;

    fn tx(description: &str) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: description.to_string(),
            amount: 100.0,
            tx_type: TransactionType::Debit,
            clean_description: description.to_lowercase(),
        }
    }

    fn training_set() -> Vec<Transaction> {
        let mut records = Vec::new();
        for i in 0..6 {
            records.push(tx(&format!("swiggy order dinner {}", ["a", "b", "c", "d", "e", "f"][i])));
            records.push(tx("uber ride airport"));
            records.push(tx("netflix monthly plan"));
            records.push(tx("amazon order books"));
        }
        records.push(tx("random merchant xyz"));
        records
    }

    #[test]
    fn test_untrained_uses_rules_then_other() {
        let categorizer = TransactionCategorizer::new();
        let labels = categorizer.predict(&[tx("starbucks coffee"), tx("xyz ltd")]);
        assert_eq!(labels, vec![Category::FoodAndDining, Category::Other]);
        assert!(!categorizer.is_trained());
    }

    #[test]
    fn test_too_few_labeled_rows_stays_untrained() {
        let mut categorizer = TransactionCategorizer::new();
        let status = categorizer.train(&[tx("uber"), tx("netflix"), tx("nothing here")]);
        assert_eq!(
            status,
            TrainingStatus::InsufficientData {
                available: 2,
                required: 5
            }
        );
        assert!(!categorizer.is_trained());
        assert!(!categorizer.metrics().is_trained());
    }

    #[test]
    fn test_train_produces_metrics() {
        let mut categorizer = TransactionCategorizer::with_config(CategorizerConfig {
            n_estimators: 20,
            ..Default::default()
        });
        let status = categorizer.train(&training_set());
        assert_eq!(status, TrainingStatus::Trained);
        assert!(categorizer.is_trained());

        let m = categorizer.evaluation();
        assert_eq!(m.labeled_rows, 24);
        assert_eq!(m.eval_rows, 5);
        assert_eq!(m.train_rows, 19);
        for v in [m.accuracy, m.precision, m.recall, m.f1] {
            assert!((0.0..=1.0).contains(&v));
        }

        let snapshot = categorizer.metrics();
        assert!(snapshot.is_trained());
        assert!(snapshot.number("f1").is_some());
    }

    #[test]
    fn test_rules_take_priority_over_learned_layer() {
        let records = training_set();
        let untrained = TransactionCategorizer::new();
        let mut trained = TransactionCategorizer::with_config(CategorizerConfig {
            n_estimators: 20,
            ..Default::default()
        });
        trained.train(&records);

        let probes = [
            tx("uber coffee run"),
            tx("salary credit march"),
            tx("upi to friend"),
            tx("gym membership"),
        ];
        assert_eq!(untrained.predict(&probes), trained.predict(&probes));
        for probe in &probes {
            assert_eq!(
                trained.classify(&probe.clean_description).source,
                CategorySource::Rule
            );
        }
    }

    #[test]
    fn test_learned_layer_handles_unlabeled_text() {
        let mut categorizer = TransactionCategorizer::with_config(CategorizerConfig {
            n_estimators: 20,
            ..Default::default()
        });
        categorizer.train(&training_set());

        let c = categorizer.classify("order dinner");
        assert_eq!(c.source, CategorySource::Learned);

        // No known tokens still goes through the forest
        let c = categorizer.classify("zzqq");
        assert_eq!(c.source, CategorySource::Learned);
    }

    #[test]
    fn test_save_untrained_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let categorizer = TransactionCategorizer::new();
        let err = categorizer.save(&dir.path().join("model.json")).unwrap_err();
        assert!(matches!(err, Error::NotTrained(_)));
    }

    #[test]
    fn test_save_and_load_restores_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("categorizer.json");

        let mut trained = TransactionCategorizer::with_config(CategorizerConfig {
            n_estimators: 10,
            ..Default::default()
        });
        trained.train(&training_set());
        trained.save(&path).unwrap();

        let mut restored = TransactionCategorizer::new();
        assert!(restored.load(&path).unwrap());
        assert!(restored.is_trained());
        // Metrics are not recomputed on load
        assert_eq!(restored.evaluation().labeled_rows, 0);

        for text in ["order dinner", "ride airport", "monthly plan", "zzqq"] {
            assert_eq!(trained.classify(text), restored.classify(text));
        }
    }

    #[test]
    fn test_load_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut categorizer = TransactionCategorizer::new();
        assert!(!categorizer.load(&dir.path().join("absent.json")).unwrap());
        assert!(!categorizer.is_trained());
    }

    #[test]
    fn test_load_corrupt_artifact_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categorizer.json");
        fs::write(&path, "{not json").unwrap();

        let mut categorizer = TransactionCategorizer::new();
        assert!(matches!(categorizer.load(&path), Err(Error::Json(_))));
    }

    fn trained_artifact(dir: &Path) -> PathBuf {
        let path = dir.join("categorizer.json");
        let mut categorizer = TransactionCategorizer::with_config(CategorizerConfig {
            n_estimators: 10,
            ..Default::default()
        });
        categorizer.train(&training_set());
        categorizer.save(&path).unwrap();
        path
    }

    fn rewrite_artifact(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        edit(&mut json);
        fs::write(path, serde_json::to_string(&json).unwrap()).unwrap();
    }

    #[test]
    fn test_load_artifact_missing_idf_weights_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = trained_artifact(dir.path());
        rewrite_artifact(&path, |json| {
            json["classifier"]["vectorizer"]["idf"] = serde_json::json!([]);
        });

        let mut categorizer = TransactionCategorizer::new();
        assert!(matches!(categorizer.load(&path), Err(Error::InvalidData(_))));
        assert!(!categorizer.is_trained());
        assert_eq!(categorizer.classify("order dinner").category, Category::Other);
    }

    #[test]
    fn test_load_artifact_with_class_mismatch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = trained_artifact(dir.path());
        rewrite_artifact(&path, |json| {
            json["classifier"]["classes"] = serde_json::json!(["Shopping"]);
        });

        let mut categorizer = TransactionCategorizer::new();
        assert!(matches!(categorizer.load(&path), Err(Error::InvalidData(_))));
        assert!(!categorizer.is_trained());
    }

    #[test]
    fn test_learned_layer_error_falls_back_to_other() {
        let mut categorizer = TransactionCategorizer::with_config(CategorizerConfig {
            n_estimators: 10,
            ..Default::default()
        });
        categorizer.train(&training_set());
        if let LearnedLayer::Trained(classifier) = &mut categorizer.learned {
            classifier.classes.clear();
        }

        let c = categorizer.classify("order dinner");
        assert_eq!(c.category, Category::Other);
        assert_eq!(c.source, CategorySource::Default);
        // Rules are unaffected
        assert_eq!(
            categorizer.classify("swiggy order").category,
            Category::FoodAndDining
        );
    }

    #[test]
    fn test_retrain_with_too_few_rows_resets() {
        let mut categorizer = TransactionCategorizer::with_config(CategorizerConfig {
            n_estimators: 10,
            ..Default::default()
        });
        categorizer.train(&training_set());
        assert!(categorizer.is_trained());

        categorizer.train(&[tx("uber")]);
        assert!(!categorizer.is_trained());
        assert_eq!(categorizer.classify("order dinner").category, Category::Other);
    }

    struct TransferOnly;

    impl WeakLabeler for TransferOnly {
        fn label(&self, text: &str) -> Option<Category> {
            text.contains("zelle").then_some(Category::Transfer)
        }

        fn name(&self) -> &'static str {
            "transfer-only"
        }
    }

    #[test]
    fn test_custom_labeler() {
        let categorizer =
            TransactionCategorizer::with_labeler(TransferOnly, CategorizerConfig::default());
        assert_eq!(categorizer.predict_description("zelle to sam"), Category::Transfer);
        assert_eq!(categorizer.predict_description("starbucks"), Category::Other);
    }
}
