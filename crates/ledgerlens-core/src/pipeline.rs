//! End-to-end analysis over one ledger
//!
//! Canonical records go to all three models independently:
//!
//! 1. Categorizer: restore the learned layer from an artifact if one exists,
//!    otherwise train it on this ledger
//! 2. Anomaly detector: train, then score every record
//! 3. Expense predictor: train, then forecast the configured horizon
//!
//! The models stay on the pipeline afterwards so callers can query them.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::anomaly::AnomalyDetector;
use crate::categorizer::TransactionCategorizer;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::forecast::{ExpensePredictor, Forecast};
use crate::metrics::{MetricsSnapshot, ModelReport, TrainingStatus};
use crate::models::{AnomalyAnnotation, Category, Transaction};
use crate::preprocess::{load_csv, preprocess_with_stats};
use crate::summary::SpendingSummary;

/// A record with every derived signal attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub category: Category,
    #[serde(flatten)]
    pub anomaly: Option<AnomalyAnnotation>,
}

/// How the categorizer's learned layer was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorizerOrigin {
    Loaded,
    Trained(TrainingStatus),
}

/// Training outcome per model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub categorizer: CategorizerOrigin,
    pub anomaly_detector: TrainingStatus,
    pub expense_predictor: TrainingStatus,
}

/// Everything one pipeline run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub transactions: Vec<AnalyzedTransaction>,
    pub forecast: Option<Forecast>,
    pub summary: SpendingSummary,
    pub training: TrainingReport,
    /// Metrics snapshot per model, keyed by model name
    pub metrics: BTreeMap<String, MetricsSnapshot>,
}

impl AnalysisReport {
    /// Flagged debits, in input order
    pub fn anomalous_debits(&self) -> impl Iterator<Item = &AnalyzedTransaction> {
        self.transactions.iter().filter(|t| {
            t.transaction.is_debit() && t.anomaly.map(|a| a.is_anomaly).unwrap_or(false)
        })
    }
}

/// Owns the three models and runs them over a ledger
pub struct AnalyticsPipeline {
    categorizer: TransactionCategorizer,
    detector: AnomalyDetector,
    predictor: ExpensePredictor,
    artifact_path: Option<PathBuf>,
}

impl Default for AnalyticsPipeline {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AnalyticsPipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            categorizer: TransactionCategorizer::with_config(config.categorizer),
            detector: AnomalyDetector::with_config(config.anomaly),
            predictor: ExpensePredictor::with_config(config.forecast),
            artifact_path: None,
        }
    }

    /// Restore the categorizer from `path` when it exists instead of training
    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }

    pub fn categorizer(&self) -> &TransactionCategorizer {
        &self.categorizer
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn predictor(&self) -> &ExpensePredictor {
        &self.predictor
    }

    /// Read a CSV ledger, preprocess it and [`run`](Self::run)
    pub fn run_csv<R: Read>(&mut self, reader: R) -> Result<AnalysisReport> {
        let raw = load_csv(reader)?;
        let (records, stats) = preprocess_with_stats(&raw);
        info!(
            input = stats.input_rows,
            kept = stats.kept,
            "Ledger preprocessed"
        );
        self.run(&records)
    }

    /// Train every model on `records` and collect their outputs.
    ///
    /// Only a corrupt or unreadable categorizer artifact is an error.
    pub fn run(&mut self, records: &[Transaction]) -> Result<AnalysisReport> {
        let categorizer = self.prepare_categorizer(records)?;
        let categories = self.categorizer.predict(records);

        let anomaly_detector = self.detector.train(records);
        let scored = self.detector.predict(records);

        let expense_predictor = self.predictor.train(records);
        let forecast = self.predictor.predict();

        let summary = SpendingSummary::compute(records, &categories, &scored);

        let transactions = scored
            .into_iter()
            .zip(categories)
            .map(|(s, category)| AnalyzedTransaction {
                transaction: s.transaction,
                category,
                anomaly: s.anomaly,
            })
            .collect();

        let reports: [&dyn ModelReport; 3] = [&self.categorizer, &self.detector, &self.predictor];
        let metrics = reports
            .iter()
            .map(|m| (m.name().to_string(), m.metrics()))
            .collect();

        Ok(AnalysisReport {
            transactions,
            forecast,
            summary,
            training: TrainingReport {
                categorizer,
                anomaly_detector,
                expense_predictor,
            },
            metrics,
        })
    }

    fn prepare_categorizer(&mut self, records: &[Transaction]) -> Result<CategorizerOrigin> {
        if let Some(path) = &self.artifact_path {
            if self.categorizer.load(path)? {
                return Ok(CategorizerOrigin::Loaded);
            }
            warn!(path = %path.display(), "No categorizer artifact; training on this ledger");
        }
        Ok(CategorizerOrigin::Trained(self.categorizer.train(records)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;
    use chrono::{Duration, NaiveDate};

    fn ledger() -> Vec<Transaction> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let merchants = ["swiggy dinner", "uber ride", "netflix plan", "big bazaar"];
        (0..40)
            .map(|i| Transaction {
                date: start + Duration::days(i),
                description: merchants[i as usize % 4].to_string(),
                amount: 100.0 + (i % 3) as f64 * 10.0,
                tx_type: TransactionType::Debit,
                clean_description: merchants[i as usize % 4].to_string(),
            })
            .collect()
    }

    #[test]
    fn test_run_trains_every_model() {
        let mut pipeline = AnalyticsPipeline::default();
        let report = pipeline.run(&ledger()).unwrap();

        assert_eq!(report.transactions.len(), 40);
        assert_eq!(
            report.training.categorizer,
            CategorizerOrigin::Trained(TrainingStatus::Trained)
        );
        assert!(report.training.anomaly_detector.is_trained());
        assert!(report.training.expense_predictor.is_trained());
        assert_eq!(report.forecast.as_ref().unwrap().points.len(), 30);

        for name in ["categorizer", "anomaly_detector", "expense_predictor"] {
            assert!(report.metrics[name].is_trained(), "{} not trained", name);
        }
        assert!(report.transactions.iter().all(|t| t.anomaly.is_some()));
        assert_eq!(report.transactions[0].category, Category::FoodAndDining);
    }

    #[test]
    fn test_missing_artifact_falls_back_to_training() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline =
            AnalyticsPipeline::default().with_artifact(dir.path().join("categorizer.json"));
        let report = pipeline.run(&ledger()).unwrap();
        assert!(matches!(
            report.training.categorizer,
            CategorizerOrigin::Trained(_)
        ));
    }

    #[test]
    fn test_existing_artifact_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categorizer.json");

        let mut first = AnalyticsPipeline::default();
        first.run(&ledger()).unwrap();
        first.categorizer().save(&path).unwrap();

        let mut second = AnalyticsPipeline::default().with_artifact(&path);
        let report = second.run(&ledger()).unwrap();
        assert_eq!(report.training.categorizer, CategorizerOrigin::Loaded);
        assert!(report.metrics["categorizer"].is_trained());
    }

    #[test]
    fn test_corrupt_artifact_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categorizer.json");
        std::fs::write(&path, "garbage").unwrap();

        let mut pipeline = AnalyticsPipeline::default().with_artifact(&path);
        assert!(pipeline.run(&ledger()).is_err());
    }

    #[test]
    fn test_empty_ledger_degrades_gracefully() {
        let mut pipeline = AnalyticsPipeline::default();
        let report = pipeline.run(&[]).unwrap();
        assert!(report.transactions.is_empty());
        assert!(report.forecast.is_none());
        assert!(report.metrics.values().all(|m| !m.is_trained()));
    }
}
