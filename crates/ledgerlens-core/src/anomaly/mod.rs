//! Unsupervised anomaly detection
//!
//! Transactions become standardized `[amount, day_of_week, is_credit]` rows
//! (see [`crate::features`]) and are scored by an [`IsolationForest`]. The
//! flag threshold is the contamination percentile of the training scores.

pub mod isolation;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AnomalyConfig;
use crate::features::FeatureBuilder;
use crate::metrics::{MetricsSnapshot, ModelReport, TrainingStatus};
use crate::models::{AnomalyAnnotation, ScoredTransaction, Transaction};

pub use isolation::{average_path_length, percentile, IsolationForest};

/// Training-set diagnostics.
///
/// No labeled anomalies exist, so sensitivity and specificity are the flagged
/// and unflagged shares of the training set itself, not held-out rates. They
/// stay 0 when nothing was flagged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyMetrics {
    pub num_anomalies: usize,
    pub sensitivity: f64,
    pub specificity: f64,
    /// Score threshold; rows scoring below it are flagged
    pub threshold: f64,
    pub training_rows: usize,
}

/// Detector state
#[derive(Debug, Clone, Default)]
pub enum DetectorState {
    #[default]
    Untrained,
    Trained {
        features: FeatureBuilder,
        forest: IsolationForest,
        diagnostics: AnomalyMetrics,
    },
}

/// Isolation-forest anomaly detector over transaction features
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
    state: DetectorState,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AnomalyConfig) -> Self {
        Self {
            config,
            state: DetectorState::Untrained,
        }
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Fit the scaler and forest on `records`, then set the threshold from the
    /// training scores. An empty set leaves the detector untrained.
    pub fn train(&mut self, records: &[Transaction]) -> TrainingStatus {
        self.state = DetectorState::Untrained;
        if records.is_empty() {
            warn!("No records to train the anomaly detector on");
            return TrainingStatus::InsufficientData {
                available: 0,
                required: 1,
            };
        }

        let (features, rows) = FeatureBuilder::fit(records);
        let forest = match IsolationForest::fit(
            &rows,
            self.config.n_estimators,
            self.config.max_samples,
            self.config.seed,
        ) {
            Ok(forest) => forest,
            Err(e) => {
                warn!(error = %e, "Isolation forest training failed");
                return TrainingStatus::FitFailed;
            }
        };

        let scores = forest.score_all(&rows);
        let threshold = percentile(&scores, 100.0 * self.config.contamination);
        let num_anomalies = scores.iter().filter(|&&s| s < threshold).count();

        let n = records.len() as f64;
        let diagnostics = if num_anomalies > 0 {
            AnomalyMetrics {
                num_anomalies,
                sensitivity: num_anomalies as f64 / n,
                specificity: (records.len() - num_anomalies) as f64 / n,
                threshold,
                training_rows: records.len(),
            }
        } else {
            AnomalyMetrics {
                threshold,
                training_rows: records.len(),
                ..Default::default()
            }
        };

        info!(
            rows = records.len(),
            num_anomalies,
            threshold,
            sample_size = forest.sample_size(),
            "Anomaly detector trained"
        );

        self.state = DetectorState::Trained {
            features,
            forest,
            diagnostics,
        };
        TrainingStatus::Trained
    }

    /// Annotation per record, or `None` when untrained
    pub fn score(&self, records: &[Transaction]) -> Option<Vec<AnomalyAnnotation>> {
        let DetectorState::Trained {
            features,
            forest,
            diagnostics,
        } = &self.state
        else {
            return None;
        };

        let rows = features.build(records);
        let annotations = rows
            .iter()
            .map(|row| {
                let anomaly_score = forest.score(row);
                AnomalyAnnotation {
                    is_anomaly: anomaly_score < diagnostics.threshold,
                    anomaly_score,
                }
            })
            .collect();
        Some(annotations)
    }

    /// Annotate every record with its flag and score.
    ///
    /// An untrained detector returns the records unannotated.
    pub fn predict(&self, records: &[Transaction]) -> Vec<ScoredTransaction> {
        let Some(annotations) = self.score(records) else {
            warn!("Anomaly detector is not trained; returning records unannotated");
            return records
                .iter()
                .cloned()
                .map(|transaction| ScoredTransaction {
                    transaction,
                    anomaly: None,
                })
                .collect();
        };

        let scored: Vec<ScoredTransaction> = records
            .iter()
            .cloned()
            .zip(annotations)
            .map(|(transaction, a)| ScoredTransaction {
                transaction,
                anomaly: Some(a),
            })
            .collect();
        debug!(
            rows = scored.len(),
            flagged = scored.iter().filter(|s| s.is_anomaly()).count(),
            "Scored transactions"
        );
        scored
    }

    /// Training diagnostics, if trained
    pub fn diagnostics(&self) -> Option<&AnomalyMetrics> {
        match &self.state {
            DetectorState::Trained { diagnostics, .. } => Some(diagnostics),
            DetectorState::Untrained => None,
        }
    }
}

impl ModelReport for AnomalyDetector {
    fn name(&self) -> &'static str {
        "anomaly_detector"
    }

    fn is_trained(&self) -> bool {
        matches!(self.state, DetectorState::Trained { .. })
    }

    fn metrics(&self) -> MetricsSnapshot {
        let d = self.diagnostics().cloned().unwrap_or_default();
        MetricsSnapshot::new(self.is_trained())
            .with("num_anomalies", d.num_anomalies)
            .with("sensitivity", d.sensitivity)
            .with("specificity", d.specificity)
    }
}
