//! Ledgerlens Core Library
//!
//! Analytics engine for transaction ledgers:
//! - Ledger ingest and normalization
//! - Standardized numeric features for anomaly scoring
//! - Hybrid categorization (keyword rules + weakly supervised text classifier)
//! - Isolation-forest anomaly detection
//! - Daily spend forecasting (seasonal ARIMA with moving-average fallback)
//! - Per-model metrics snapshots and spending summaries
//!
//! Every model is a session object: create it, `train` it once per ledger,
//! then query it. Training on too little data is not an error; the model
//! stays untrained and its queries return safe defaults.

pub mod anomaly;
pub mod categorizer;
pub mod config;
pub mod error;
pub mod features;
pub mod forecast;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod summary;

pub use anomaly::{AnomalyDetector, AnomalyMetrics, DetectorState, IsolationForest};
pub use categorizer::{
    CategorizerMetrics, CategorySource, Classification, KeywordRules, LearnedLayer,
    TextClassifier, TransactionCategorizer, WeakLabeler,
};
pub use config::{AnomalyConfig, CategorizerConfig, EngineConfig, ForecastConfig};
pub use error::{Error, Result};
pub use features::{FeatureBuilder, FeatureRow, StandardScaler};
pub use forecast::{
    DailySeries, ExpensePredictor, Forecast, ForecastModel, ModelInfo, PredictorState, SarimaFit,
};
pub use metrics::{MetricValue, MetricsSnapshot, ModelReport, TrainingStatus};
pub use models::{
    AnomalyAnnotation, Category, ForecastPoint, RawTransaction, ScoredTransaction, Transaction,
    TransactionType,
};
pub use pipeline::{AnalysisReport, AnalyticsPipeline, AnalyzedTransaction, CategorizerOrigin};
pub use preprocess::{load_csv, preprocess, preprocess_csv, write_csv, PreprocessStats};
pub use summary::{CategorySpend, SpendingSummary};
