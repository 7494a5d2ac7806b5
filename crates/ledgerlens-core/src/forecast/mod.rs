//! Daily expense forecasting
//!
//! Debits are summed per day and fed to one of two models:
//!
//! - **Seasonal** - SARIMA(1,1,1)(1,1,1)[7] with an 80% prediction interval,
//!   tried once there are at least `seasonal_min_days` of history
//! - **Moving average** - the trailing mean with seeded day-to-day noise and a
//!   heuristic 0.8x/1.2x band (not a confidence interval)
//!
//! Any failure of the seasonal fit falls back to the moving average.

pub mod optimize;
pub mod sarima;
pub mod series;

use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ForecastConfig;
use crate::metrics::{MetricsSnapshot, ModelReport, TrainingStatus};
use crate::models::{ForecastPoint, Transaction};

pub use sarima::{SarimaFit, SarimaParams};
pub use series::{daily_debit_series, DailySeries};

/// Two-sided 80% normal quantile
const INTERVAL_Z: f64 = 1.281_551_565_544_600_4;

/// Fitted forecasting model
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastModel {
    Seasonal(Box<SarimaFit>),
    MovingAverage { window: usize, average: f64 },
}

/// Descriptive summary of the fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum ModelInfo {
    Sarima {
        order: [usize; 3],
        seasonal_order: [usize; 4],
        params: SarimaParams,
        sigma2: f64,
        aic: f64,
        bic: f64,
    },
    MovingAverage {
        window: usize,
        average: f64,
    },
}

impl ModelInfo {
    pub fn model_type(&self) -> &'static str {
        match self {
            Self::Sarima { .. } => "sarima",
            Self::MovingAverage { .. } => "moving_average",
        }
    }
}

impl ForecastModel {
    pub fn info(&self) -> ModelInfo {
        match self {
            Self::Seasonal(fit) => ModelInfo::Sarima {
                order: sarima::ORDER,
                seasonal_order: sarima::SEASONAL_ORDER,
                params: fit.params,
                sigma2: fit.sigma2,
                aic: fit.aic,
                bic: fit.bic,
            },
            Self::MovingAverage { window, average } => ModelInfo::MovingAverage {
                window: *window,
                average: *average,
            },
        }
    }
}

/// Pick the model for `series`: the seasonal fit when there is enough history
/// and it produces a usable forecast, otherwise the trailing average.
pub fn select_model(series: &DailySeries, config: &ForecastConfig) -> ForecastModel {
    if series.len() >= config.seasonal_min_days {
        match SarimaFit::fit(series.values(), config.max_iterations) {
            Ok(fit) => {
                let usable = fit
                    .forecast(config.horizon_days)
                    .iter()
                    .all(|(mean, sd)| mean.is_finite() && sd.is_finite());
                if usable {
                    debug!(
                        aic = fit.aic,
                        iterations = fit.iterations,
                        "Seasonal model selected"
                    );
                    return ForecastModel::Seasonal(Box::new(fit));
                }
                warn!("Seasonal forecast is not finite; falling back to moving average");
            }
            Err(e) => {
                warn!(error = %e, "Seasonal fit failed; falling back to moving average");
            }
        }
    } else {
        debug!(
            days = series.len(),
            required = config.seasonal_min_days,
            "Not enough history for the seasonal model"
        );
    }

    ForecastModel::MovingAverage {
        window: series.len().min(config.average_window),
        average: series.trailing_mean(config.average_window),
    }
}

/// A forecast table with its total and the model that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub points: Vec<ForecastPoint>,
    /// Sum of the point forecasts
    pub total: f64,
    pub model: ModelInfo,
}

/// Predictor state
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PredictorState {
    #[default]
    Untrained,
    Trained {
        last_date: NaiveDate,
        history_days: usize,
        model: ForecastModel,
    },
}

/// Daily spend forecaster
#[derive(Debug, Clone, Default)]
pub struct ExpensePredictor {
    config: ForecastConfig,
    state: PredictorState,
}

impl ExpensePredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ForecastConfig) -> Self {
        Self {
            config,
            state: PredictorState::Untrained,
        }
    }

    pub fn state(&self) -> &PredictorState {
        &self.state
    }

    /// Aggregate debits per day and fit a model. Prior state is discarded.
    pub fn train(&mut self, records: &[Transaction]) -> TrainingStatus {
        self.state = PredictorState::Untrained;

        let series = daily_debit_series(records);
        let available = series.as_ref().map_or(0, DailySeries::len);
        let required = self.config.min_history_days;

        let Some(series) = series.filter(|_| available >= required) else {
            warn!(
                days = available,
                required, "Not enough daily history to forecast"
            );
            return TrainingStatus::InsufficientData {
                available,
                required,
            };
        };

        let model = select_model(&series, &self.config);
        info!(
            days = series.len(),
            model = model.info().model_type(),
            "Expense predictor trained"
        );

        self.state = PredictorState::Trained {
            last_date: series.end(),
            history_days: series.len(),
            model,
        };
        TrainingStatus::Trained
    }

    /// Forecast `horizon` days after the last observed day
    pub fn forecast(&self, horizon: usize) -> Option<Forecast> {
        let PredictorState::Trained {
            last_date, model, ..
        } = &self.state
        else {
            return None;
        };

        let dates = (1..=horizon).map(|d| *last_date + Duration::days(d as i64));
        let points: Vec<ForecastPoint> = match model {
            ForecastModel::Seasonal(fit) => dates
                .zip(fit.forecast(horizon))
                .map(|(ds, (mean, sd))| ForecastPoint {
                    ds,
                    yhat: mean.max(0.0),
                    yhat_lower: (mean - INTERVAL_Z * sd).max(0.0),
                    yhat_upper: (mean + INTERVAL_Z * sd).max(0.0),
                })
                .collect(),
            ForecastModel::MovingAverage { average, .. } => {
                let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
                let (low, high) = (self.config.noise_low, self.config.noise_high);
                dates
                    .map(|ds| {
                        let factor = if high > low { rng.gen_range(low..high) } else { low };
                        let yhat = (average * factor).max(0.0);
                        ForecastPoint {
                            ds,
                            yhat,
                            yhat_lower: yhat * self.config.band_lower,
                            yhat_upper: yhat * self.config.band_upper,
                        }
                    })
                    .collect()
            }
        };

        let total = points.iter().map(|p| p.yhat).sum();
        Some(Forecast {
            points,
            total,
            model: model.info(),
        })
    }

    /// Forecast for the configured horizon
    pub fn predict(&self) -> Option<Forecast> {
        self.forecast(self.config.horizon_days)
    }

    pub fn predict_next_30_days(&self) -> Option<Forecast> {
        self.forecast(30)
    }

    /// Total of the 30-day forecast, or 0 when untrained
    pub fn total_predicted_spend(&self) -> f64 {
        self.predict_next_30_days().map_or(0.0, |f| f.total)
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        match &self.state {
            PredictorState::Trained { model, .. } => Some(model.info()),
            PredictorState::Untrained => None,
        }
    }
}

impl ModelReport for ExpensePredictor {
    fn name(&self) -> &'static str {
        "expense_predictor"
    }

    fn is_trained(&self) -> bool {
        matches!(self.state, PredictorState::Trained { .. })
    }

    fn metrics(&self) -> MetricsSnapshot {
        let PredictorState::Trained {
            history_days,
            model,
            ..
        } = &self.state
        else {
            return MetricsSnapshot::new(false);
        };

        let info = model.info();
        let mut snapshot = MetricsSnapshot::new(true)
            .with("model_type", info.model_type())
            .with("history_days", *history_days)
            .with("total_predicted_spend", self.total_predicted_spend());
        match info {
            ModelInfo::Sarima {
                aic, bic, sigma2, ..
            } => {
                snapshot.insert("aic", aic);
                snapshot.insert("bic", bic);
                snapshot.insert("sigma2", sigma2);
            }
            ModelInfo::MovingAverage { window, average } => {
                snapshot.insert("window", window);
                snapshot.insert("average", average);
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn daily(amounts: impl IntoIterator<Item = f64>) -> Vec<Transaction> {
        amounts
            .into_iter()
            .enumerate()
            .map(|(i, amount)| Transaction {
                date: start() + Duration::days(i as i64),
                description: "spend".into(),
                amount,
                tx_type: TransactionType::Debit,
                clean_description: "spend".into(),
            })
            .collect()
    }

    #[test]
    fn test_ten_days_is_insufficient() {
        let mut predictor = ExpensePredictor::new();
        let status = predictor.train(&daily(vec![100.0; 10]));
        assert_eq!(
            status,
            TrainingStatus::InsufficientData {
                available: 10,
                required: 14
            }
        );
        assert!(predictor.predict_next_30_days().is_none());
        assert_eq!(predictor.total_predicted_spend(), 0.0);
        assert!(!predictor.metrics().is_trained());
    }

    #[test]
    fn test_flat_history_forecasts_thirty_days() {
        let mut predictor = ExpensePredictor::new();
        assert!(predictor.train(&daily(vec![100.0; 25])).is_trained());

        let forecast = predictor.predict_next_30_days().unwrap();
        assert_eq!(forecast.points.len(), 30);
        let last = start() + Duration::days(24);
        for (i, p) in forecast.points.iter().enumerate() {
            assert_eq!(p.ds, last + Duration::days(i as i64 + 1));
            assert!(p.yhat >= 0.0 && p.yhat_lower >= 0.0 && p.yhat_upper >= 0.0);
        }

        // Flat history has no residual variance, so the average is used
        assert_eq!(
            forecast.model,
            ModelInfo::MovingAverage {
                window: 25,
                average: 100.0
            }
        );
    }

    #[test]
    fn test_exact_weekly_repeat_uses_moving_average() {
        let week = [120.0, 80.0, 95.0, 60.0, 150.0, 300.0, 220.0];
        let mut predictor = ExpensePredictor::new();
        assert!(predictor.train(&daily((0..28).map(|i| week[i % 7]))).is_trained());

        match predictor.model_info().unwrap() {
            ModelInfo::MovingAverage { window, average } => {
                assert_eq!(window, 28);
                assert!((average - week.iter().sum::<f64>() / 7.0).abs() < 1e-9);
            }
            other => panic!("unexpected model {:?}", other),
        }
    }

    #[test]
    fn test_short_history_uses_moving_average() {
        let mut predictor = ExpensePredictor::new();
        predictor.train(&daily((0..15).map(|i| 50.0 + i as f64)));

        let info = predictor.model_info().unwrap();
        assert_eq!(info.model_type(), "moving_average");

        let forecast = predictor.predict_next_30_days().unwrap();
        for p in &forecast.points {
            assert!(p.yhat >= 0.8 * 57.0 - 1e-9 && p.yhat <= 1.2 * 57.0 + 1e-9);
            assert!((p.yhat_lower - 0.8 * p.yhat).abs() < 1e-9);
            assert!((p.yhat_upper - 1.2 * p.yhat).abs() < 1e-9);
        }
    }

    #[test]
    fn test_total_is_sum_of_points() {
        let mut predictor = ExpensePredictor::new();
        predictor.train(&daily((0..40).map(|i| 200.0 + ((i * 13) % 7) as f64 * 20.0)));

        let forecast = predictor.predict_next_30_days().unwrap();
        let sum: f64 = forecast.points.iter().map(|p| p.yhat).sum();
        assert!((forecast.total - sum).abs() < 1e-9);
        assert!((predictor.total_predicted_spend() - sum).abs() < 1e-9);
    }

    #[test]
    fn test_alternating_history_end_to_end() {
        let amounts: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 500.0 } else { 800.0 }).collect();
        let average = amounts.iter().sum::<f64>() / 60.0;

        let mut predictor = ExpensePredictor::new();
        assert!(predictor.train(&daily(amounts)).is_trained());

        let forecast = predictor.predict_next_30_days().unwrap();
        assert_eq!(forecast.points.len(), 30);
        for p in &forecast.points {
            assert!(p.yhat_lower <= p.yhat && p.yhat <= p.yhat_upper, "{:?}", p);
        }
        let expected = average * 30.0;
        assert!(
            forecast.total >= 0.5 * expected && forecast.total <= 2.0 * expected,
            "total {} vs expected {}",
            forecast.total,
            expected
        );
    }

    #[test]
    fn test_gaps_count_as_zero_spend_days() {
        let mut records = daily(vec![100.0; 3]);
        records.extend(daily(vec![100.0; 1]).into_iter().map(|mut tx| {
            tx.date = start() + Duration::days(13);
            tx
        }));
        let mut predictor = ExpensePredictor::new();
        assert!(predictor.train(&records).is_trained());
        match predictor.model_info().unwrap() {
            ModelInfo::MovingAverage { window, average } => {
                assert_eq!(window, 14);
                assert!((average - 400.0 / 14.0).abs() < 1e-9);
            }
            other => panic!("unexpected model {:?}", other),
        }
    }

    #[test]
    fn test_forecast_is_reproducible() {
        let mut predictor = ExpensePredictor::new();
        predictor.train(&daily(vec![80.0; 16]));
        assert_eq!(predictor.predict_next_30_days(), predictor.predict_next_30_days());
    }

    #[test]
    fn test_retrain_discards_previous_model() {
        let mut predictor = ExpensePredictor::new();
        predictor.train(&daily(vec![80.0; 20]));
        assert!(predictor.is_trained());

        predictor.train(&daily(vec![80.0; 5]));
        assert!(!predictor.is_trained());
        assert!(predictor.model_info().is_none());
    }

    #[test]
    fn test_metrics_describe_model() {
        let mut predictor = ExpensePredictor::new();
        predictor.train(&daily(vec![60.0; 18]));
        let m = predictor.metrics();
        assert!(m.is_trained());
        assert_eq!(m.number("window"), Some(18.0));
        assert_eq!(m.number("history_days"), Some(18.0));
        assert!(m.number("total_predicted_spend").unwrap() > 0.0);
    }
}
