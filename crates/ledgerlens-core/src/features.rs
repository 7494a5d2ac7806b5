//! Numeric features for the anomaly model
//!
//! Each transaction becomes `[amount, day_of_week, is_credit]`, then every
//! column is standardized to zero mean and unit variance. The scaler is fitted
//! once and reused; scoring new records never refits it.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::models::Transaction;

/// Number of feature columns
pub const N_FEATURES: usize = 3;

/// Column names, in order
pub const FEATURE_NAMES: [&str; N_FEATURES] = ["amount", "day_of_week", "is_credit"];

pub type FeatureRow = [f64; N_FEATURES];

/// Raw (unscaled) feature row for one transaction
pub fn raw_features(tx: &Transaction) -> FeatureRow {
    [
        tx.amount,
        tx.date.weekday().num_days_from_monday() as f64,
        if tx.tx_type.is_credit() { 1.0 } else { 0.0 },
    ]
}

/// Per-column standardization fitted on a training set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: FeatureRow,
    scale: FeatureRow,
}

impl StandardScaler {
    /// Fit mean and population standard deviation per column.
    ///
    /// Constant columns get a scale of 1 so they map to 0 instead of NaN.
    pub fn fit(rows: &[FeatureRow]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = [0.0; N_FEATURES];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut scale = [0.0; N_FEATURES];
        for row in rows {
            for j in 0..N_FEATURES {
                scale[j] += (row[j] - mean[j]).powi(2);
            }
        }
        for s in &mut scale {
            *s = (*s / n).sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        Self { mean, scale }
    }

    pub fn transform_row(&self, row: &FeatureRow) -> FeatureRow {
        let mut out = [0.0; N_FEATURES];
        for j in 0..N_FEATURES {
            out[j] = (row[j] - self.mean[j]) / self.scale[j];
        }
        out
    }

    pub fn transform(&self, rows: &[FeatureRow]) -> Vec<FeatureRow> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn mean(&self) -> &FeatureRow {
        &self.mean
    }

    pub fn scale(&self) -> &FeatureRow {
        &self.scale
    }
}

/// Builds standardized feature matrices with a scaler fitted on first use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBuilder {
    scaler: StandardScaler,
}

impl FeatureBuilder {
    /// Fit the scaler on `records` and return the builder with the scaled matrix
    pub fn fit(records: &[Transaction]) -> (Self, Vec<FeatureRow>) {
        let raw: Vec<FeatureRow> = records.iter().map(raw_features).collect();
        let scaler = StandardScaler::fit(&raw);
        let scaled = scaler.transform(&raw);
        (Self { scaler }, scaled)
    }

    /// Scale `records` with the already-fitted scaler
    pub fn build(&self, records: &[Transaction]) -> Vec<FeatureRow> {
        records
            .iter()
            .map(|tx| self.scaler.transform_row(&raw_features(tx)))
            .collect()
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }
}
