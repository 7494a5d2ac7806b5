//! Per-model diagnostics
//!
//! Every model exposes a [`MetricsSnapshot`] through [`ModelReport`]. Snapshots
//! always carry `is_trained` and are recomputed on each `train` call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of a `train` call.
///
/// Data scarcity is not an error: the model simply stays untrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainingStatus {
    Trained,
    InsufficientData { available: usize, required: usize },
    /// Enough data, but fitting failed; the model stays untrained
    FitFailed,
}

impl TrainingStatus {
    pub fn is_trained(&self) -> bool {
        matches!(self, Self::Trained)
    }
}

/// A single metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Count(usize),
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Count(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        Self::Count(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Metrics keyed by name, ordered for stable output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsSnapshot(BTreeMap<String, MetricValue>);

impl MetricsSnapshot {
    /// Start a snapshot with the mandatory `is_trained` entry
    pub fn new(is_trained: bool) -> Self {
        let mut snapshot = Self::default();
        snapshot.insert("is_trained", is_trained);
        snapshot
    }

    pub fn insert(&mut self, key: &str, value: impl Into<MetricValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<MetricValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetricValue::as_f64)
    }

    pub fn is_trained(&self) -> bool {
        self.get("is_trained")
            .and_then(MetricValue::as_bool)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Implemented by every trained model
pub trait ModelReport: Send + Sync {
    /// Short identifier used as the report key
    fn name(&self) -> &'static str;

    fn is_trained(&self) -> bool;

    /// Snapshot of the model's diagnostics
    fn metrics(&self) -> MetricsSnapshot;
}
