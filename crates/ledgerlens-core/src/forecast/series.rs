//! Daily spend series

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::models::Transaction;

/// Total debit amount per calendar day, gap-free
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    start: NaiveDate,
    values: Vec<f64>,
}

impl DailySeries {
    /// Build from explicit values starting at `start`
    pub fn new(start: NaiveDate, values: Vec<f64>) -> Self {
        Self { start, values }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last observed day
    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(self.values.len().saturating_sub(1) as i64)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean of the last `min(window, len)` days
    pub fn trailing_mean(&self, window: usize) -> f64 {
        let take = window.min(self.values.len());
        if take == 0 {
            return 0.0;
        }
        self.values[self.values.len() - take..].iter().sum::<f64>() / take as f64
    }
}

/// Sum debits per day over the first-to-last debit date, filling missing days
/// with zero. Returns `None` when there are no debits.
pub fn daily_debit_series(records: &[Transaction]) -> Option<DailySeries> {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for tx in records.iter().filter(|tx| tx.is_debit()) {
        *by_day.entry(tx.date).or_default() += tx.amount;
    }

    let (&start, _) = by_day.first_key_value()?;
    let (&end, _) = by_day.last_key_value()?;

    let values = start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|d| by_day.get(&d).copied().unwrap_or(0.0))
        .collect();

    Some(DailySeries { start, values })
}
