//! Spending aggregates for insight renderers
//!
//! Plain numbers only. Turning them into sentences is left to the caller.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{Category, ScoredTransaction, Transaction};

/// Debit spend in one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpend {
    pub category: Category,
    pub amount: f64,
    /// Fraction of total debit spend, 0 to 1
    pub share: f64,
}

/// Flagged debits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub count: usize,
    pub largest_amount: Option<f64>,
}

/// Aggregate view of a ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpendingSummary {
    pub debit_count: usize,
    pub total_spent: f64,
    /// Mean spend over days that had at least one debit
    pub average_daily: f64,
    pub max_transaction: f64,
    /// Highest spend first
    pub categories: Vec<CategorySpend>,
    pub anomalies: AnomalySummary,
    /// Mean spend over calendar months that had at least one debit
    pub average_monthly: f64,
}

impl SpendingSummary {
    /// Summarize `records`.
    ///
    /// `categories` must align with `records` (extra or missing labels are
    /// ignored). `scored` supplies anomaly flags and may be empty.
    pub fn compute(
        records: &[Transaction],
        categories: &[Category],
        scored: &[ScoredTransaction],
    ) -> Self {
        let debits: Vec<(usize, &Transaction)> = records
            .iter()
            .enumerate()
            .filter(|(_, tx)| tx.is_debit())
            .collect();

        let total_spent: f64 = debits.iter().map(|(_, tx)| tx.amount).sum();
        let max_transaction = debits
            .iter()
            .map(|(_, tx)| tx.amount)
            .fold(0.0, f64::max);

        let mut by_day: HashMap<NaiveDate, f64> = HashMap::new();
        let mut by_month: HashMap<(i32, u32), f64> = HashMap::new();
        for (_, tx) in &debits {
            *by_day.entry(tx.date).or_default() += tx.amount;
            *by_month.entry((tx.date.year(), tx.date.month())).or_default() += tx.amount;
        }

        let mut by_category: BTreeMap<Category, f64> = BTreeMap::new();
        for (i, tx) in &debits {
            if let Some(category) = categories.get(*i) {
                *by_category.entry(*category).or_default() += tx.amount;
            }
        }
        let mut category_spend: Vec<CategorySpend> = by_category
            .into_iter()
            .map(|(category, amount)| CategorySpend {
                category,
                amount,
                share: if total_spent > 0.0 { amount / total_spent } else { 0.0 },
            })
            .collect();
        category_spend.sort_by(|a, b| b.amount.total_cmp(&a.amount).then(a.category.cmp(&b.category)));

        let flagged: Vec<f64> = scored
            .iter()
            .filter(|s| s.is_anomaly() && s.transaction.is_debit())
            .map(|s| s.transaction.amount)
            .collect();

        Self {
            debit_count: debits.len(),
            total_spent,
            average_daily: mean(by_day.values()),
            max_transaction,
            categories: category_spend,
            anomalies: AnomalySummary {
                count: flagged.len(),
                largest_amount: flagged.iter().copied().reduce(f64::max),
            },
            average_monthly: mean(by_month.values()),
        }
    }

    /// Highest-spend category, if any debit was categorized
    pub fn top_category(&self) -> Option<&CategorySpend> {
        self.categories.first()
    }
}

fn mean<'a>(values: impl ExactSizeIterator<Item = &'a f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}
