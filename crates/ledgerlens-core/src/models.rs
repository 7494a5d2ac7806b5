//! Domain models for Ledgerlens

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Direction of money movement. Amounts are stored as magnitudes, so this is
/// the only place the sign survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Debit,
    Credit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    pub fn is_credit(&self) -> bool {
        matches!(self, Self::Credit)
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Semantic spending categories, in rule-table priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Food & Dining")]
    FoodAndDining,
    #[serde(rename = "Transportation")]
    Transportation,
    #[serde(rename = "Shopping")]
    Shopping,
    #[serde(rename = "Bills & Utilities")]
    BillsAndUtilities,
    #[serde(rename = "Entertainment")]
    Entertainment,
    #[serde(rename = "Health & Wellness")]
    HealthAndWellness,
    #[serde(rename = "Income")]
    Income,
    #[serde(rename = "Transfer")]
    Transfer,
    #[serde(rename = "Other")]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FoodAndDining => "Food & Dining",
            Self::Transportation => "Transportation",
            Self::Shopping => "Shopping",
            Self::BillsAndUtilities => "Bills & Utilities",
            Self::Entertainment => "Entertainment",
            Self::HealthAndWellness => "Health & Wellness",
            Self::Income => "Income",
            Self::Transfer => "Transfer",
            Self::Other => "Other",
        }
    }

    /// Get all categories
    pub fn all() -> &'static [Category] {
        &[
            Self::FoodAndDining,
            Self::Transportation,
            Self::Shopping,
            Self::BillsAndUtilities,
            Self::Entertainment,
            Self::HealthAndWellness,
            Self::Income,
            Self::Transfer,
            Self::Other,
        ]
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger row as it arrives from the outside world, before any cleaning.
///
/// Every field is kept as text; `None` means the cell was empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: Option<String>,
    pub description: Option<String>,
    pub amount: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
}

impl RawTransaction {
    pub fn new(date: &str, description: &str, amount: &str, tx_type: &str) -> Self {
        Self {
            date: Some(date.to_string()),
            description: Some(description.to_string()),
            amount: Some(amount.to_string()),
            tx_type: Some(tx_type.to_string()),
        }
    }
}

impl From<&Transaction> for RawTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            date: Some(tx.date.format("%Y-%m-%d").to_string()),
            description: Some(tx.description.clone()),
            amount: Some(tx.amount.to_string()),
            tx_type: Some(tx.tx_type.as_str().to_string()),
        }
    }
}

/// A canonical transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    /// Non-negative magnitude
    pub amount: f64,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Lowercase letters and single spaces only
    pub clean_description: String,
}

impl Transaction {
    pub fn is_debit(&self) -> bool {
        self.tx_type == TransactionType::Debit
    }
}

/// Anomaly annotation attached to a transaction at prediction time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAnnotation {
    pub is_anomaly: bool,
    /// Lower is more anomalous
    pub anomaly_score: f64,
}

/// A transaction with its anomaly annotation.
///
/// `anomaly` is `None` when the detector was not trained; the record then
/// passes through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    #[serde(flatten)]
    pub anomaly: Option<AnomalyAnnotation>,
}

impl ScoredTransaction {
    pub fn is_anomaly(&self) -> bool {
        self.anomaly.map(|a| a.is_anomaly).unwrap_or(false)
    }
}

/// One day of the spending forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}
