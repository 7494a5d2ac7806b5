//! Error types for Ledgerlens

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Model not trained: {0}")]
    NotTrained(String),

    #[error("Training error: {0}")]
    Training(String),
}

pub type Result<T> = std::result::Result<T, Error>;
