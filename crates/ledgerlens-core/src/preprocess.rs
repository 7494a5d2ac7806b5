//! Ledger ingest and normalization
//!
//! Turns raw ledger rows into canonical [`Transaction`] records:
//! - dates parsed leniently, rows with unparseable dates dropped
//! - amounts coerced to numbers and stored as magnitudes
//! - types lowercased and trimmed, unknown types dropped
//! - descriptions projected to `clean_description`
//!
//! Rows are filtered, never repaired.

use std::io::{Read, Write};
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{RawTransaction, Transaction, TransactionType};

/// Columns every ledger must carry
pub const REQUIRED_COLUMNS: [&str; 4] = ["date", "description", "amount", "type"];

/// Counts of rows dropped by [`preprocess_with_stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessStats {
    pub input_rows: usize,
    pub kept: usize,
    pub bad_date: usize,
    pub bad_amount: usize,
    pub bad_type: usize,
}

/// Check a header row for the required columns
pub fn validate_columns<'a, I>(headers: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: Vec<&str> = headers.into_iter().map(str::trim).collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !present.contains(col))
        .map(|col| col.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema { missing })
    }
}

/// Read a ledger CSV into raw rows.
///
/// The header is checked before any row is read; extra columns are ignored.
pub fn load_csv<R: Read>(reader: R) -> Result<Vec<RawTransaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(reader);

    validate_columns(rdr.headers()?.iter())?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: RawTransaction = result?;
        rows.push(row);
    }

    info!("Loaded {} ledger rows", rows.len());
    Ok(rows)
}

/// Read and normalize a ledger CSV in one step
pub fn preprocess_csv<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let rows = load_csv(reader)?;
    Ok(preprocess(&rows))
}

/// Normalize raw rows into canonical records
pub fn preprocess(rows: &[RawTransaction]) -> Vec<Transaction> {
    preprocess_with_stats(rows).0
}

/// Normalize raw rows, also reporting how many rows were dropped and why
pub fn preprocess_with_stats(rows: &[RawTransaction]) -> (Vec<Transaction>, PreprocessStats) {
    let mut stats = PreprocessStats {
        input_rows: rows.len(),
        ..Default::default()
    };
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(date) = row.date.as_deref().and_then(parse_date) else {
            stats.bad_date += 1;
            continue;
        };
        let Some(amount) = row.amount.as_deref().and_then(parse_amount) else {
            stats.bad_amount += 1;
            continue;
        };
        let Some(tx_type) = row
            .tx_type
            .as_deref()
            .and_then(|t| t.parse::<TransactionType>().ok())
        else {
            stats.bad_type += 1;
            continue;
        };

        let description = row.description.clone().unwrap_or_default();
        let clean_description = clean_description(&description);

        records.push(Transaction {
            date,
            description,
            amount: amount.abs(),
            tx_type,
            clean_description,
        });
    }

    stats.kept = records.len();
    if stats.kept < stats.input_rows {
        debug!(
            "Dropped {} rows (date: {}, amount: {}, type: {})",
            stats.input_rows - stats.kept,
            stats.bad_date,
            stats.bad_amount,
            stats.bad_type
        );
    }

    (records, stats)
}

/// Write canonical records as CSV
pub fn write_csv<W: Write>(records: &[Transaction], writer: W) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn non_alpha() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z\s]").expect("static regex"))
}

/// Lowercase, strip everything but letters, collapse whitespace.
///
/// `"UBER *TRIP 12345"` becomes `"uber trip"`.
pub fn clean_description(text: &str) -> String {
    let lowered = text.to_lowercase();
    let letters = non_alpha().replace_all(&lowered, " ");
    letters.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a date string in various common formats.
///
/// Date-times are accepted and truncated to their calendar date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
        "%m-%d-%Y", // 01-15-2024
        "%d/%m/%Y", // 15/01/2024 (European)
        "%Y/%m/%d", // 2024/01/15
        "%d-%b-%Y", // 15-Jan-2024
        "%d %b %Y", // 15 Jan 2024
        "%b %d, %Y", // Jan 15, 2024
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    let datetime_formats = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    for fmt in datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// Parse an amount string, handling currency symbols and commas.
///
/// Accounting-style parentheses are read as negative; the caller takes the
/// magnitude anyway.
pub fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', '₹', '€', '£', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_description() {
        assert_eq!(clean_description("UBER *TRIP 12345"), "uber trip");
        assert_eq!(clean_description("  Starbucks   Coffee#42 "), "starbucks coffee");
        assert_eq!(clean_description("H&M Store"), "h m store");
        assert_eq!(clean_description("12345"), "");
        assert_eq!(clean_description(""), "");
    }

    #[test]
    fn test_clean_description_only_letters_and_single_spaces() {
        let samples = [
            "AMZN Mktp US*2K3 \t\nSeattle",
            "Café — Paris!!",
            "UPI/ 9876@okaxis / PAID TO ravi",
            "\u{00a0}netflix\u{2003}",
        ];
        for sample in samples {
            let clean = clean_description(sample);
            assert!(clean.chars().all(|c| c.is_ascii_lowercase() || c == ' '));
            assert!(!clean.contains("  "));
            assert_eq!(clean, clean.trim());
        }
    }

    #[test]
    fn test_parse_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date("2024-01-15"), Some(expected));
        assert_eq!(parse_date("01/15/2024"), Some(expected));
        assert_eq!(parse_date("15/01/2024"), Some(expected));
        assert_eq!(parse_date("15-Jan-2024"), Some(expected));
        assert_eq!(parse_date("2024-01-15 13:45:00"), Some(expected));
        assert_eq!(parse_date("2024-01-15T08:00:00+05:30"), Some(expected));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("-123.45"), Some(-123.45));
        assert_eq!(parse_amount("(100.00)"), Some(-100.00));
        assert_eq!(parse_amount("₹ 50,000"), Some(50000.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("NaN"), None);
    }

    #[test]
    fn test_preprocess_normalizes_fields() {
        let rows = vec![
            RawTransaction::new("2024-01-10", "STARBUCKS #123", "-250.50", " DEBIT "),
            RawTransaction::new("01/11/2024", "Salary Credit", "50000", "Credit"),
        ];

        let records = preprocess(&rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, 250.50);
        assert_eq!(records[0].tx_type, TransactionType::Debit);
        assert_eq!(records[0].clean_description, "starbucks");
        assert_eq!(records[1].tx_type, TransactionType::Credit);
        assert_eq!(
            records[1].date,
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );
    }

    #[test]
    fn test_preprocess_drops_unparseable_rows() {
        let rows = vec![
            RawTransaction::new("yesterday", "coffee", "10", "debit"),
            RawTransaction::new("2024-01-10", "coffee", "ten", "debit"),
            RawTransaction::new("2024-01-10", "coffee", "10", "refund"),
            RawTransaction::new("2024-01-10", "coffee", "10", "debit"),
        ];

        let (records, stats) = preprocess_with_stats(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(stats.bad_date, 1);
        assert_eq!(stats.bad_amount, 1);
        assert_eq!(stats.bad_type, 1);
        assert_eq!(stats.kept, 1);
    }

    #[test]
    fn test_missing_description_maps_to_empty() {
        let rows = vec![RawTransaction {
            description: None,
            ..RawTransaction::new("2024-01-10", "", "10", "debit")
        }];

        let records = preprocess(&rows);
        assert_eq!(records[0].description, "");
        assert_eq!(records[0].clean_description, "");
    }

    #[test]
    fn test_preprocess_does_not_mutate_input() {
        let rows = vec![RawTransaction::new("2024-01-10", "UBER *TRIP", "-99", "DEBIT")];
        let before = rows.clone();
        let _ = preprocess(&rows);
        assert_eq!(rows, before);
    }

    #[test]
    fn test_preprocess_is_idempotent() {
        let rows = vec![
            RawTransaction::new("01/15/2024", "UBER *TRIP 12345", "(120.75)", "Debit "),
            RawTransaction::new("2024-01-16 09:30:00", "Refund — Amazon", "499", "CREDIT"),
            RawTransaction::new("bad", "ignored", "1", "debit"),
        ];

        let once = preprocess(&rows);
        let raw_again: Vec<RawTransaction> = once.iter().map(RawTransaction::from).collect();
        let twice = preprocess(&raw_again);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_load_csv_missing_columns() {
        let csv = "date,description,value\n2024-01-01,coffee,10\n";
        match load_csv(csv.as_bytes()) {
            Err(Error::Schema { missing }) => {
                assert_eq!(missing, vec!["amount".to_string(), "type".to_string()]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_csv_with_extra_columns_and_blanks() {
        let csv = "date, description ,amount,type,balance\n\
                   2024-01-01,Coffee,10,debit,990\n\
                   2024-01-02,,5,debit,985\n";

        let rows = load_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description.as_deref(), Some("Coffee"));
        assert_eq!(rows[1].description, None);

        let records = preprocess(&rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].clean_description, "");
    }

    #[test]
    fn test_write_csv_round_trip() {
        let records =
            preprocess(&[RawTransaction::new("2024-03-01", "Metro Card", "40", "debit")]);

        let mut buf = Vec::new();
        write_csv(&records, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("date,description,amount,type,clean_description"));

        let reloaded = preprocess_csv(text.as_bytes()).unwrap();
        assert_eq!(reloaded, records);
    }
}
