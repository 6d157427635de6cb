//! Transaction batch ingestion from CSV
//!
//! Expected header: `description,amount,date`. Rows are validated
//! individually: an unparseable amount or date rejects that row with a
//! recorded reason and the batch continues.

use chrono::NaiveDate;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::NewTransaction;

/// Accepted date formats, tried in order
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// A rejected row with its reason
#[derive(Debug, Clone, serde::Serialize)]
pub struct RowError {
    /// 1-based data row number (excluding the header)
    pub row: usize,
    pub reason: String,
}

/// Result of parsing a CSV batch
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub transactions: Vec<NewTransaction>,
    pub errors: Vec<RowError>,
}

/// Parse a date trying each accepted format
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    Err(Error::Validation(format!("Unparseable date '{}'", s)))
}

/// Parse a transaction batch from CSV bytes
///
/// The reader requires a `description,amount,date` header (any column
/// order). Malformed rows are collected into `errors` and skipped; the
/// whole input is rejected only when the header itself is unusable.
pub fn parse_batch_csv(data: &[u8]) -> Result<ParsedBatch> {
    #[derive(serde::Deserialize)]
    struct Row {
        description: String,
        amount: String,
        date: String,
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);

    // Surface a bad header as a batch-level error up front
    let headers = reader.headers()?.clone();
    for required in ["description", "amount", "date"] {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(required)) {
            return Err(Error::Validation(format!(
                "CSV is missing required column '{}'",
                required
            )));
        }
    }

    let mut batch = ParsedBatch::default();

    for (index, record) in reader.deserialize::<Row>().enumerate() {
        let row_number = index + 1;

        let row = match record {
            Ok(row) => row,
            Err(e) => {
                warn!(row = row_number, error = %e, "Skipping malformed CSV row");
                batch.errors.push(RowError {
                    row: row_number,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if row.description.is_empty() {
            batch.errors.push(RowError {
                row: row_number,
                reason: "Empty description".to_string(),
            });
            continue;
        }

        let amount: f64 = match row.amount.replace(['$', ','], "").parse() {
            Ok(a) => a,
            Err(_) => {
                warn!(row = row_number, amount = %row.amount, "Skipping row with unparseable amount");
                batch.errors.push(RowError {
                    row: row_number,
                    reason: format!("Unparseable amount '{}'", row.amount),
                });
                continue;
            }
        };

        let date = match parse_date(&row.date) {
            Ok(d) => d,
            Err(e) => {
                warn!(row = row_number, date = %row.date, "Skipping row with unparseable date");
                batch.errors.push(RowError {
                    row: row_number,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        batch.transactions.push(NewTransaction {
            description: row.description,
            amount,
            date,
        });
    }

    Ok(batch)
}
