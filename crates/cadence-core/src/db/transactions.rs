//! Transaction persistence and dedup

use chrono::NaiveDate;
use rusqlite::params;
use sha2::{Digest, Sha256};

use super::{parse_datetime, parse_flags, Database};
use crate::error::Result;
use crate::models::Transaction;

/// Result of inserting a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionInsertResult {
    Inserted(i64),
    /// A transaction with the same import hash already exists
    Duplicate(i64),
}

/// Filters for transaction listing
#[derive(Debug, Default, Clone)]
pub struct TransactionFilter {
    pub merchant_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Substring match against the description (case-insensitive)
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Compute the dedup hash for a transaction
///
/// Hash over date|description|amount so the same row in a re-submitted
/// batch maps to the same persisted transaction.
pub fn import_hash(date: NaiveDate, description: &str, amount: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{:.2}", date, description, amount));
    hex::encode(hasher.finalize())
}

fn map_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let date_str: String = row.get(4)?;
    let flags: Option<String> = row.get(9)?;
    let created_at: String = row.get(11)?;
    Ok(Transaction {
        id: row.get(0)?,
        merchant_id: row.get(1)?,
        description: row.get(2)?,
        amount: row.get(3)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
        category: row.get(5)?,
        sub_category: row.get(6)?,
        confidence: row.get(7)?,
        is_subscription: row.get(8)?,
        flags: parse_flags(flags),
        import_hash: row.get(10)?,
        created_at: parse_datetime(&created_at),
    })
}

const TX_COLUMNS: &str = "id, merchant_id, description, amount, date, category, sub_category, confidence, is_subscription, flags, import_hash, created_at";

/// Fields for inserting an analyzed transaction
#[derive(Debug, Clone)]
pub struct TransactionInsert<'a> {
    pub merchant_id: Option<i64>,
    pub description: &'a str,
    pub amount: f64,
    pub date: NaiveDate,
    pub category: Option<&'a str>,
    pub sub_category: Option<&'a str>,
    pub confidence: Option<f64>,
    pub is_subscription: bool,
    pub flags: &'a [String],
}

impl Database {
    /// Insert a transaction, skipping duplicates by import hash
    pub fn insert_transaction(
        &self,
        insert: &TransactionInsert<'_>,
    ) -> Result<TransactionInsertResult> {
        let conn = self.conn()?;

        let hash = import_hash(insert.date, insert.description, insert.amount);

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM transactions WHERE import_hash = ?",
                params![hash],
                |row| row.get(0),
            )
            .ok();

        if let Some(id) = existing {
            return Ok(TransactionInsertResult::Duplicate(id));
        }

        conn.execute(
            r#"
            INSERT INTO transactions
                (merchant_id, description, amount, date, category, sub_category, confidence, is_subscription, flags, import_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                insert.merchant_id,
                insert.description,
                insert.amount,
                insert.date.to_string(),
                insert.category,
                insert.sub_category,
                insert.confidence,
                insert.is_subscription,
                serde_json::to_string(insert.flags)?,
                hash,
            ],
        )?;

        Ok(TransactionInsertResult::Inserted(conn.last_insert_rowid()))
    }

    /// Get a transaction by its dedup hash
    pub fn get_transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM transactions WHERE import_hash = ?",
                TX_COLUMNS
            ),
            params![hash],
            map_transaction,
        );

        match result {
            Ok(tx) => Ok(Some(tx)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a transaction by ID
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            &format!("SELECT {} FROM transactions WHERE id = ?", TX_COLUMNS),
            params![id],
            map_transaction,
        );

        match result {
            Ok(tx) => Ok(Some(tx)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List transactions with filters, newest first
    pub fn list_transactions(&self, filter: &TransactionFilter) -> Result<(Vec<Transaction>, i64)> {
        let conn = self.conn()?;

        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(merchant_id) = filter.merchant_id {
            conditions.push("merchant_id = ?".to_string());
            args.push(Box::new(merchant_id));
        }
        if let Some(start) = filter.start_date {
            conditions.push("date >= ?".to_string());
            args.push(Box::new(start.to_string()));
        }
        if let Some(end) = filter.end_date {
            conditions.push("date <= ?".to_string());
            args.push(Box::new(end.to_string()));
        }
        if let Some(ref search) = filter.search {
            conditions.push("LOWER(description) LIKE ?".to_string());
            args.push(Box::new(format!("%{}%", search.to_lowercase())));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let args_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM transactions {}", where_clause),
            args_refs.as_slice(),
            |row| row.get(0),
        )?;

        let limit = if filter.limit > 0 { filter.limit } else { 50 };
        let query = format!(
            "SELECT {} FROM transactions {} ORDER BY date DESC, id DESC LIMIT {} OFFSET {}",
            TX_COLUMNS,
            where_clause,
            limit,
            filter.offset.max(0)
        );

        let mut stmt = conn.prepare(&query)?;
        let transactions = stmt
            .query_map(args_refs.as_slice(), map_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((transactions, total))
    }
}
