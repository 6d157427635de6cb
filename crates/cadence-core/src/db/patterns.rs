//! Pattern storage (the store adapter for analyzer output)
//!
//! Patterns are append-only: every analysis run inserts new rows. The
//! per-merchant pattern listing is read-through cached; `create_pattern`
//! commits the row first and only then invalidates the dependent cache
//! entries, so a stale cache can never outlive a failed write.

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::params;

use super::{keys, parse_datetime, ttl, Database};
use crate::error::{Error, Result};
use crate::models::{Frequency, NewPattern, Pattern, PatternType};

fn map_pattern(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pattern> {
    let type_str: String = row.get(1)?;
    let freq_str: String = row.get(5)?;
    let next_str: Option<String> = row.get(7)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Pattern {
        id: row.get(0)?,
        pattern_type: PatternType::parse(&type_str).unwrap_or(PatternType::Periodic),
        merchant_id: row.get(2)?,
        amount: row.get(3)?,
        confidence: row.get(4)?,
        frequency: Frequency::parse(&freq_str).unwrap_or(Frequency::Irregular),
        next_expected_date: next_str.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        description: row.get(8)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

const PATTERN_COLUMNS: &str = "id, pattern_type, merchant_id, amount, confidence, frequency, transaction_count, next_expected_date, description, created_at, updated_at";

impl Database {
    /// Persist a detected pattern and invalidate dependent cache entries
    ///
    /// The insert runs in its own transaction; cache invalidation happens
    /// strictly after commit. Sibling patterns in a batch each get their own
    /// transaction boundary so one failed write does not roll back the rest.
    pub fn create_pattern(&self, pattern: &NewPattern) -> Result<Pattern> {
        if !(0.0..=1.0).contains(&pattern.confidence) {
            return Err(Error::InvalidData(format!(
                "Pattern confidence must be in [0, 1], got {}",
                pattern.confidence
            )));
        }

        let merchant = self
            .get_merchant(pattern.merchant_id)?
            .ok_or_else(|| Error::NotFound(format!("Merchant {}", pattern.merchant_id)))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO patterns
                (pattern_type, merchant_id, amount, frequency, confidence, next_expected_date, description, transaction_count, average_interval)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                pattern.pattern_type.as_str(),
                pattern.merchant_id,
                pattern.amount,
                pattern.frequency.as_str(),
                pattern.confidence,
                pattern.next_expected_date.map(|d| d.to_string()),
                pattern.description,
                pattern.transaction_count as i64,
                pattern.average_interval,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        drop(conn);

        // Committed; now drop cached listings that include this merchant
        self.cache_del(&keys::patterns_by_merchant(merchant.id))?;
        self.cache_del(keys::PATTERNS_ALL)?;

        self.get_pattern(id)?
            .ok_or_else(|| Error::NotFound(format!("Pattern {} after insert", id)))
    }

    /// Get a pattern by ID
    pub fn get_pattern(&self, id: i64) -> Result<Option<Pattern>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            &format!("SELECT {} FROM patterns WHERE id = ?", PATTERN_COLUMNS),
            params![id],
            map_pattern,
        );

        match result {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List patterns for one merchant, most confident first (read-through cached)
    pub fn find_patterns_by_merchant(&self, merchant_id: i64) -> Result<Vec<Pattern>> {
        let cache_key = keys::patterns_by_merchant(merchant_id);
        if let Some(cached) = self.cache_get::<Vec<Pattern>>(&cache_key)? {
            return Ok(cached);
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patterns WHERE merchant_id = ? ORDER BY confidence DESC",
            PATTERN_COLUMNS
        ))?;

        let patterns = stmt
            .query_map(params![merchant_id], map_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        self.cache_set(&cache_key, &patterns, ttl::LONG)?;

        Ok(patterns)
    }

    /// List all patterns, most confident and newest first (read-through cached)
    pub fn list_patterns(&self) -> Result<Vec<Pattern>> {
        if let Some(cached) = self.cache_get::<Vec<Pattern>>(keys::PATTERNS_ALL)? {
            return Ok(cached);
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patterns ORDER BY confidence DESC, created_at DESC",
            PATTERN_COLUMNS
        ))?;

        let patterns = stmt
            .query_map([], map_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        self.cache_set(keys::PATTERNS_ALL, &patterns, ttl::LONG)?;

        Ok(patterns)
    }

    /// Delete patterns older than the given number of days (retention sweep)
    ///
    /// Returns how many rows were removed. Invalidates the affected
    /// merchants' cached listings.
    pub fn prune_patterns_older_than(&self, days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(days))
            .naive_utc()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        let conn = self.conn()?;

        let mut stmt =
            conn.prepare("SELECT DISTINCT merchant_id FROM patterns WHERE created_at < ?")?;
        let merchant_ids: Vec<i64> = stmt
            .query_map(params![cutoff], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);

        let removed = conn.execute("DELETE FROM patterns WHERE created_at < ?", params![cutoff])?;
        drop(conn);

        for merchant_id in merchant_ids {
            self.cache_del(&keys::patterns_by_merchant(merchant_id))?;
        }
        self.cache_del(keys::PATTERNS_ALL)?;

        Ok(removed)
    }
}
