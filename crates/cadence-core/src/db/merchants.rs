//! Merchant operations

use rusqlite::params;

use super::{parse_datetime, parse_flags, Database};
use crate::error::{Error, Result};
use crate::models::{Merchant, NewMerchant};

/// Search filters for merchant listing
#[derive(Debug, Default, Clone)]
pub struct MerchantSearch {
    /// Substring match against category or sub_category (case-insensitive)
    pub category: Option<String>,
    /// Substring match against original or normalized name (case-insensitive)
    pub query: Option<String>,
    pub is_active: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

fn map_merchant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Merchant> {
    let flags: Option<String> = row.get(6)?;
    let created_at: String = row.get(8)?;
    Ok(Merchant {
        id: row.get(0)?,
        original_name: row.get(1)?,
        normalized_name: row.get(2)?,
        category: row.get(3)?,
        sub_category: row.get(4)?,
        confidence: row.get(5)?,
        flags: parse_flags(flags),
        is_active: row.get(7)?,
        created_at: parse_datetime(&created_at),
    })
}

const MERCHANT_COLUMNS: &str = "id, original_name, normalized_name, category, sub_category, confidence, flags, is_active, created_at";

impl Database {
    /// Create a merchant record
    ///
    /// Fails with `InvalidData` if a merchant with the same original or
    /// normalized name already exists.
    pub fn create_merchant(&self, merchant: &NewMerchant) -> Result<Merchant> {
        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM merchants WHERE original_name = ? OR normalized_name = ?",
                params![merchant.original_name, merchant.normalized_name],
                |row| row.get(0),
            )
            .ok();

        if existing.is_some() {
            return Err(Error::InvalidData(format!(
                "Merchant already exists: {}",
                merchant.normalized_name
            )));
        }

        conn.execute(
            r#"
            INSERT INTO merchants (original_name, normalized_name, category, sub_category, confidence, flags, is_active)
            VALUES (?, ?, ?, ?, ?, ?, TRUE)
            "#,
            params![
                merchant.original_name,
                merchant.normalized_name,
                merchant.category,
                merchant.sub_category,
                merchant.confidence,
                serde_json::to_string(&merchant.flags)?,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.get_merchant(id)?
            .ok_or_else(|| Error::NotFound(format!("Merchant {} after insert", id)))
    }

    /// Get a merchant by ID
    pub fn get_merchant(&self, id: i64) -> Result<Option<Merchant>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            &format!("SELECT {} FROM merchants WHERE id = ?", MERCHANT_COLUMNS),
            params![id],
            map_merchant,
        );

        match result {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Find a merchant by its normalized name (exact match)
    pub fn find_merchant_by_normalized_name(&self, name: &str) -> Result<Option<Merchant>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM merchants WHERE normalized_name = ?",
                MERCHANT_COLUMNS
            ),
            params![name],
            map_merchant,
        );

        match result {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Find a merchant by normalized name, creating it if missing
    pub fn find_or_create_merchant(&self, merchant: &NewMerchant) -> Result<Merchant> {
        if let Some(existing) = self.find_merchant_by_normalized_name(&merchant.normalized_name)? {
            return Ok(existing);
        }
        self.create_merchant(merchant)
    }

    /// Search merchants with optional filters, newest and most confident first
    pub fn search_merchants(&self, search: &MerchantSearch) -> Result<(Vec<Merchant>, i64)> {
        let conn = self.conn()?;

        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref category) = search.category {
            conditions.push(
                "(LOWER(category) LIKE ? OR LOWER(COALESCE(sub_category, '')) LIKE ?)".to_string(),
            );
            let like = format!("%{}%", category.to_lowercase());
            args.push(Box::new(like.clone()));
            args.push(Box::new(like));
        }
        if let Some(ref query) = search.query {
            conditions
                .push("(LOWER(original_name) LIKE ? OR LOWER(normalized_name) LIKE ?)".to_string());
            let like = format!("%{}%", query.to_lowercase());
            args.push(Box::new(like.clone()));
            args.push(Box::new(like));
        }
        if let Some(active) = search.is_active {
            conditions.push("is_active = ?".to_string());
            args.push(Box::new(active));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let args_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM merchants {}", where_clause),
            args_refs.as_slice(),
            |row| row.get(0),
        )?;

        let limit = if search.limit > 0 { search.limit } else { 10 };
        let query = format!(
            "SELECT {} FROM merchants {} ORDER BY confidence DESC, created_at DESC LIMIT {} OFFSET {}",
            MERCHANT_COLUMNS,
            where_clause,
            limit,
            search.offset.max(0)
        );

        let mut stmt = conn.prepare(&query)?;
        let merchants = stmt
            .query_map(args_refs.as_slice(), map_merchant)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((merchants, total))
    }

    /// Deactivate a merchant (soft delete) and drop its cached normalization
    pub fn deactivate_merchant(&self, id: i64) -> Result<()> {
        let merchant = self
            .get_merchant(id)?
            .ok_or_else(|| Error::NotFound(format!("Merchant {}", id)))?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE merchants SET is_active = FALSE WHERE id = ?",
            params![id],
        )?;
        drop(conn);

        self.cache_del(&super::keys::merchant_normalization(
            &merchant.original_name,
        ))?;

        Ok(())
    }

    /// Count transactions attributed to a merchant
    pub fn count_merchant_transactions(&self, merchant_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE merchant_id = ?",
            params![merchant_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
