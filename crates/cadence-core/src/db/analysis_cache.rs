//! Analysis cache operations
//!
//! A TTL'd key-value table memoizing merchant resolutions and pattern
//! lookups. The cache is an optimization layer only: a miss always falls
//! through to the store or the oracle, and expired rows are deleted lazily
//! on read plus periodically via `cache_cleanup_expired`.

use chrono::{Duration, Utc};
use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::Database;
use crate::error::Result;

/// Cache TTL tiers, in seconds
pub mod ttl {
    /// Volatile listings (searches, full scans)
    pub const SHORT: i64 = 300;
    /// Resolutions and rule lists
    pub const MEDIUM: i64 = 3600;
    /// Per-merchant pattern lookups
    pub const LONG: i64 = 86400;
}

/// Cache key constructors, kept in one place so invalidation can't drift
/// from population.
pub mod keys {
    pub const PATTERNS_ALL: &str = "patterns:all";
    pub const RULES_ALL: &str = "merchant:rules:all";

    pub fn patterns_by_merchant(merchant_id: i64) -> String {
        format!("patterns:merchant:{}", merchant_id)
    }

    pub fn merchant_normalization(description: &str) -> String {
        format!("merchant:normalize:{}", description)
    }
}

impl Database {
    /// Get a cached value, if present and unexpired
    ///
    /// Expired entries are deleted on read.
    pub fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.conn()?;

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT value, expires_at FROM analysis_cache WHERE key = ?",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let (value, expires_at) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let expires = super::parse_datetime(&expires_at);
        if expires < Utc::now() {
            conn.execute("DELETE FROM analysis_cache WHERE key = ?", params![key])?;
            return Ok(None);
        }

        match serde_json::from_str(&value) {
            Ok(parsed) => {
                debug!(key, "Cache hit");
                Ok(Some(parsed))
            }
            Err(e) => {
                // A schema change can leave stale rows behind; treat as a miss
                debug!(key, error = %e, "Dropping undeserializable cache entry");
                conn.execute("DELETE FROM analysis_cache WHERE key = ?", params![key])?;
                Ok(None)
            }
        }
    }

    /// Store a value with a TTL in seconds
    pub fn cache_set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: i64) -> Result<()> {
        let conn = self.conn()?;

        let expires_at = (Utc::now() + Duration::seconds(ttl_seconds))
            .naive_utc()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        conn.execute(
            r#"
            INSERT INTO analysis_cache (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
            params![key, serde_json::to_string(value)?, expires_at],
        )?;

        Ok(())
    }

    /// Delete a cached value
    pub fn cache_del(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM analysis_cache WHERE key = ?", params![key])?;
        Ok(())
    }

    /// Delete all expired cache entries, returning how many were removed
    pub fn cache_cleanup_expired(&self) -> Result<usize> {
        let conn = self.conn()?;

        let now = Utc::now()
            .naive_utc()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        let removed = conn.execute(
            "DELETE FROM analysis_cache WHERE expires_at < ?",
            params![now],
        )?;

        if removed > 0 {
            debug!(removed, "Cleaned up expired cache entries");
        }

        Ok(removed)
    }
}
