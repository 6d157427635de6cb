//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `merchants` - Canonical merchant records
//! - `transactions` - Transaction persistence and dedup
//! - `rules` - Merchant override rules (regex, priority-ordered)
//! - `patterns` - Detected pattern storage and cache invalidation
//! - `analysis_cache` - TTL'd key-value cache for memoized lookups

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::Result;

mod analysis_cache;
mod merchants;
mod patterns;
mod rules;
mod transactions;

pub use analysis_cache::{keys, ttl};
pub use merchants::MerchantSearch;
pub use rules::NewMerchantRule;
pub use transactions::{
    import_hash, TransactionFilter, TransactionInsert, TransactionInsertResult,
};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a JSON TEXT column into a string list, tolerating NULL/garbage
pub(crate) fn parse_flags(s: Option<String>) -> Vec<String> {
    s.and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool, running migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database for testing
    ///
    /// Uses a temporary file rather than `:memory:` because every pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/cadence_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Performance pragmas for local storage
            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;

            -- Cache size: ~8MB (2000 pages * 4KB default page size)
            PRAGMA cache_size = 2000;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            -- Store temp tables in memory (faster for complex queries)
            PRAGMA temp_store = MEMORY;

            -- Merchants (canonical merchant records)
            CREATE TABLE IF NOT EXISTS merchants (
                id INTEGER PRIMARY KEY,
                original_name TEXT NOT NULL,
                normalized_name TEXT NOT NULL,
                category TEXT NOT NULL,
                sub_category TEXT,
                confidence REAL NOT NULL DEFAULT 0.8,
                flags TEXT,                                -- JSON array of strings
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(normalized_name)
            );

            CREATE INDEX IF NOT EXISTS idx_merchants_category ON merchants(category);
            CREATE INDEX IF NOT EXISTS idx_merchants_active ON merchants(is_active);

            -- Transactions
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                merchant_id INTEGER REFERENCES merchants(id),
                description TEXT NOT NULL,
                amount REAL NOT NULL,
                date DATE NOT NULL,
                category TEXT,
                sub_category TEXT,
                confidence REAL,
                is_subscription BOOLEAN NOT NULL DEFAULT FALSE,
                flags TEXT,                                -- JSON array of strings
                import_hash TEXT UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
            CREATE INDEX IF NOT EXISTS idx_transactions_merchant ON transactions(merchant_id);

            -- Merchant override rules (first match by priority wins)
            CREATE TABLE IF NOT EXISTS merchant_rules (
                id INTEGER PRIMARY KEY,
                pattern TEXT NOT NULL,                     -- regex source
                normalized_name TEXT NOT NULL,
                category TEXT NOT NULL,
                sub_category TEXT,
                confidence REAL NOT NULL DEFAULT 1.0,
                priority INTEGER NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_merchant_rules_priority ON merchant_rules(priority DESC);
            CREATE INDEX IF NOT EXISTS idx_merchant_rules_active ON merchant_rules(is_active);

            -- Patterns (detected recurring charges, append-only)
            CREATE TABLE IF NOT EXISTS patterns (
                id INTEGER PRIMARY KEY,
                pattern_type TEXT NOT NULL,                -- subscription, recurring, periodic
                merchant_id INTEGER NOT NULL REFERENCES merchants(id),
                amount REAL NOT NULL,
                frequency TEXT NOT NULL,                   -- weekly..yearly, irregular
                confidence REAL NOT NULL,
                next_expected_date DATE,
                description TEXT,
                transaction_count INTEGER,
                average_interval REAL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_patterns_merchant ON patterns(merchant_id);
            CREATE INDEX IF NOT EXISTS idx_patterns_confidence ON patterns(confidence DESC);

            -- Analysis cache (memoized lookups with TTL)
            CREATE TABLE IF NOT EXISTS analysis_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,                       -- JSON payload
                expires_at DATETIME NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_analysis_cache_expires ON analysis_cache(expires_at);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
