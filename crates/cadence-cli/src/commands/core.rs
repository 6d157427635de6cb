//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_oracle_test` - Probe the configured oracle
//! - `cmd_cache_cleanup` - Sweep expired cache entries
//! - `cmd_serve` - Start the web server

use std::path::Path;

use anyhow::{Context, Result};
use cadence_core::db::Database;
use cadence_core::oracle::{OracleBackend, OracleClient};

/// Open the database, running migrations if needed
pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path.to_str().context("Invalid database path")?;
    Database::new(path_str).context("Failed to open database")
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path)?;

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Analyze a batch: cadence analyze --file transactions.csv");
    println!("  2. Start the API:   cadence serve");

    Ok(())
}

pub async fn cmd_oracle_test(description: &str) -> Result<()> {
    let oracle = OracleClient::from_env().context(
        "No oracle configured. Set ORACLE_HOST (and optionally ORACLE_BACKEND, ORACLE_MODEL)",
    )?;

    println!("🔮 Oracle: {} (model: {})", oracle.host(), oracle.model());

    if !oracle.health_check().await {
        println!("⚠️  Oracle is not responding");
        return Ok(());
    }

    let analysis = oracle
        .classify_merchant(description)
        .await
        .context("Classification failed")?;

    println!();
    println!("   Description:  {}", description);
    println!("   Merchant:     {}", analysis.normalized_name);
    println!("   Category:     {}", analysis.category);
    if let Some(ref sub) = analysis.sub_category {
        println!("   Subcategory:  {}", sub);
    }
    println!("   Confidence:   {:.2}", analysis.confidence);
    if !analysis.flags.is_empty() {
        println!("   Flags:        {}", analysis.flags.join(", "));
    }

    Ok(())
}

pub fn cmd_cache_cleanup(db: &Database) -> Result<()> {
    let removed = db.cache_cleanup_expired()?;
    println!("🧹 Removed {} expired cache entries", removed);
    Ok(())
}

pub async fn cmd_serve(db_path: &Path, host: &str, port: u16) -> Result<()> {
    let db = open_db(db_path)?;

    cadence_server::serve(db, host, port, cadence_server::ServerConfig::default()).await
}
