//! Batch analysis command: CSV -> ingest -> detect

use std::path::Path;

use anyhow::{Context, Result};
use cadence_core::detect::{ingest_batch, PatternDetector};
use cadence_core::events::NullSink;
use cadence_core::ingest::parse_batch_csv;
use cadence_core::oracle::OracleClient;

use super::open_db;

pub async fn cmd_analyze(db_path: &Path, file: &Path, no_detect: bool) -> Result<()> {
    println!("📥 Analyzing {}...", file.display());

    let db = open_db(db_path)?;

    let oracle = OracleClient::from_env();
    match oracle {
        Some(ref client) => {
            use cadence_core::oracle::OracleBackend;
            println!(
                "   🔮 Oracle enabled: {} (model: {})",
                client.host(),
                client.model()
            );
        }
        None => {
            println!("   💡 Tip: Set ORACLE_HOST to classify unknown merchants");
        }
    }

    let data = std::fs::read(file).context("Failed to read CSV file")?;
    let parsed = parse_batch_csv(&data)?;

    if !parsed.errors.is_empty() {
        println!("   ⚠️  {} row(s) rejected:", parsed.errors.len());
        for err in &parsed.errors {
            println!("      row {}: {}", err.row, err.reason);
        }
    }

    if parsed.transactions.is_empty() {
        anyhow::bail!("No valid transactions in {}", file.display());
    }

    let ingested = ingest_batch(&db, oracle.as_ref(), &NullSink, &parsed.transactions)
        .await
        .context("Ingestion failed")?;

    println!();
    println!("📊 Ingestion");
    println!("   ─────────────────────────────");
    println!("   Inserted:          {}", ingested.inserted);
    println!("   Duplicates:        {}", ingested.duplicates);
    println!("   Unresolvable:      {}", ingested.skipped);
    println!("   Merchants created: {}", ingested.merchants_created);

    if no_detect {
        println!();
        println!("⏭️  Skipping pattern detection (--no-detect)");
        return Ok(());
    }

    let detector = PatternDetector::with_oracle_option(&db, oracle.as_ref());
    let results = detector
        .detect_and_store(&parsed.transactions)
        .await
        .context("Pattern detection failed")?;

    println!();
    println!("📊 Detected Patterns");
    println!("   ─────────────────────────────");

    if results.patterns.is_empty() {
        println!("   (none - groups need at least 2 transactions)");
    }

    for pattern in &results.patterns {
        let merchant = db
            .get_merchant(pattern.merchant_id)?
            .map(|m| m.normalized_name)
            .unwrap_or_else(|| format!("merchant {}", pattern.merchant_id));
        let next = pattern
            .next_expected_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "   {} ${:.2} {} ({}) confidence {:.2}, next expected {}",
            merchant,
            pattern.amount,
            pattern.frequency.as_str(),
            pattern.pattern_type.as_str(),
            pattern.confidence,
            next
        );
    }

    if results.groups_skipped + results.groups_failed + results.transactions_dropped > 0 {
        println!();
        println!(
            "   ({} group(s) below evidence threshold, {} failed, {} transaction(s) dropped)",
            results.groups_skipped, results.groups_failed, results.transactions_dropped
        );
    }

    Ok(())
}
