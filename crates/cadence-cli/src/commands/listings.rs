//! Listing commands: transactions, merchants, patterns

use anyhow::Result;
use cadence_core::db::{Database, MerchantSearch, TransactionFilter};

pub fn cmd_transactions_list(db: &Database, limit: i64, merchant_id: Option<i64>) -> Result<()> {
    let (transactions, total) = db.list_transactions(&TransactionFilter {
        merchant_id,
        limit,
        ..Default::default()
    })?;

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!("{:<6} {:<12} {:>12}  {}", "ID", "DATE", "AMOUNT", "DESCRIPTION");
    for tx in &transactions {
        println!(
            "{:<6} {:<12} {:>12.2}  {}",
            tx.id, tx.date, tx.amount, tx.description
        );
    }
    println!();
    println!("Showing {} of {} transactions", transactions.len(), total);

    Ok(())
}

pub fn cmd_merchants_list(
    db: &Database,
    query: Option<&str>,
    category: Option<&str>,
) -> Result<()> {
    let (merchants, total) = db.search_merchants(&MerchantSearch {
        query: query.map(|s| s.to_string()),
        category: category.map(|s| s.to_string()),
        limit: 50,
        ..Default::default()
    })?;

    if merchants.is_empty() {
        println!("No merchants found.");
        return Ok(());
    }

    println!(
        "{:<6} {:<28} {:<20} {:>6}  {}",
        "ID", "MERCHANT", "CATEGORY", "CONF", "ACTIVE"
    );
    for m in &merchants {
        println!(
            "{:<6} {:<28} {:<20} {:>6.2}  {}",
            m.id,
            m.normalized_name,
            m.category,
            m.confidence,
            if m.is_active { "yes" } else { "no" }
        );
    }
    println!();
    println!("Showing {} of {} merchants", merchants.len(), total);

    Ok(())
}

pub fn cmd_patterns_list(db: &Database, merchant_id: Option<i64>) -> Result<()> {
    let patterns = match merchant_id {
        Some(id) => db.find_patterns_by_merchant(id)?,
        None => db.list_patterns()?,
    };

    if patterns.is_empty() {
        println!("No patterns detected yet. Run 'cadence analyze --file batch.csv' first.");
        return Ok(());
    }

    println!(
        "{:<6} {:<10} {:<12} {:>10} {:>6}  {:<12} {}",
        "ID", "MERCHANT", "TYPE", "AMOUNT", "CONF", "FREQUENCY", "NEXT EXPECTED"
    );
    for p in &patterns {
        let next = p
            .next_expected_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<10} {:<12} {:>10.2} {:>6.2}  {:<12} {}",
            p.id,
            p.merchant_id,
            p.pattern_type.as_str(),
            p.amount,
            p.confidence,
            p.frequency.as_str(),
            next
        );
    }

    Ok(())
}

pub fn cmd_patterns_prune(db: &Database, days: i64, yes: bool) -> Result<()> {
    if !yes {
        println!(
            "This deletes all patterns older than {} days. Re-run with --yes to confirm.",
            days
        );
        return Ok(());
    }

    let removed = db.prune_patterns_older_than(days)?;
    println!("🧹 Removed {} pattern(s) older than {} days", removed, days);

    Ok(())
}
