//! Merchant override rule commands

use anyhow::Result;
use cadence_core::db::{Database, NewMerchantRule};
use cadence_core::resolve::test_rules_against;

pub fn cmd_rules_list(db: &Database) -> Result<()> {
    let rules = db.list_all_merchant_rules()?;

    if rules.is_empty() {
        println!("No rules defined. Add one with 'cadence rules add'.");
        return Ok(());
    }

    println!(
        "{:<6} {:>8} {:<24} {:<20} {}",
        "ID", "PRIORITY", "MERCHANT", "CATEGORY", "PATTERN"
    );
    for rule in &rules {
        let marker = if rule.is_active { "" } else { " (inactive)" };
        println!(
            "{:<6} {:>8} {:<24} {:<20} {}{}",
            rule.id, rule.priority, rule.normalized_name, rule.category, rule.pattern, marker
        );
    }

    Ok(())
}

pub fn cmd_rules_add(
    db: &Database,
    pattern: &str,
    name: &str,
    category: &str,
    sub_category: Option<&str>,
    priority: i64,
) -> Result<()> {
    let rule = db.create_merchant_rule(&NewMerchantRule {
        pattern: pattern.to_string(),
        normalized_name: name.to_string(),
        category: category.to_string(),
        sub_category: sub_category.map(|s| s.to_string()),
        confidence: 1.0,
        priority,
    })?;

    println!(
        "✅ Rule {} created: /{}/i -> {} ({})",
        rule.id, rule.pattern, rule.normalized_name, rule.category
    );

    Ok(())
}

pub fn cmd_rules_delete(db: &Database, id: i64) -> Result<()> {
    db.delete_merchant_rule(id)?;
    println!("🗑️  Rule {} deleted", id);
    Ok(())
}

pub fn cmd_rules_test(db: &Database, description: &str) -> Result<()> {
    let matches = test_rules_against(db, description)?;

    if matches.is_empty() {
        println!(
            "No rules match '{}' - resolution would fall through to the oracle.",
            description
        );
        return Ok(());
    }

    println!("{} rule(s) match '{}':", matches.len(), description);
    for rule in &matches {
        println!(
            "   [{}] /{}/i -> {} ({}), priority {}",
            rule.id, rule.pattern, rule.normalized_name, rule.category, rule.priority
        );
    }
    println!();
    println!(
        "Winner: {} (highest priority, first match wins)",
        matches[0].normalized_name
    );

    Ok(())
}
