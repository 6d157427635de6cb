//! Merchant override rule operations

use rusqlite::params;

use super::{keys, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::MerchantRule;

/// A rule to be created (before DB insertion)
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewMerchantRule {
    pub pattern: String,
    pub normalized_name: String,
    pub category: String,
    pub sub_category: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub priority: i64,
}

fn default_confidence() -> f64 {
    1.0
}

fn map_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<MerchantRule> {
    let created_at: String = row.get(8)?;
    Ok(MerchantRule {
        id: row.get(0)?,
        pattern: row.get(1)?,
        normalized_name: row.get(2)?,
        category: row.get(3)?,
        sub_category: row.get(4)?,
        confidence: row.get(5)?,
        priority: row.get(6)?,
        is_active: row.get(7)?,
        created_at: parse_datetime(&created_at),
    })
}

const RULE_COLUMNS: &str = "id, pattern, normalized_name, category, sub_category, confidence, priority, is_active, created_at";

impl Database {
    /// Create an override rule and invalidate the cached rule list
    ///
    /// The pattern is validated eagerly so an unparseable regex is rejected
    /// at creation time rather than silently skipped at scan time.
    pub fn create_merchant_rule(&self, rule: &NewMerchantRule) -> Result<MerchantRule> {
        regex::RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Rule(format!("Invalid pattern '{}': {}", rule.pattern, e)))?;

        if !(0.0..=1.0).contains(&rule.confidence) {
            return Err(Error::Rule(format!(
                "Rule confidence must be in [0, 1], got {}",
                rule.confidence
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO merchant_rules (pattern, normalized_name, category, sub_category, confidence, priority, is_active)
            VALUES (?, ?, ?, ?, ?, ?, TRUE)
            "#,
            params![
                rule.pattern,
                rule.normalized_name,
                rule.category,
                rule.sub_category,
                rule.confidence,
                rule.priority,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.cache_del(keys::RULES_ALL)?;

        self.get_merchant_rule(id)?
            .ok_or_else(|| Error::NotFound(format!("Rule {} after insert", id)))
    }

    /// Get a rule by ID
    pub fn get_merchant_rule(&self, id: i64) -> Result<Option<MerchantRule>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            &format!("SELECT {} FROM merchant_rules WHERE id = ?", RULE_COLUMNS),
            params![id],
            map_rule,
        );

        match result {
            Ok(rule) => Ok(Some(rule)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List active rules in priority-descending order (scan order)
    pub fn list_merchant_rules(&self) -> Result<Vec<MerchantRule>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM merchant_rules WHERE is_active = TRUE ORDER BY priority DESC, id ASC",
            RULE_COLUMNS
        ))?;

        let rules = stmt
            .query_map([], map_rule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rules)
    }

    /// List all rules including inactive ones (for management UIs)
    pub fn list_all_merchant_rules(&self) -> Result<Vec<MerchantRule>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM merchant_rules ORDER BY priority DESC, id ASC",
            RULE_COLUMNS
        ))?;

        let rules = stmt
            .query_map([], map_rule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rules)
    }

    /// Delete a rule and invalidate the cached rule list
    pub fn delete_merchant_rule(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM merchant_rules WHERE id = ?", params![id])?;
        drop(conn);

        if deleted == 0 {
            return Err(Error::NotFound(format!("Rule {}", id)));
        }

        self.cache_del(keys::RULES_ALL)?;
        Ok(())
    }

    /// Enable or disable a rule without deleting it
    pub fn set_merchant_rule_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE merchant_rules SET is_active = ? WHERE id = ?",
            params![active, id],
        )?;
        drop(conn);

        if updated == 0 {
            return Err(Error::NotFound(format!("Rule {}", id)));
        }

        self.cache_del(keys::RULES_ALL)?;
        Ok(())
    }
}
