//! Domain models for Cadence
//!
//! Data structures shared across the database layer, the detection engine,
//! and the API surface.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A raw transaction submitted for analysis (not yet persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub description: String,
    /// Negative = expense, positive = income/credit
    pub amount: f64,
    pub date: NaiveDate,
}

/// A persisted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// Merchant this transaction was attributed to
    pub merchant_id: Option<i64>,
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    /// Resolution confidence from the rule table or the oracle
    pub confidence: Option<f64>,
    pub is_subscription: bool,
    /// Free-form classification flags (e.g. "digital_service")
    pub flags: Vec<String>,
    /// Hash for deduplication across repeated batch submissions
    pub import_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A canonical merchant record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: i64,
    /// The raw description this merchant was first created from
    pub original_name: String,
    pub normalized_name: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub confidence: f64,
    pub flags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A merchant to be created (before DB insertion)
#[derive(Debug, Clone, Deserialize)]
pub struct NewMerchant {
    pub original_name: String,
    pub normalized_name: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// A regex-based merchant override rule
///
/// Rules are consumed in priority-descending order; the first rule whose
/// pattern matches a transaction description wins, short-circuiting the
/// oracle entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantRule {
    pub id: i64,
    /// Regex source, matched case-insensitively against the description
    pub pattern: String,
    pub normalized_name: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub confidence: f64,
    pub priority: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Detected recurrence cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
    /// Mean interval fell outside every known cadence band
    Irregular,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::Irregular => "irregular",
        }
    }

    /// Parse from a stored TEXT column value
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "yearly" => Some(Self::Yearly),
            "irregular" => Some(Self::Irregular),
            _ => None,
        }
    }
}

/// Qualitative pattern classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Fixed-amount recurring charge
    Subscription,
    /// Variable-amount recurring charge
    Recurring,
    /// Repeats, but without a stable cadence
    Periodic,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Recurring => "recurring",
            Self::Periodic => "periodic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "subscription" => Some(Self::Subscription),
            "recurring" => Some(Self::Recurring),
            "periodic" => Some(Self::Periodic),
            _ => None,
        }
    }
}

/// A detected recurring-spend pattern
///
/// Patterns are append-only: every analysis run inserts fresh rows and never
/// merges with previously stored patterns for the same merchant. Cleanup of
/// stale rows is an external retention concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: i64,
    pub pattern_type: PatternType,
    pub merchant_id: i64,
    /// Representative amount: the exact charge for fixed-amount patterns,
    /// the mean of absolute amounts otherwise (2 decimals)
    pub amount: f64,
    pub frequency: Frequency,
    pub confidence: f64,
    pub next_expected_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A pattern produced by the analyzer (before DB insertion)
#[derive(Debug, Clone, Serialize)]
pub struct NewPattern {
    pub pattern_type: PatternType,
    pub merchant_id: i64,
    pub amount: f64,
    pub frequency: Frequency,
    pub confidence: f64,
    pub next_expected_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub transaction_count: usize,
    pub average_interval: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_round_trip() {
        for freq in [
            Frequency::Weekly,
            Frequency::Biweekly,
            Frequency::Monthly,
            Frequency::Quarterly,
            Frequency::Yearly,
            Frequency::Irregular,
        ] {
            assert_eq!(Frequency::parse(freq.as_str()), Some(freq));
        }
        assert_eq!(Frequency::parse("fortnightly"), None);
    }

    #[test]
    fn test_pattern_type_parse_case_insensitive() {
        assert_eq!(
            PatternType::parse("SUBSCRIPTION"),
            Some(PatternType::Subscription)
        );
        assert_eq!(PatternType::parse("Recurring"), Some(PatternType::Recurring));
        assert_eq!(PatternType::parse("one-off"), None);
    }
}
