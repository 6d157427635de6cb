//! Oracle response types
//!
//! These types are backend-agnostic and used across all oracle
//! implementations. They are the validated, strict-schema form of the
//! loosely-typed JSON the models return; `parsing` is the only place raw
//! responses are deserialized.

use serde::{Deserialize, Serialize};

use crate::models::PatternType;

/// Result of merchant classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantAnalysis {
    /// Canonical merchant name (e.g. "Netflix" from "NETFLIX.COM*1234")
    pub normalized_name: String,
    /// Main category (e.g. "Entertainment", "Food & Dining")
    pub category: String,
    /// Specific subcategory (e.g. "Streaming Service"), when the oracle
    /// reports one
    pub sub_category: Option<String>,
    /// Classification confidence, 0.0-1.0
    pub confidence: f64,
    /// Free-form flags (e.g. "subscription", "digital_service")
    pub flags: Vec<String>,
}

impl MerchantAnalysis {
    /// Whether the oracle flagged this merchant as subscription-like
    pub fn is_subscription(&self) -> bool {
        self.flags
            .iter()
            .any(|f| f.eq_ignore_ascii_case("subscription") || f.eq_ignore_ascii_case("recurring"))
    }
}

/// Qualitative verdict on a merchant's transaction history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternAssessment {
    pub pattern_type: PatternType,
    /// Human-readable explanation of the detected pattern
    pub description: String,
    /// Oracle-reported confidence, 0.0-1.0
    pub confidence: f64,
}
