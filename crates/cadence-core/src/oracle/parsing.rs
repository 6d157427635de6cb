//! JSON parsing helpers for oracle responses
//!
//! These functions extract JSON from model responses, which often include
//! extra text before/after the JSON payload, and validate the result against
//! a strict schema: required fields must be present and well-typed, optional
//! fields get documented defaults, and anything else is a typed error at
//! this boundary rather than loosely-shaped data in the analyzer.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::PatternType;

use super::types::{MerchantAnalysis, PatternAssessment};

/// Extract the outermost JSON object from a response
fn extract_json(response: &str) -> Result<&str> {
    let response = response.trim();

    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&response[s..=e]),
        _ => Err(Error::Oracle(format!(
            "No JSON found in oracle response | Raw: {}",
            truncate(response)
        ))),
    }
}

/// Truncate long raw responses for error messages
fn truncate(s: &str) -> String {
    if s.len() > 200 {
        format!("{}...", &s[..200])
    } else {
        s.to_string()
    }
}

/// Raw merchant analysis as the model emits it
///
/// Field names follow the prompt contract; only `merchant` and `category`
/// are required, the rest default (confidence 0.8 when unreported).
#[derive(Debug, Deserialize)]
struct RawMerchantAnalysis {
    #[serde(default)]
    merchant: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    sub_category: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    flags: Option<Vec<String>>,
}

/// Parse and validate a merchant classification response
pub fn parse_merchant_analysis(response: &str) -> Result<MerchantAnalysis> {
    let json_str = extract_json(response)?;

    let raw: RawMerchantAnalysis = serde_json::from_str(json_str).map_err(|e| {
        Error::Oracle(format!(
            "Invalid merchant analysis JSON: {} | Raw: {}",
            e,
            truncate(json_str)
        ))
    })?;

    let normalized_name = raw
        .merchant
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| Error::Oracle("Merchant analysis missing 'merchant' field".into()))?;
    let category = raw
        .category
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::Oracle("Merchant analysis missing 'category' field".into()))?;

    let confidence = raw.confidence.unwrap_or(0.8);
    if !(0.0..=1.0).contains(&confidence) {
        return Err(Error::Oracle(format!(
            "Merchant analysis confidence out of range: {}",
            confidence
        )));
    }

    Ok(MerchantAnalysis {
        normalized_name,
        category,
        sub_category: raw.sub_category.filter(|s| !s.trim().is_empty()),
        confidence,
        flags: raw.flags.unwrap_or_default(),
    })
}

/// Raw pattern assessment as the model emits it; every field is required
#[derive(Debug, Deserialize)]
struct RawPatternAssessment {
    #[serde(default, rename = "type")]
    pattern_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse and validate a pattern assessment response
pub fn parse_pattern_assessment(response: &str) -> Result<PatternAssessment> {
    let json_str = extract_json(response)?;

    let raw: RawPatternAssessment = serde_json::from_str(json_str).map_err(|e| {
        Error::Oracle(format!(
            "Invalid pattern assessment JSON: {} | Raw: {}",
            e,
            truncate(json_str)
        ))
    })?;

    let type_str = raw
        .pattern_type
        .ok_or_else(|| Error::Oracle("Pattern assessment missing 'type' field".into()))?;
    let pattern_type = PatternType::parse(&type_str)
        .ok_or_else(|| Error::Oracle(format!("Unknown pattern type: {}", type_str)))?;

    let description = raw
        .description
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| Error::Oracle("Pattern assessment missing 'description' field".into()))?;

    let confidence = raw
        .confidence
        .ok_or_else(|| Error::Oracle("Pattern assessment missing 'confidence' field".into()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(Error::Oracle(format!(
            "Pattern assessment confidence out of range: {}",
            confidence
        )));
    }

    Ok(PatternAssessment {
        pattern_type,
        description,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merchant_analysis() {
        let response = r#"{"merchant": "Netflix", "category": "Entertainment", "sub_category": "Streaming Service", "confidence": 0.95, "flags": ["subscription", "digital_service"]}"#;
        let result = parse_merchant_analysis(response).unwrap();
        assert_eq!(result.normalized_name, "Netflix");
        assert_eq!(result.category, "Entertainment");
        assert_eq!(result.sub_category.as_deref(), Some("Streaming Service"));
        assert!(result.is_subscription());
    }

    #[test]
    fn test_parse_merchant_analysis_with_surrounding_text() {
        let response = r#"Here's the classification:
{"merchant": "Amazon", "category": "Shopping"}
Done!"#;
        let result = parse_merchant_analysis(response).unwrap();
        assert_eq!(result.normalized_name, "Amazon");
        // Defaults applied for unreported fields
        assert_eq!(result.confidence, 0.8);
        assert!(result.flags.is_empty());
    }

    #[test]
    fn test_parse_merchant_analysis_missing_required_field() {
        let response = r#"{"merchant": "Netflix"}"#;
        let err = parse_merchant_analysis(response).unwrap_err();
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn test_parse_merchant_analysis_no_json() {
        let response = "I could not classify this merchant.";
        assert!(parse_merchant_analysis(response).is_err());
    }

    #[test]
    fn test_parse_merchant_analysis_rejects_bad_confidence() {
        let response = r#"{"merchant": "Netflix", "category": "Entertainment", "confidence": 1.5}"#;
        assert!(parse_merchant_analysis(response).is_err());
    }

    #[test]
    fn test_parse_pattern_assessment() {
        let response = r#"{"type": "SUBSCRIPTION", "confidence": 0.92, "description": "Fixed monthly charge of $19.99"}"#;
        let result = parse_pattern_assessment(response).unwrap();
        assert_eq!(result.pattern_type, PatternType::Subscription);
        assert!(result.confidence > 0.9);
    }

    #[test]
    fn test_parse_pattern_assessment_requires_all_fields() {
        // Missing confidence must be rejected, not defaulted
        let response = r#"{"type": "RECURRING", "description": "Variable grocery spend"}"#;
        assert!(parse_pattern_assessment(response).is_err());
    }

    #[test]
    fn test_parse_pattern_assessment_unknown_type() {
        let response = r#"{"type": "SOMETIMES", "confidence": 0.5, "description": "..."}"#;
        let err = parse_pattern_assessment(response).unwrap_err();
        assert!(err.to_string().contains("Unknown pattern type"));
    }
}
