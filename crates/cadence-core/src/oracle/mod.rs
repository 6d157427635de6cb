//! Pluggable classification-oracle abstraction
//!
//! The oracle is the external model that maps free-text transaction
//! descriptions to structured merchant metadata and judges whether a
//! merchant's transaction history forms a subscription or a recurring
//! pattern. It is a black box behind two operations; everything else in the
//! engine treats its answers as data.
//!
//! # Architecture
//!
//! - `OracleBackend` trait: defines the interface for oracle operations
//! - `OracleClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `OllamaBackend`, `MockOracle`
//!
//! # Configuration
//!
//! Environment variables:
//! - `ORACLE_BACKEND`: Backend to use (openai_compatible, ollama, mock). Default: openai_compatible
//! - `ORACLE_HOST`: Server URL (required for the HTTP backends)
//! - `ORACLE_MODEL`: Model name (default: gpt-4o for openai_compatible, llama3.2 for ollama)
//! - `ORACLE_API_KEY`: API key if the server requires one (optional)

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::MockOracle;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::{MerchantAnalysis, PatternAssessment};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::NewTransaction;

/// Trait defining the interface for all oracle backends
///
/// Backends must be Send + Sync to allow use across async tasks. Both
/// operations fail with a typed error when the oracle is unreachable or the
/// response fails schema validation - callers decide whether to retry or
/// skip.
#[async_trait]
pub trait OracleBackend: Send + Sync {
    /// Normalize and categorize a raw transaction description
    async fn classify_merchant(&self, description: &str) -> Result<MerchantAnalysis>;

    /// Judge whether a merchant's transactions form a pattern, and of what kind
    async fn classify_pattern(&self, transactions: &[NewTransaction])
        -> Result<PatternAssessment>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete oracle client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum OracleClient {
    /// Any server implementing the OpenAI chat completions API
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing and offline use
    Mock(MockOracle),
}

impl OracleClient {
    /// Create an oracle client from environment variables
    ///
    /// Checks `ORACLE_BACKEND` to determine which backend to use:
    /// - `openai_compatible` (default): OpenAI, vLLM, LocalAI, llama-server, etc.
    /// - `ollama`: Ollama's native generate API
    /// - `mock`: deterministic offline backend
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend =
            std::env::var("ORACLE_BACKEND").unwrap_or_else(|_| "openai_compatible".to_string());

        match backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(OracleClient::OpenAICompatible)
            }
            "ollama" => OllamaBackend::from_env().map(OracleClient::Ollama),
            "mock" => Some(OracleClient::Mock(MockOracle::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown ORACLE_BACKEND, falling back to openai_compatible");
                OpenAICompatibleBackend::from_env().map(OracleClient::OpenAICompatible)
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        OracleClient::Mock(MockOracle::new())
    }
}

// Implement OracleBackend for OracleClient by delegating to the inner backend
#[async_trait]
impl OracleBackend for OracleClient {
    async fn classify_merchant(&self, description: &str) -> Result<MerchantAnalysis> {
        match self {
            OracleClient::OpenAICompatible(b) => b.classify_merchant(description).await,
            OracleClient::Ollama(b) => b.classify_merchant(description).await,
            OracleClient::Mock(b) => b.classify_merchant(description).await,
        }
    }

    async fn classify_pattern(
        &self,
        transactions: &[NewTransaction],
    ) -> Result<PatternAssessment> {
        match self {
            OracleClient::OpenAICompatible(b) => b.classify_pattern(transactions).await,
            OracleClient::Ollama(b) => b.classify_pattern(transactions).await,
            OracleClient::Mock(b) => b.classify_pattern(transactions).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            OracleClient::OpenAICompatible(b) => b.health_check().await,
            OracleClient::Ollama(b) => b.health_check().await,
            OracleClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            OracleClient::OpenAICompatible(b) => b.model(),
            OracleClient::Ollama(b) => b.model(),
            OracleClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            OracleClient::OpenAICompatible(b) => b.host(),
            OracleClient::Ollama(b) => b.host(),
            OracleClient::Mock(b) => b.host(),
        }
    }
}

/// Build the merchant classification prompt
pub(crate) fn merchant_prompt(description: &str) -> String {
    format!(
        r#"Analyze this merchant description and provide normalized details:
Description: "{}"

Rules:
1. Name: Remove common prefixes/suffixes (e.g., AMZN MKTP -> Amazon)
2. Category: Use standard categories (Shopping, Entertainment, Food & Dining, etc.)
3. SubCategory: Use specific values (Online Retail, Streaming Service, etc.)
4. Flags: Add relevant flags (digital_service, subscription, marketplace, etc.)

Respond in JSON format:
{{
  "merchant": "normalized name",
  "category": "main category",
  "sub_category": "specific subcategory",
  "confidence": 0-1,
  "flags": ["flag1", "flag2"]
}}"#,
        description
    )
}

/// Build the pattern assessment prompt
pub(crate) fn pattern_prompt(transactions: &[NewTransaction]) -> String {
    let listing = transactions
        .iter()
        .map(|t| format!("- {}: ${} on {}", t.description, t.amount, t.date))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze these transactions and determine if they form a pattern:

Transactions:
{}

Determine:
1. If this is a SUBSCRIPTION (fixed amount), RECURRING (variable amount), or PERIODIC (no stable cadence) pattern
2. Confidence score based on consistency
3. Detailed explanation of the pattern

Respond in JSON format:
{{
  "type": "SUBSCRIPTION|RECURRING|PERIODIC",
  "confidence": 0-1,
  "description": "detailed explanation"
}}"#,
        listing
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_client_mock() {
        let client = OracleClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = OracleClient::mock();
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_classify_merchant() {
        let client = OracleClient::mock();
        let result = client.classify_merchant("NETFLIX.COM").await.unwrap();
        assert!(!result.normalized_name.is_empty());
        assert!(!result.category.is_empty());
    }
}
