//! Ollama backend implementation
//!
//! HTTP client for Ollama's native generate API. Useful for fully local
//! deployments where no OpenAI-compatible shim is running.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::NewTransaction;

use super::parsing::{parse_merchant_analysis, parse_pattern_assessment};
use super::types::{MerchantAnalysis, PatternAssessment};
use super::{merchant_prompt, pattern_prompt, OracleBackend};

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    ///
    /// Required: `ORACLE_HOST`
    /// Optional: `ORACLE_MODEL` (default: llama3.2)
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("ORACLE_HOST").ok()?;
        let model = std::env::var("ORACLE_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }

    /// Make a generate request and return the raw response text
    async fn generate(&self, prompt: String) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt,
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Oracle(format!(
                "Ollama API error {}: {}",
                status, body
            )));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        Ok(ollama_response.response)
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl OracleBackend for OllamaBackend {
    async fn classify_merchant(&self, description: &str) -> Result<MerchantAnalysis> {
        let response = self.generate(merchant_prompt(description)).await?;
        debug!(description, response, "Ollama merchant classification");

        parse_merchant_analysis(&response)
    }

    async fn classify_pattern(
        &self,
        transactions: &[NewTransaction],
    ) -> Result<PatternAssessment> {
        let response = self.generate(pattern_prompt(transactions)).await?;
        debug!(
            transaction_count = transactions.len(),
            response, "Ollama pattern assessment"
        );

        parse_pattern_assessment(&response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
