//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - OpenAI itself
//! - vLLM (http://localhost:8000)
//! - LocalAI (http://localhost:8080)
//! - llama-server / llama.cpp (http://localhost:8080)
//! - Docker Model Runner (http://localhost:12434)
//!
//! # Configuration
//!
//! Environment variables:
//! - `ORACLE_HOST`: Server URL (required)
//! - `ORACLE_MODEL`: Model name (default: gpt-4o)
//! - `ORACLE_API_KEY`: API key if required (optional)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::NewTransaction;

use super::parsing::{parse_merchant_analysis, parse_pattern_assessment};
use super::types::{MerchantAnalysis, PatternAssessment};
use super::{merchant_prompt, pattern_prompt, OracleBackend};

const MERCHANT_SYSTEM_PROMPT: &str =
    "You are a financial transaction analyzer specialized in merchant normalization and categorization.";
const PATTERN_SYSTEM_PROMPT: &str =
    "You are a financial pattern analyzer specialized in detecting transaction patterns.";

/// OpenAI-compatible backend
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        let mut backend = Self::new(base_url, model);
        backend.api_key = Some(api_key.to_string());
        backend
    }

    /// Create from environment variables
    ///
    /// Required: `ORACLE_HOST`
    /// Optional: `ORACLE_MODEL` (default: gpt-4o), `ORACLE_API_KEY`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("ORACLE_HOST").ok()?;
        let model = std::env::var("ORACLE_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let api_key = std::env::var("ORACLE_API_KEY").ok();

        let mut backend = Self::new(&host, &model);
        backend.api_key = api_key;
        Some(backend)
    }

    /// Make a chat completion request and return the assistant text
    async fn chat_completion(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: Some(0.2),
            max_tokens: Some(500),
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Oracle(format!(
                "Oracle API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Oracle("No choices in oracle response".into()))
    }
}

#[async_trait]
impl OracleBackend for OpenAICompatibleBackend {
    async fn classify_merchant(&self, description: &str) -> Result<MerchantAnalysis> {
        let response = self
            .chat_completion(MERCHANT_SYSTEM_PROMPT, &merchant_prompt(description))
            .await?;
        debug!(description, response, "Oracle merchant classification");

        parse_merchant_analysis(&response)
    }

    async fn classify_pattern(
        &self,
        transactions: &[NewTransaction],
    ) -> Result<PatternAssessment> {
        let response = self
            .chat_completion(PATTERN_SYSTEM_PROMPT, &pattern_prompt(transactions))
            .await?;
        debug!(
            transaction_count = transactions.len(),
            response, "Oracle pattern assessment"
        );

        parse_pattern_assessment(&response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/v1/models", self.base_url))
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

/// Chat completion request body
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat completion response body
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}
