//! Anthropic messages-API provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{excerpt, summarize_via, ChatBackend, Credential, Summary, SummaryType, Summarizer};
use crate::error::{KbError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const API_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "anthropic";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Summarizer backed by the messages API
#[derive(Debug, Clone)]
pub struct AnthropicSummarizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    credential: Credential,
}

impl Default for AnthropicSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicSummarizer {
    /// Default model and endpoint; the key is read from `ANTHROPIC_API_KEY` on first use
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            credential: Credential::from_env(API_KEY_ENV),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.credential = Credential::from_env(var);
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.credential = Credential::with_value(self.credential.var().to_string(), key);
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl ChatBackend for AnthropicSummarizer {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let api_key = self.credential.resolve()?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| KbError::summarization(PROVIDER, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KbError::summarization(
                PROVIDER,
                format!("HTTP {}: {}", status, excerpt(&body)),
            ));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| KbError::summarization(PROVIDER, format!("Malformed response: {}", e)))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        if text.is_empty() {
            return Err(KbError::summarization(PROVIDER, "Response contained no text"));
        }
        Ok(text)
    }
}

#[async_trait]
impl Summarizer for AnthropicSummarizer {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self, text), fields(model = %self.model))]
    async fn summarize(&self, text: &str, summary_type: SummaryType) -> Result<Summary> {
        summarize_via(self, text, summary_type).await
    }
}
