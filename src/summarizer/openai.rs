//! OpenAI-compatible chat-completions provider.

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{excerpt, summarize_via, ChatBackend, Credential, Summary, SummaryType, Summarizer};
use crate::error::{KbError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const PROVIDER: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Summarizer backed by the chat-completions API
#[derive(Debug, Clone)]
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    credential: Credential,
}

impl Default for OpenAiSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiSummarizer {
    /// Default model and endpoint; the key is read from `OPENAI_API_KEY` on first use
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

    /// Set a custom base URL (for proxies and compatible servers)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Read the key from a different environment variable
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.credential = Credential::from_env(var);
        self
    }

    /// Use a known key instead of the environment
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.credential = Credential::with_value(self.credential.var().to_string(), key);
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatBackend for OpenAiSummarizer {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let api_key = self.credential.resolve()?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens,
            temperature: 1.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", api_key))
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| KbError::summarization(PROVIDER, format!("Malformed response: {}", e)))?;

        debug!(choices = parsed.choices.len(), "Chat completion received");

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| KbError::summarization(PROVIDER, "Response contained no message"))
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self, text), fields(model = %self.model, words = text.split_whitespace().count()))]
    async fn summarize(&self, text: &str, summary_type: SummaryType) -> Result<Summary> {
        summarize_via(self, text, summary_type).await
    }
}
