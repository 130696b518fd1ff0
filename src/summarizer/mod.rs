//! AI summarization capability.
//!
//! A [`Summarizer`] turns raw text into a short summary plus keywords. The
//! content manager only sees the trait; which vendor sits behind it is a
//! configuration decision made once by [`from_config`].
//!
//! Chat-style providers share one flow: the system prompt for the summary
//! type is sent with the (truncated) text, then the keyword prompt is sent
//! with the summary.

pub mod anthropic;
pub mod noop;
pub mod openai;
pub mod prompts;

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{parse_keywords, ContentType};
use crate::error::{KbError, Result};

pub use anthropic::AnthropicSummarizer;
pub use noop::NoopSummarizer;
pub use openai::OpenAiSummarizer;

/// Longest input, in words, sent to a provider
pub const MAX_INPUT_WORDS: usize = 100_000;

/// Output token cap for summaries
pub(crate) const SUMMARY_MAX_TOKENS: u32 = 1024;

/// Output token cap for keyword lists
pub(crate) const KEYWORDS_MAX_TOKENS: u32 = 256;

/// Kind of summary to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    General,
    Technical,
    Bullet,
    Video,
    Paper,
    Repository,
    Model,
    Notebook,
}

impl SummaryType {
    pub const ALL: [SummaryType; 8] = [
        SummaryType::General,
        SummaryType::Technical,
        SummaryType::Bullet,
        SummaryType::Video,
        SummaryType::Paper,
        SummaryType::Repository,
        SummaryType::Model,
        SummaryType::Notebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryType::General => "general",
            SummaryType::Technical => "technical",
            SummaryType::Bullet => "bullet",
            SummaryType::Video => "video",
            SummaryType::Paper => "paper",
            SummaryType::Repository => "repository",
            SummaryType::Model => "model",
            SummaryType::Notebook => "notebook",
        }
    }

    /// Summary type used when the caller does not choose one
    pub fn default_for(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Video => SummaryType::Video,
            ContentType::Paper => SummaryType::Paper,
            ContentType::Repository => SummaryType::Repository,
            ContentType::Model => SummaryType::Model,
            ContentType::Notebook => SummaryType::Notebook,
            ContentType::Webpage | ContentType::Document => SummaryType::General,
        }
    }

    /// System prompt for this summary type
    pub fn system_prompt(&self) -> &'static str {
        prompts::system_prompt(*self)
    }
}

impl std::fmt::Display for SummaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SummaryType {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general" => Ok(SummaryType::General),
            "technical" | "tech" => Ok(SummaryType::Technical),
            "bullet" | "bullets" => Ok(SummaryType::Bullet),
            "video" | "youtube" => Ok(SummaryType::Video),
            "paper" | "arxiv" => Ok(SummaryType::Paper),
            "repository" | "repo" | "github" => Ok(SummaryType::Repository),
            "model" | "huggingface" => Ok(SummaryType::Model),
            "notebook" | "ipython" => Ok(SummaryType::Notebook),
            _ => Err(KbError::Config(format!("Unknown summary type: {}", s))),
        }
    }
}

/// Summarizer output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub keywords: Vec<String>,
}

/// Capability over LLM-backed summarization providers
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Provider name, used in logs and errors
    fn name(&self) -> &str;

    /// Summarize `text` and extract keywords from the summary
    async fn summarize(&self, text: &str, summary_type: SummaryType) -> Result<Summary>;
}

// ============================================================================
// Configuration
// ============================================================================

fn default_provider() -> String {
    "openai".to_string()
}

/// Provider selection, as read from the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Provider name: openai, anthropic or none
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model override
    #[serde(default)]
    pub model: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// API base URL override
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_key_env: None,
            base_url: None,
        }
    }
}

/// Build the configured summarizer.
///
/// Construction never reads credentials; a missing key surfaces on the first
/// `summarize` call.
pub fn from_config(config: &SummarizerConfig) -> Result<Arc<dyn Summarizer>> {
    match config.provider.trim().to_lowercase().as_str() {
        "openai" => {
            let mut summarizer = OpenAiSummarizer::new();
            if let Some(model) = &config.model {
                summarizer = summarizer.with_model(model);
            }
            if let Some(var) = &config.api_key_env {
                summarizer = summarizer.with_api_key_env(var);
            }
            if let Some(url) = &config.base_url {
                summarizer = summarizer.with_base_url(url);
            }
            Ok(Arc::new(summarizer))
        }
        "anthropic" => {
            let mut summarizer = AnthropicSummarizer::new();
            if let Some(model) = &config.model {
                summarizer = summarizer.with_model(model);
            }
            if let Some(var) = &config.api_key_env {
                summarizer = summarizer.with_api_key_env(var);
            }
            if let Some(url) = &config.base_url {
                summarizer = summarizer.with_base_url(url);
            }
            Ok(Arc::new(summarizer))
        }
        "none" | "noop" | "off" => Ok(Arc::new(NoopSummarizer)),
        other => Err(KbError::Config(format!(
            "Unknown summarizer provider: {}",
            other
        ))),
    }
}

// ============================================================================
// Shared provider plumbing
// ============================================================================

/// API key read from an environment variable on first use
pub struct Credential {
    var: String,
    value: OnceLock<String>,
}

impl Credential {
    /// Credential read from `var` when first needed
    pub fn from_env(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            value: OnceLock::new(),
        }
    }

    /// Credential with a known value
    pub fn with_value(var: impl Into<String>, value: impl Into<String>) -> Self {
        let credential = Self::from_env(var);
        let _ = credential.value.set(value.into());
        credential
    }

    /// Environment variable name
    pub fn var(&self) -> &str {
        &self.var
    }

    /// Resolve the key, caching it after the first successful read
    pub fn resolve(&self) -> Result<&str> {
        if let Some(value) = self.value.get() {
            return Ok(value.as_str());
        }

        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => {
                Ok(self.value.get_or_init(|| value.trim().to_string()).as_str())
            }
            _ => Err(KbError::MissingCredential {
                var: self.var.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("var", &self.var)
            .field("resolved", &self.value.get().is_some())
            .finish()
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        let value = OnceLock::new();
        if let Some(v) = self.value.get() {
            let _ = value.set(v.clone());
        }
        Self {
            var: self.var.clone(),
            value,
        }
    }
}

/// Single-turn chat completion used by the vendor providers
#[async_trait]
pub(crate) trait ChatBackend: Send + Sync {
    fn provider(&self) -> &str;

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String>;
}

/// Summary then keywords, through any chat backend
pub(crate) async fn summarize_via<B>(
    backend: &B,
    text: &str,
    summary_type: SummaryType,
) -> Result<Summary>
where
    B: ChatBackend + ?Sized,
{
    let input = truncate_words(text, MAX_INPUT_WORDS);
    if let Cow::Owned(_) = input {
        warn!(
            provider = backend.provider(),
            max_words = MAX_INPUT_WORDS,
            "Input too long, truncating"
        );
    }

    let summary = backend
        .complete(summary_type.system_prompt(), &input, SUMMARY_MAX_TOKENS)
        .await?
        .trim()
        .to_string();

    if summary.is_empty() {
        return Ok(Summary::default());
    }

    let keyword_text = backend
        .complete(prompts::KEYWORDS, &summary, KEYWORDS_MAX_TOKENS)
        .await?;
    let keywords = parse_keywords(&keyword_text);

    debug!(
        provider = backend.provider(),
        summary_chars = summary.len(),
        keywords = keywords.len(),
        "Summarized"
    );

    Ok(Summary { summary, keywords })
}

/// Keep at most `max_words` whitespace-separated words
pub fn truncate_words(text: &str, max_words: usize) -> Cow<'_, str> {
    let mut words = text.split_whitespace();
    let kept: Vec<&str> = words.by_ref().take(max_words).collect();
    if words.next().is_none() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(kept.join(" "))
    }
}

/// Shorten an error body for inclusion in an error message
pub(crate) fn excerpt(body: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_type_defaults() {
        assert_eq!(SummaryType::default_for(ContentType::Video), SummaryType::Video);
        assert_eq!(SummaryType::default_for(ContentType::Paper), SummaryType::Paper);
        assert_eq!(SummaryType::default_for(ContentType::Webpage), SummaryType::General);
        assert_eq!(SummaryType::default_for(ContentType::Document), SummaryType::General);
    }

    #[test]
    fn test_summary_type_from_str() {
        assert_eq!("ipython".parse::<SummaryType>().unwrap(), SummaryType::Notebook);
        assert_eq!("Bullets".parse::<SummaryType>().unwrap(), SummaryType::Bullet);
        assert!("haiku".parse::<SummaryType>().is_err());

        for t in SummaryType::ALL {
            assert_eq!(t.to_string().parse::<SummaryType>().unwrap(), t);
        }
    }

    #[test]
    fn test_truncate_words() {
        assert!(matches!(truncate_words("a b c", 3), Cow::Borrowed("a b c")));
        assert_eq!(truncate_words("a  b\nc d", 2), "a b");
        assert_eq!(truncate_words("", 2), "");
    }

    #[test]
    fn test_credential_missing_and_fixed() {
        let missing = Credential::from_env("KBASE_TEST_CREDENTIAL_THAT_IS_NEVER_SET");
        let err = missing.resolve().unwrap_err();
        assert!(matches!(
            err,
            KbError::MissingCredential { ref var } if var == "KBASE_TEST_CREDENTIAL_THAT_IS_NEVER_SET"
        ));

        let fixed = Credential::with_value("ANY_VAR", "sk-test");
        assert_eq!(fixed.resolve().unwrap(), "sk-test");
        assert_eq!(fixed.clone().resolve().unwrap(), "sk-test");
    }

    #[test]
    fn test_credential_is_read_lazily() {
        let var = "KBASE_TEST_CREDENTIAL_LAZY";
        let credential = Credential::from_env(var);

        std::env::set_var(var, " sk-lazy ");
        assert_eq!(credential.resolve().unwrap(), "sk-lazy");

        // Cached after the first read
        std::env::remove_var(var);
        assert_eq!(credential.resolve().unwrap(), "sk-lazy");
    }

    #[test]
    fn test_from_config() {
        let mut config = SummarizerConfig::default();
        assert_eq!(from_config(&config).unwrap().name(), "openai");

        config.provider = "Anthropic".to_string();
        assert_eq!(from_config(&config).unwrap().name(), "anthropic");

        config.provider = "none".to_string();
        assert_eq!(from_config(&config).unwrap().name(), "none");

        config.provider = "cohere".to_string();
        assert!(matches!(from_config(&config), Err(KbError::Config(_))));
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("  short  "), "short");
        let long = "é".repeat(300);
        assert_eq!(excerpt(&long).chars().count(), 203);
    }
}
