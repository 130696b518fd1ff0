//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Resolution and extraction failures abort an ingestion and carry the
//! originating URL. Summarization failures are recoverable and are handled
//! by the manager. Storage failures always propagate.

use thiserror::Error;

use crate::domain::RecordId;

/// Errors raised by the pipeline
#[derive(Debug, Error)]
pub enum KbError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No extractor registered for URL: {url}")]
    NoExtractorFound { url: String },

    #[error("Extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential { var: String },

    #[error("Summarization failed ({provider}): {reason}")]
    Summarization { provider: String, reason: String },

    #[error("Content record not found: {0}")]
    NotFound(RecordId),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KbError {
    /// Build an extraction error for `url` from any displayable cause
    pub fn extraction(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Extraction {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a summarization error for `provider`
    pub fn summarization(provider: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Summarization {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller may reasonably retry the same request; only
    /// extraction failures qualify
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Extraction { .. })
    }

    /// The URL this error is attached to, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::InvalidUrl { url, .. }
            | Self::NoExtractorFound { url }
            | Self::Extraction { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// Result alias used across the library
pub type Result<T, E = KbError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_carries_url() {
        let err = KbError::extraction("https://example.com", "connection refused");
        assert_eq!(err.url(), Some("https://example.com"));
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Extraction failed for https://example.com: connection refused"
        );
    }

    #[test]
    fn test_configuration_errors_are_not_retryable() {
        let err = KbError::MissingCredential {
            var: "OPENAI_API_KEY".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = KbError::NoExtractorFound {
            url: "ftp://example.com".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.url(), Some("ftp://example.com"));
    }

    #[test]
    fn test_summarization_errors_are_not_retryable() {
        let err = KbError::summarization("openai", "HTTP 429 Too Many Requests");
        assert!(!err.is_retryable());
        assert_eq!(err.url(), None);
        assert_eq!(
            err.to_string(),
            "Summarization failed (openai): HTTP 429 Too Many Requests"
        );
    }
}
