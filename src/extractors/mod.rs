//! Source-type extractors.
//!
//! An extractor recognizes one kind of source URL and converts it into raw
//! text plus metadata. Extractors are stateless and shared across
//! concurrent ingestions.
//!
//! # Dispatch
//!
//! ```text
//! url ─→ ExtractorRegistry::resolve ─→ first extractor whose can_handle(url)
//!                                      is true, in registration order
//! ```
//!
//! Specific extractors must be registered before generic fallbacks; the
//! web page extractor accepts any http(s) URL.

pub mod arxiv;
pub mod document;
pub mod github;
pub mod http;
pub mod huggingface;
pub mod registry;
pub mod web;
pub mod youtube;

use async_trait::async_trait;

use crate::domain::{ContentType, Metadata};
use crate::error::Result;

// Re-export the extractors and the registry
pub use arxiv::ArxivExtractor;
pub use document::{DocumentExtractor, PathDenylist};
pub use github::{GitHubNotebookExtractor, GitHubRepoExtractor};
pub use http::{FetchedPage, HttpFetcher, HttpSettings, DEFAULT_USER_AGENT};
pub use huggingface::HuggingFaceExtractor;
pub use registry::ExtractorRegistry;
pub use web::WebPageExtractor;
pub use youtube::{extract_video_id, YouTubeExtractor};

/// Output from an extractor
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Title reported by the source (may be empty)
    pub title: String,

    /// Extracted text body (may be empty on partial extraction)
    pub raw_content: String,

    /// Extractor-specific fields
    pub metadata: Metadata,
}

impl Extraction {
    /// Create an extraction with a body and no metadata
    pub fn new(title: impl Into<String>, raw_content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            raw_content: raw_content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata field
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Trait for source-type extractors
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Human-readable extractor name
    fn name(&self) -> &str;

    /// Content type assigned to records this extractor produces
    fn content_type(&self) -> ContentType;

    /// Pure URL-pattern predicate
    fn can_handle(&self, url: &str) -> bool;

    /// Retrieve content for `url`
    async fn extract(&self, url: &str) -> Result<Extraction>;
}

/// Drop blank lines and trim the rest
pub(crate) fn strip_blank_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
