//! Ordered extractor registry.

use std::sync::Arc;

use tracing::debug;

use super::{
    ArxivExtractor, DocumentExtractor, Extractor, GitHubNotebookExtractor, GitHubRepoExtractor,
    HttpFetcher, HuggingFaceExtractor, WebPageExtractor, YouTubeExtractor,
};
use crate::error::{KbError, Result};

/// Registry of extractors, consulted in registration order
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in extractors, specific matchers first and
    /// the generic web page extractor last
    pub fn with_defaults(http: HttpFetcher) -> Self {
        let mut registry = Self::new();
        registry
            .register(YouTubeExtractor::new(http.clone()))
            .register(ArxivExtractor::new(http.clone()))
            .register(GitHubNotebookExtractor::new(http.clone()))
            .register(GitHubRepoExtractor::new(http.clone()))
            .register(HuggingFaceExtractor::new(http.clone()))
            .register(DocumentExtractor::new())
            .register(WebPageExtractor::new(http));
        registry
    }

    /// Append an extractor
    pub fn register<E: Extractor + 'static>(&mut self, extractor: E) -> &mut Self {
        self.register_arc(Arc::new(extractor))
    }

    /// Append a shared extractor
    pub fn register_arc(&mut self, extractor: Arc<dyn Extractor>) -> &mut Self {
        self.extractors.push(extractor);
        self
    }

    /// Select the first extractor that can handle `url`
    pub fn resolve(&self, url: &str) -> Result<Arc<dyn Extractor>> {
        let extractor = self
            .extractors
            .iter()
            .find(|e| e.can_handle(url))
            .cloned()
            .ok_or_else(|| KbError::NoExtractorFound {
                url: url.to_string(),
            })?;

        debug!(url, extractor = extractor.name(), "Resolved extractor");
        Ok(extractor)
    }

    /// Extractor names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Number of registered extractors
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    /// Check if no extractor is registered
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &self.names())
            .finish()
    }
}
