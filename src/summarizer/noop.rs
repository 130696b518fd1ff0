//! Summarizer used when no provider is configured.

use async_trait::async_trait;

use super::{Summary, SummaryType, Summarizer};
use crate::error::Result;

/// Returns an empty summary and no keywords
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSummarizer;

#[async_trait]
impl Summarizer for NoopSummarizer {
    fn name(&self) -> &str {
        "none"
    }

    async fn summarize(&self, _text: &str, _summary_type: SummaryType) -> Result<Summary> {
        Ok(Summary::default())
    }
}
