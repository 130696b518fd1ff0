//! Content manager: the single entry point for ingestion and retrieval.
//!
//! # Ingestion
//!
//! ```text
//! url ─→ validate ─→ [dedupe lookup] ─→ registry.resolve ─→ extract (timeout)
//!     ─→ summarize (timeout, degradable) ─→ assemble record ─→ store.save
//! ```
//!
//! Resolution and extraction failures abort the ingestion. Summarization
//! failures and timeouts leave the summary empty and the record is still
//! stored; a missing provider credential is a configuration error and aborts.
//!
//! Deduplicating ingests of the same URL are serialized, so concurrent callers
//! asking for `dedupe` share one stored record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::domain::{ContentRecord, Metadata, RecordId};
use crate::error::{KbError, Result};
use crate::extractors::ExtractorRegistry;
use crate::storage::{ContentStats, ContentStore, SearchFilter};
use crate::summarizer::{Summarizer, Summary, SummaryType};

/// Default extraction timeout
pub const DEFAULT_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default summarization timeout
pub const DEFAULT_SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-step time limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub extract: Duration,
    pub summarize: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            extract: DEFAULT_EXTRACT_TIMEOUT,
            summarize: DEFAULT_SUMMARIZE_TIMEOUT,
        }
    }
}

/// Per-call ingestion options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestOptions {
    /// Summary style; the content type's default when unset
    pub summary_type: Option<SummaryType>,

    /// Store the record without calling the summarizer
    pub skip_summary: bool,

    /// Return the newest stored record for the same URL instead of re-ingesting
    pub dedupe: bool,

    /// Caller-supplied tags, merged into the record keywords
    pub tags: Vec<String>,
}

impl IngestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary_type(mut self, summary_type: SummaryType) -> Self {
        self.summary_type = Some(summary_type);
        self
    }

    pub fn skip_summary(mut self) -> Self {
        self.skip_summary = true;
        self
    }

    pub fn dedupe(mut self) -> Self {
        self.dedupe = true;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add multiple tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Orchestrates extraction, summarization and storage
#[derive(Clone)]
pub struct ContentManager {
    registry: ExtractorRegistry,
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn ContentStore>,
    timeouts: Timeouts,
    url_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ContentManager {
    pub fn new(
        registry: ExtractorRegistry,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            registry,
            summarizer,
            store,
            timeouts: Timeouts::default(),
            url_locks: Arc::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Ingest `url` and return the stored record
    #[instrument(skip(self, options), fields(dedupe = options.dedupe, skip_summary = options.skip_summary))]
    pub async fn ingest(&self, url: &str, options: IngestOptions) -> Result<ContentRecord> {
        let url = validate_url(url)?;

        if !options.dedupe {
            return self.ingest_version(&url, &options, None).await;
        }

        // Held across lookup and save
        let lock = self.url_lock(&url);
        let _guard = lock.lock().await;

        if let Some(existing) = self.store.find_by_url(&url).await? {
            info!(id = ?existing.id, "Returning existing record");
            return Ok(existing);
        }

        self.ingest_version(&url, &options, None).await
    }

    /// Re-ingest the URL of a stored record as a new version of it
    #[instrument(skip(self, options), fields(id = %id))]
    pub async fn reprocess(&self, id: RecordId, options: IngestOptions) -> Result<ContentRecord> {
        let previous = self.store.get(id).await?;
        info!(url = %previous.url, "Reprocessing record");
        self.ingest_version(&previous.url, &options, Some(id)).await
    }

    /// Fetch one record by id
    pub async fn get(&self, id: RecordId) -> Result<ContentRecord> {
        self.store.get(id).await
    }

    /// One page of matching records, newest first
    pub async fn search(
        &self,
        filter: &SearchFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentRecord>> {
        self.store.search(filter, limit, offset).await
    }

    /// Aggregate statistics over the store
    pub async fn stats(&self, top: usize) -> Result<ContentStats> {
        self.store.stats(top).await
    }

    async fn ingest_version(
        &self,
        url: &str,
        options: &IngestOptions,
        supersedes: Option<RecordId>,
    ) -> Result<ContentRecord> {
        let extractor = self.registry.resolve(url)?;
        let content_type = extractor.content_type();

        let extraction = match tokio::time::timeout(self.timeouts.extract, extractor.extract(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(KbError::extraction(
                    url,
                    format!("timed out after {}s", self.timeouts.extract.as_secs_f64()),
                ))
            }
        };

        debug!(
            extractor = extractor.name(),
            chars = extraction.raw_content.len(),
            "Extraction complete"
        );

        let summary_type = options
            .summary_type
            .unwrap_or_else(|| SummaryType::default_for(content_type));

        let summary = if options.skip_summary {
            Summary::default()
        } else if extraction.raw_content.trim().is_empty() {
            debug!("Nothing to summarize");
            Summary::default()
        } else {
            self.summarize(url, &extraction.raw_content, summary_type).await?
        };

        let mut provenance = Metadata::new();
        provenance.insert("extractor".to_string(), extractor.name().into());
        if !summary.summary.is_empty() {
            provenance.insert("summary_type".to_string(), summary_type.as_str().into());
            provenance.insert("summarizer".to_string(), self.summarizer.name().into());
        }

        let mut record = ContentRecord::new(url, content_type, extraction.raw_content)
            .with_title(extraction.title)
            .with_summary(summary.summary)
            .with_keywords(summary.keywords)
            .with_keywords(&options.tags)
            .with_metadata(extraction.metadata)
            .with_metadata(provenance);
        if let Some(previous) = supersedes {
            record = record.with_supersedes(previous);
        }

        let id = self.store.save(&record).await?;
        record.id = Some(id);

        info!(
            %id,
            content_type = %record.content_type,
            keywords = record.keywords.len(),
            summarized = !record.summary.is_empty(),
            "Ingested content"
        );

        Ok(record)
    }

    /// Lock shared by every in-flight dedupe of `url`
    fn url_lock(&self, url: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.url_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Entries nobody else holds are finished
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(url.to_string()).or_default())
    }

    /// Summarize, degrading to an empty summary on provider failure
    async fn summarize(&self, url: &str, text: &str, summary_type: SummaryType) -> Result<Summary> {
        let provider = self.summarizer.name();

        match tokio::time::timeout(self.timeouts.summarize, self.summarizer.summarize(text, summary_type)).await {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e @ KbError::MissingCredential { .. })) => Err(e),
            Ok(Err(e)) => {
                warn!(url, provider, error = %e, "Summarization failed, storing without summary");
                Ok(Summary::default())
            }
            Err(_) => {
                warn!(
                    url,
                    provider,
                    timeout_secs = self.timeouts.summarize.as_secs_f64(),
                    "Summarization timed out, storing without summary"
                );
                Ok(Summary::default())
            }
        }
    }
}

impl std::fmt::Debug for ContentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentManager")
            .field("registry", &self.registry)
            .field("summarizer", &self.summarizer.name())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

/// Trim and check that `url` parses as an absolute URL
fn validate_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(KbError::InvalidUrl {
            url: url.to_string(),
            reason: "URL is empty".to_string(),
        });
    }

    Url::parse(trimmed).map_err(|e| KbError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    Ok(trimmed.to_string())
}
