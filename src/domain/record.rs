//! The canonical content record.
//!
//! A record is assembled once by the content manager and is immutable after
//! it has been persisted. Re-ingesting a URL produces a new record version.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::keywords::normalize_keywords;
use crate::error::KbError;

/// Extractor-specific fields attached to a record
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Record identifier, assigned by the store at save time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a raw identifier
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| KbError::Config(format!("Invalid record id: {}", s)))
    }
}

/// Type of content, set by the extractor that produced the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Video platform content (YouTube)
    Video,

    /// Generic web page/article
    Webpage,

    /// Local document read from the filesystem
    Document,

    /// Research paper (arXiv)
    Paper,

    /// Source repository (GitHub README)
    Repository,

    /// Jupyter notebook
    Notebook,

    /// Model card (Hugging Face)
    Model,
}

impl ContentType {
    /// All content types, in display order
    pub const ALL: [ContentType; 7] = [
        ContentType::Video,
        ContentType::Webpage,
        ContentType::Document,
        ContentType::Paper,
        ContentType::Repository,
        ContentType::Notebook,
        ContentType::Model,
    ];

    /// Stable tag used in storage and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Webpage => "webpage",
            ContentType::Document => "document",
            ContentType::Paper => "paper",
            ContentType::Repository => "repository",
            ContentType::Notebook => "notebook",
            ContentType::Model => "model",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" | "youtube" | "yt" => Ok(ContentType::Video),
            "webpage" | "web" | "article" => Ok(ContentType::Webpage),
            "document" | "doc" | "file" => Ok(ContentType::Document),
            "paper" | "arxiv" => Ok(ContentType::Paper),
            "repository" | "repo" | "github" => Ok(ContentType::Repository),
            "notebook" | "ipynb" => Ok(ContentType::Notebook),
            "model" | "huggingface" | "hf" => Ok(ContentType::Model),
            _ => Err(KbError::Config(format!("Unknown content type: {}", s))),
        }
    }
}

/// Canonical content record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Identifier (None until the record has been saved)
    pub id: Option<RecordId>,

    /// Original source URL
    pub url: String,

    /// Type of content
    pub content_type: ContentType,

    /// Human-readable title (may be empty)
    #[serde(default)]
    pub title: String,

    /// Extracted text body
    pub raw_content: String,

    /// AI-generated summary (empty when skipped or failed)
    #[serde(default)]
    pub summary: String,

    /// Normalized lowercase tags
    #[serde(default)]
    pub keywords: BTreeSet<String>,

    /// Ingestion time
    pub timestamp: DateTime<Utc>,

    /// Extractor-specific fields
    #[serde(default)]
    pub metadata: Metadata,

    /// SHA256(raw_content)[0:16]
    pub content_hash: String,

    /// Record this version re-ingests, if any
    #[serde(default)]
    pub supersedes: Option<RecordId>,
}

impl ContentRecord {
    /// Create a new, unsaved record stamped with the current time
    pub fn new(
        url: impl Into<String>,
        content_type: ContentType,
        raw_content: impl Into<String>,
    ) -> Self {
        let raw_content = raw_content.into();
        Self {
            id: None,
            url: url.into(),
            content_type,
            title: String::new(),
            content_hash: content_hash(&raw_content),
            raw_content,
            summary: String::new(),
            keywords: BTreeSet::new(),
            timestamp: now_millis(),
            metadata: Metadata::new(),
            supersedes: None,
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Add keywords (normalized and deduplicated)
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.extend(normalize_keywords(keywords));
        self
    }

    /// Merge extractor metadata (existing keys are kept)
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        for (key, value) in metadata {
            self.metadata.entry(key).or_insert(value);
        }
        self
    }

    /// Override the timestamp (truncated to millisecond precision)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = truncate_millis(timestamp);
        self
    }

    /// Mark this record as a new version of `previous`
    pub fn with_supersedes(mut self, previous: RecordId) -> Self {
        self.supersedes = Some(previous);
        self
    }

    /// Whether the record has been persisted
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

/// Hash content (first 16 hex chars of SHA256)
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

// Storage keeps millisecond timestamps; records carry the same precision so
// a saved record compares equal to the one read back.
fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

pub(crate) fn truncate_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(timestamp.timestamp_millis())
        .single()
        .unwrap_or(timestamp)
}
