//! Persistence and search for content records.
//!
//! Records are append-only: `save` always inserts a new row, and saving a
//! record that already carries an id produces a new version pointing back at
//! it through `supersedes`.
//!
//! Search results are ordered newest first with the id as tie-break, so a
//! `(filter, limit, offset)` triple is a stable page as long as nothing is
//! written in between.

pub mod sqlite;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{normalize_keywords, ContentRecord, ContentType, RecordId};
use crate::error::Result;

pub use sqlite::SqliteContentStore;

/// Half-open time interval: `start <= t < end`, either bound optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Everything at or after `start`
    pub fn since(start: DateTime<Utc>) -> Self {
        Self::new(Some(start), None)
    }

    /// Everything strictly before `end`
    pub fn until(end: DateTime<Utc>) -> Self {
        Self::new(None, Some(end))
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp < e)
    }
}

/// Search criteria; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Restrict to one content type
    pub content_type: Option<ContentType>,

    /// Match records carrying any of these keywords
    pub keywords: BTreeSet<String>,

    /// Case-insensitive substring of summary or raw content
    pub text_query: Option<String>,

    /// Restrict by ingestion time
    pub time_range: Option<TimeRange>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Add keywords (normalized the same way record keywords are)
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.extend(normalize_keywords(keywords));
        self
    }

    pub fn with_text_query(mut self, query: impl Into<String>) -> Self {
        self.text_query = Some(query.into());
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Text query with surrounding whitespace removed, if any is left
    pub fn effective_text_query(&self) -> Option<&str> {
        self.text_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

/// Number of records sharing one keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: u64,
}

/// Two keywords that appear on the same record, `first < second`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordPair {
    pub first: String,
    pub second: String,
    pub count: u64,
}

/// Records ingested within trailing windows ending now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecentCounts {
    pub last_24h: u64,
    pub last_7d: u64,
    pub last_30d: u64,
    pub last_365d: u64,
}

/// Aggregate view over every stored version
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentStats {
    pub total: u64,

    /// Records per content type, most common first
    pub by_type: Vec<(ContentType, u64)>,

    pub recent: RecentCounts,

    /// Mean keywords per record; 0 for an empty store
    pub average_keywords: f64,

    pub distinct_keywords: u64,

    /// Most used keywords, most common first
    pub top_keywords: Vec<KeywordCount>,

    /// Most frequent keyword co-occurrences, most common first
    pub keyword_pairs: Vec<KeywordPair>,
}

/// Persistent store of content records
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new row for `record` and return its id
    async fn save(&self, record: &ContentRecord) -> Result<RecordId>;

    /// Fetch one record; `NotFound` if the id is unknown
    async fn get(&self, id: RecordId) -> Result<ContentRecord>;

    /// Newest record ingested from exactly `url`
    async fn find_by_url(&self, url: &str) -> Result<Option<ContentRecord>>;

    /// One page of matching records, newest first
    async fn search(
        &self,
        filter: &SearchFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentRecord>>;

    /// Total number of stored records
    async fn count(&self) -> Result<u64>;

    /// Type, recency and keyword statistics; `top` bounds both keyword lists
    async fn stats(&self, top: usize) -> Result<ContentStats>;
}
