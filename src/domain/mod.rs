//! Domain types for the knowledge base.
//!
//! This module contains the core data structures:
//! - ContentRecord: the canonical, storage-ready unit of ingested content
//! - ContentType: the closed set of source-type tags
//! - Keyword helpers: parsing and normalization of tag sets

pub mod keywords;
pub mod record;

// Re-export commonly used types
pub use keywords::{normalize_keyword, normalize_keywords, parse_keywords};
pub use record::{content_hash, ContentRecord, ContentType, Metadata, RecordId};
