//! kbase - ingest, summarize and search web content
//!
//! URLs are turned into canonical content records by a registry of
//! extractors, enriched by a pluggable summarizer, and stored in an
//! append-only SQLite repository that supports keyword, type, text and
//! time-range search.
//!
//! # Modules
//!
//! - `extractors`: Source-specific extraction (web, YouTube, arXiv, GitHub, Hugging Face, files)
//! - `summarizer`: Summary and keyword generation (OpenAI, Anthropic, no-op)
//! - `storage`: The content store contract and its SQLite implementation
//! - `manager`: Ingestion orchestration and retrieval
//! - `domain`: Data structures (ContentRecord, ContentType, keywords)
//! - `config`, `cli`: Configuration loading and the command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Ingest a page
//! kbase ingest https://www.youtube.com/watch?v=dQw4w9WgXcQ --tags music
//!
//! # Search by keyword
//! kbase search --keywords music,rust --limit 10
//!
//! # Show a record
//! kbase get 1 --full
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod extractors;
pub mod manager;
pub mod storage;
pub mod summarizer;

// Re-export main types at crate root for convenience
pub use domain::{ContentRecord, ContentType, Metadata, RecordId};
pub use error::{KbError, Result};
pub use extractors::{Extraction, Extractor, ExtractorRegistry};
pub use manager::{ContentManager, IngestOptions, Timeouts};
pub use storage::{ContentStats, ContentStore, SearchFilter, SqliteContentStore, TimeRange};
pub use summarizer::{Summarizer, Summary, SummaryType};
