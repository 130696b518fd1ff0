//! Local document extraction for `file://` URLs.
//!
//! Only text-like files are read. Paths that look like secrets are refused
//! before the file is opened.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::Pattern;
use tracing::{debug, instrument, warn};
use url::Url;

use super::web::page_text;
use super::{Extraction, Extractor};
use crate::domain::ContentType;
use crate::error::{KbError, Result};

/// Extensions read as documents
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "csv", "json", "html", "htm", "xml",
];

/// Default maximum document size (10MB)
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

fn default_denylist() -> Vec<String> {
    vec![
        "**/.env*".to_string(),
        "**/secrets*".to_string(),
        "**/*credential*".to_string(),
        "**/*.pem".to_string(),
        "**/*.key".to_string(),
    ]
}

/// Glob patterns for paths that must never be ingested
#[derive(Debug, Clone)]
pub struct PathDenylist {
    patterns: Vec<Pattern>,
}

impl Default for PathDenylist {
    fn default() -> Self {
        Self::from_patterns(default_denylist())
    }
}

impl PathDenylist {
    /// Build from glob strings; invalid patterns are skipped with a warning
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|p| match Pattern::new(p.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = p.as_ref(), error = %e, "Ignoring invalid denylist pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Check if a path matches any denylist pattern
    pub fn is_denied(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.patterns.iter().any(|p| p.matches(&path_str))
    }
}

/// Extractor for local files
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    denylist: PathDenylist,
    max_bytes: u64,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self {
            denylist: PathDenylist::default(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Replace the path denylist
    pub fn with_denylist(mut self, denylist: PathDenylist) -> Self {
        self.denylist = denylist;
        self
    }

    /// Limit the size of documents that will be read
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

fn file_path(url: &str) -> Option<PathBuf> {
    let parsed = Url::parse(url.trim()).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }
    parsed.to_file_path().ok()
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

#[async_trait]
impl Extractor for DocumentExtractor {
    fn name(&self) -> &str {
        "document"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Document
    }

    fn can_handle(&self, url: &str) -> bool {
        file_path(url).is_some()
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<Extraction> {
        let path = file_path(url).ok_or_else(|| KbError::extraction(url, "Not a file URL"))?;

        if self.denylist.is_denied(&path) {
            return Err(KbError::extraction(url, "Path matches the secret denylist"));
        }

        let ext = extension(&path).unwrap_or_default();
        if !TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return Err(KbError::extraction(
                url,
                format!("Unsupported document type: {}", if ext.is_empty() { "(none)" } else { ext.as_str() }),
            ));
        }

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| KbError::extraction(url, e))?;
        if !meta.is_file() {
            return Err(KbError::extraction(url, "Not a regular file"));
        }
        if meta.len() > self.max_bytes {
            return Err(KbError::extraction(
                url,
                format!("Document is {} bytes, limit is {}", meta.len(), self.max_bytes),
            ));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| KbError::extraction(url, e))?;
        if bytes.contains(&0) {
            return Err(KbError::extraction(url, "Document appears to be binary"));
        }
        let text = String::from_utf8(bytes)
            .map_err(|_| KbError::extraction(url, "Document is not valid UTF-8"))?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let (title, body) = if matches!(ext.as_str(), "html" | "htm") {
            let page = page_text(&text);
            let title = if page.title.is_empty() { stem } else { page.title };
            (title, page.text)
        } else {
            (stem, text.trim().to_string())
        };

        debug!(bytes = meta.len(), "Read document");

        Ok(Extraction::new(title, body.clone())
            .with_meta("path", path.to_string_lossy().to_string())
            .with_meta("extension", ext)
            .with_meta("size_bytes", meta.len())
            .with_meta("word_count", body.split_whitespace().count()))
    }
}
