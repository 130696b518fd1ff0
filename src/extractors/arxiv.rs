//! arXiv paper extraction via the Atom export API.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::instrument;

use super::{Extraction, Extractor, HttpFetcher};
use crate::domain::ContentType;
use crate::error::{KbError, Result};

/// Default export API origin
pub const DEFAULT_BASE_URL: &str = "http://export.arxiv.org";

static ARXIV_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:https?://)?(?:www\.|export\.)?arxiv\.org/(?:abs|pdf)/(\d{4}\.\d{4,5}(?:v\d+)?)(?:\.pdf)?(?:[?#/]|$)",
    )
    .expect("arxiv id regex")
});

static ENTRY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").expect("entry regex"));

static AUTHOR_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<author>\s*<name>(.*?)</name>").expect("author regex")
});

/// Extract the paper id (with version suffix, if present) from an arXiv URL
pub fn extract_arxiv_id(url: &str) -> Option<String> {
    ARXIV_ID_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// A paper parsed from an Atom entry
#[derive(Debug, Clone, PartialEq)]
struct Paper {
    title: String,
    summary: String,
    authors: Vec<String>,
    published: String,
    entry_id: String,
}

impl Paper {
    fn format(&self) -> String {
        format!(
            "Title:{}\nAbstract:{}\nAuthors:{}\nPublished:{}\nURL:{}\n",
            self.title,
            self.summary,
            self.authors.join(", "),
            self.published,
            self.entry_id
        )
    }
}

/// Extractor for arXiv abstract and PDF links
#[derive(Debug, Clone)]
pub struct ArxivExtractor {
    http: HttpFetcher,
    base_url: String,
}

impl ArxivExtractor {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Query a different export API origin
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Extractor for ArxivExtractor {
    fn name(&self) -> &str {
        "arxiv"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Paper
    }

    fn can_handle(&self, url: &str) -> bool {
        extract_arxiv_id(url).is_some()
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<Extraction> {
        let paper_id = extract_arxiv_id(url)
            .ok_or_else(|| KbError::extraction(url, "Invalid arXiv URL"))?;

        let query_url = format!("{}/api/query?id_list={}", self.base_url, paper_id);
        let feed = self.http.fetch_text(&query_url).await?;

        let paper = parse_feed(&feed.body)
            .ok_or_else(|| KbError::extraction(url, format!("No paper found for ID: {}", paper_id)))?;

        Ok(Extraction::new(paper.title.clone(), paper.format())
            .with_meta("arxiv_id", paper_id)
            .with_meta("authors", paper.authors.clone())
            .with_meta("published", paper.published.clone())
            .with_meta("entry_id", paper.entry_id.clone()))
    }
}

fn parse_feed(xml: &str) -> Option<Paper> {
    let entry = ENTRY_REGEX.captures(xml)?.get(1)?.as_str();

    let title = tag_text(entry, "title")?;
    // The API reports unknown ids as an entry titled "Error"
    if title.eq_ignore_ascii_case("error") {
        return None;
    }

    let authors = AUTHOR_NAME_REGEX
        .captures_iter(entry)
        .filter_map(|caps| caps.get(1))
        .map(|m| collapse(m.as_str()))
        .filter(|name| !name.is_empty())
        .collect();

    Some(Paper {
        title,
        summary: tag_text(entry, "summary").unwrap_or_default(),
        authors,
        published: tag_text(entry, "published").unwrap_or_default(),
        entry_id: tag_text(entry, "id").unwrap_or_default(),
    })
}

fn tag_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let mut search_from = 0;
    while let Some(rel) = xml[search_from..].find(&open) {
        let start = search_from + rel;
        let after_name = start + open.len();
        // Skip tags that merely share a prefix (e.g. <title> vs <titles>)
        match xml[after_name..].chars().next() {
            Some('>') | Some(' ') => {}
            _ => {
                search_from = after_name;
                continue;
            }
        }
        let body_start = start + xml[start..].find('>')? + 1;
        let body_end = body_start + xml[body_start..].find(&close)?;
        return Some(collapse(&xml[body_start..body_end])).filter(|s| !s.is_empty());
    }
    None
}

fn collapse(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: id_list=2301.12345</title>
  <entry>
    <id>http://arxiv.org/abs/2301.12345v1</id>
    <published>2023-01-29T10:00:00Z</published>
    <title>Attention Is
      Still All You Need</title>
    <summary>  We revisit transformers &amp; friends.
    </summary>
    <author>
      <name>Ada Lovelace</name>
    </author>
    <author>
      <name>Alan Turing</name>
    </author>
  </entry>
</feed>"#;

    #[test]
    fn test_extract_arxiv_id() {
        assert_eq!(
            extract_arxiv_id("https://arxiv.org/abs/2301.12345").as_deref(),
            Some("2301.12345")
        );
        assert_eq!(
            extract_arxiv_id("https://arxiv.org/pdf/2301.12345v2").as_deref(),
            Some("2301.12345v2")
        );
        assert!(extract_arxiv_id("https://arxiv.org/list/cs.AI").is_none());
        assert!(extract_arxiv_id("https://example.com/abs/2301.12345").is_none());
        assert_eq!(
            extract_arxiv_id("http://export.arxiv.org/pdf/2301.12345v1.pdf").as_deref(),
            Some("2301.12345v1")
        );
        assert_eq!(extract_arxiv_id("arxiv.org/abs/2301.12345?context=cs").as_deref(), Some("2301.12345"));

        // arxiv.org only counts as the host
        assert!(extract_arxiv_id("https://example.com/?ref=arxiv.org/abs/2301.12345").is_none());
        assert!(extract_arxiv_id("https://notarxiv.org/abs/2301.12345").is_none());
        assert!(extract_arxiv_id("https://arxiv.org/abs/2301.123456").is_none());
    }

    #[test]
    fn test_parse_feed() {
        let paper = parse_feed(FEED).unwrap();
        assert_eq!(paper.title, "Attention Is Still All You Need");
        assert_eq!(paper.summary, "We revisit transformers & friends.");
        assert_eq!(paper.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(paper.published, "2023-01-29T10:00:00Z");
        assert_eq!(paper.entry_id, "http://arxiv.org/abs/2301.12345v1");

        assert_eq!(
            paper.format(),
            "Title:Attention Is Still All You Need\n\
             Abstract:We revisit transformers & friends.\n\
             Authors:Ada Lovelace, Alan Turing\n\
             Published:2023-01-29T10:00:00Z\n\
             URL:http://arxiv.org/abs/2301.12345v1\n"
        );
    }

    #[test]
    fn test_parse_feed_rejects_error_and_empty() {
        let error_feed = "<feed><entry><id>x</id><title>Error</title><summary>incorrect id</summary></entry></feed>";
        assert!(parse_feed(error_feed).is_none());
        assert!(parse_feed("<feed></feed>").is_none());
    }
}
