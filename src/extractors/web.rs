//! Generic web page extraction.
//!
//! Fetches a page over HTTP and reduces the HTML to readable text: the first
//! main-content container wins, otherwise the whole body minus navigation
//! chrome. Plain-text responses are kept as they are.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::{Extraction, Extractor, HttpFetcher};
use crate::domain::ContentType;
use crate::error::Result;

/// Containers that usually hold the main article, most specific first
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main",
    ".content",
    ".main",
    ".post-content",
    ".entry-content",
];

/// Never contain readable text
const NON_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "template", "svg"];

/// Page chrome dropped when falling back to the whole body
const BOILERPLATE_TAGS: &[&str] = &["nav", "header", "footer", "aside", "form"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "dl", "dt", "dd", "h1", "h2",
    "h3", "h4", "h5", "h6", "br", "tr", "table", "pre", "blockquote", "figure", "figcaption",
];

/// Readable text pulled out of an HTML document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub title: String,
    pub text: String,
    pub description: Option<String>,
}

/// Extractor for arbitrary http(s) pages
#[derive(Debug, Clone)]
pub struct WebPageExtractor {
    http: HttpFetcher,
}

impl WebPageExtractor {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Extractor for WebPageExtractor {
    fn name(&self) -> &str {
        "webpage"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Webpage
    }

    fn can_handle(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => {
                matches!(parsed.scheme(), "http" | "https")
                    && parsed.host_str().is_some_and(|h| !h.is_empty())
            }
            Err(_) => false,
        }
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<Extraction> {
        let page = self.http.fetch_text(url).await?;

        let (title, text, description) = if page.is_html() {
            let parsed = page_text(&page.body);
            (parsed.title, parsed.text, parsed.description)
        } else {
            (String::new(), page.body.trim().to_string(), None)
        };

        debug!(chars = text.len(), "Extracted page text");

        let mut extraction = Extraction::new(title, text.clone())
            .with_meta("final_url", page.final_url)
            .with_meta("word_count", text.split_whitespace().count());

        if let Some(content_type) = page.content_type {
            extraction = extraction.with_meta("http_content_type", content_type);
        }
        if let Some(description) = description {
            extraction = extraction.with_meta("description", description);
        }

        Ok(extraction)
    }
}

/// Reduce an HTML document to title, body text and description
pub(crate) fn page_text(html: &str) -> PageText {
    let document = Html::parse_document(html);

    let title = select_first(&document, "title")
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(&document, "meta[property='og:title']"))
        .or_else(|| {
            select_first(&document, "h1")
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_default();

    let description = meta_content(&document, "meta[name='description']")
        .or_else(|| meta_content(&document, "meta[property='og:description']"));

    let mut raw = String::new();
    let main = MAIN_SELECTORS
        .iter()
        .find_map(|css| select_first(&document, css));

    match main {
        Some(container) => collect_text(container, NON_TEXT_TAGS, &mut raw),
        None => {
            let skip: Vec<&str> = NON_TEXT_TAGS
                .iter()
                .chain(BOILERPLATE_TAGS)
                .copied()
                .collect();
            let root = select_first(&document, "body").unwrap_or_else(|| document.root_element());
            collect_text(root, &skip, &mut raw);
        }
    }

    PageText {
        title,
        text: tidy_lines(&raw),
        description,
    }
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    select_first(document, css)
        .and_then(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

fn collect_text(element: ElementRef<'_>, skip: &[&str], out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if skip.contains(&name) {
                continue;
            }
            let block = BLOCK_TAGS.contains(&name);
            if block {
                out.push('\n');
            }
            collect_text(child_el, skip, out);
            if block {
                out.push('\n');
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tidy_lines(raw: &str) -> String {
    raw.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
