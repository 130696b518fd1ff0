//! Shared HTTP fetching for network extractors.
//!
//! One reqwest client is built per registry and cloned into each
//! extractor; the client follows redirects and applies a per-request
//! timeout. Responses that are not text are rejected before decoding, and
//! bodies are read incrementally up to a byte cap.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{KbError, Result};

/// Default browser-like user agent
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default cap on a response body
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// HTTP client settings
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Maximum redirects to follow
    pub max_redirects: usize,

    /// Per-request timeout
    pub timeout: Duration,

    /// Largest response body accepted
    pub max_bytes: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
            timeout: Duration::from_secs(30),
            max_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// A fetched text response
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: String,

    /// Content-Type header, if the server sent one
    pub content_type: Option<String>,

    /// Decoded body
    pub body: String,
}

impl FetchedPage {
    /// Whether the response looks like HTML
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.to_lowercase().contains("html"),
            None => {
                let head: String = self.body.chars().take(512).collect::<String>().to_lowercase();
                head.contains("<html") || head.contains("<!doctype html") || head.contains("<body")
            }
        }
    }
}

/// HTTP fetcher shared by network extractors
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    /// Build a fetcher from settings
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .build()
            .map_err(|e| KbError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
        })
    }

    /// Fetch `url` and decode the body as text.
    ///
    /// Fails with an extraction error on network errors, non-success
    /// status, non-text content types, bodies over the size cap, or bodies
    /// containing NUL bytes.
    pub async fn fetch_text(&self, url: &str) -> Result<FetchedPage> {
        self.fetch_text_if_found(url)
            .await?
            .ok_or_else(|| KbError::extraction(url, format!("HTTP {}", StatusCode::NOT_FOUND)))
    }

    /// Like [`fetch_text`](Self::fetch_text), but a 404 is `Ok(None)`
    pub async fn fetch_text_if_found(&self, url: &str) -> Result<Option<FetchedPage>> {
        debug!(url, "Fetching");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KbError::extraction(url, describe_reqwest_error(&e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(KbError::extraction(url, format!("HTTP {}", status)));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if let Some(ct) = &content_type {
            if !is_text_content_type(ct) {
                return Err(KbError::extraction(
                    url,
                    format!("Unsupported content type: {}", ct),
                ));
            }
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(too_large(url, self.max_bytes));
            }
        }

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| KbError::extraction(url, format!("Failed to read response body: {}", e)))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large(url, self.max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();

        if body.contains('\0') {
            return Err(KbError::extraction(url, "Response body is not text"));
        }

        Ok(Some(FetchedPage {
            final_url,
            content_type,
            body,
        }))
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

fn too_large(url: &str, max_bytes: u64) -> KbError {
    KbError::extraction(url, format!("Response body exceeds {} bytes", max_bytes))
}

/// Whether a Content-Type header denotes a text payload we can parse
pub fn is_text_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    mime.starts_with("text/")
        || mime == "application/json"
        || mime == "application/xml"
        || mime == "application/xhtml+xml"
        || mime == "application/x-ipynb+json"
        || mime.ends_with("+xml")
        || mime.ends_with("+json")
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("Request timed out: {}", e)
    } else if e.is_redirect() {
        format!("Too many redirects: {}", e)
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        format!("Request failed: {}", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_text_content_type() {
        assert!(is_text_content_type("text/html; charset=utf-8"));
        assert!(is_text_content_type("text/plain"));
        assert!(is_text_content_type("application/json"));
        assert!(is_text_content_type("application/atom+xml"));
        assert!(is_text_content_type("Application/XHTML+XML"));
        assert!(!is_text_content_type("application/pdf"));
        assert!(!is_text_content_type("image/png"));
        assert!(!is_text_content_type("application/octet-stream"));
    }

    #[test]
    fn test_is_html_sniffs_body_without_header() {
        let page = FetchedPage {
            final_url: "https://example.com".to_string(),
            content_type: None,
            body: "<!DOCTYPE html><html><body>hi</body></html>".to_string(),
        };
        assert!(page.is_html());

        let page = FetchedPage {
            content_type: Some("text/plain".to_string()),
            ..page
        };
        assert!(!page.is_html());
    }
}
