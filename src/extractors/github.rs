//! GitHub repository README and notebook extraction.
//!
//! Both extractors read from the raw content host rather than the HTML UI.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{strip_blank_lines, Extraction, Extractor, HttpFetcher};
use crate::domain::ContentType;
use crate::error::{KbError, Result};

/// Default raw content origin
pub const DEFAULT_RAW_BASE_URL: &str = "https://raw.githubusercontent.com";

const BRANCHES: &[&str] = &["main", "master"];

const README_VARIANTS: &[&str] = &["README.md", "readme.md", "Readme.md", "readMe.md", "README.MD"];

/// Split a github.com URL into its path segments, if it is one
fn github_segments(url: &str) -> Option<Vec<String>> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    match parsed.host_str()? {
        "github.com" | "www.github.com" => {}
        _ => return None,
    }
    Some(
        parsed
            .path_segments()?
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn path_of(url: &str) -> String {
    Url::parse(url.trim())
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default()
}

// ============================================================================
// Repository README
// ============================================================================

/// Extractor for GitHub repository landing pages
#[derive(Debug, Clone)]
pub struct GitHubRepoExtractor {
    http: HttpFetcher,
    raw_base_url: String,
}

impl GitHubRepoExtractor {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            raw_base_url: DEFAULT_RAW_BASE_URL.to_string(),
        }
    }

    /// Read raw files from a different origin
    pub fn with_raw_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.raw_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Owner and repository name from a GitHub URL
fn owner_and_repo(url: &str) -> Option<(String, String)> {
    let segments = github_segments(url)?;
    if segments.len() < 2 {
        return None;
    }
    let repo = segments[1].trim_end_matches(".git").to_string();
    if repo.is_empty() {
        return None;
    }
    Some((segments[0].clone(), repo))
}

#[async_trait]
impl Extractor for GitHubRepoExtractor {
    fn name(&self) -> &str {
        "github_repo"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Repository
    }

    fn can_handle(&self, url: &str) -> bool {
        let path = path_of(url);
        owner_and_repo(url).is_some() && !path.ends_with(".ipynb") && !path.ends_with(".pdf")
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<Extraction> {
        let (owner, repo) = owner_and_repo(url)
            .ok_or_else(|| KbError::extraction(url, "Not a GitHub repository URL"))?;

        // Reason of the last failure other than a 404
        let mut last_failure: Option<String> = None;

        for branch in BRANCHES {
            for variant in README_VARIANTS {
                let raw_url = format!(
                    "{}/{}/{}/{}/{}",
                    self.raw_base_url, owner, repo, branch, variant
                );
                match self.http.fetch_text_if_found(&raw_url).await {
                    Ok(Some(page)) => {
                        debug!(branch, readme = variant, "Found README");
                        return Ok(Extraction::new(
                            format!("{}/{}", owner, repo),
                            strip_blank_lines(&page.body),
                        )
                        .with_meta("owner", owner.clone())
                        .with_meta("repo", repo.clone())
                        .with_meta("branch", *branch)
                        .with_meta("readme", *variant));
                    }
                    Ok(None) => debug!(raw_url = %raw_url, "README candidate not found"),
                    Err(KbError::Extraction { reason, .. }) => {
                        warn!(raw_url = %raw_url, error = %reason, "README candidate failed");
                        last_failure = Some(reason);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let reason = match last_failure {
            Some(reason) => format!("Failed to fetch README: {}", reason),
            None => "README.md not found in GitHub repository".to_string(),
        };
        Err(KbError::extraction(url, reason))
    }
}

// ============================================================================
// Notebooks
// ============================================================================

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Debug, Deserialize)]
struct NotebookCell {
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

/// Cell source is either one string or a list of lines
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Text(String),
    Lines(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl CellSource {
    fn joined(&self) -> String {
        match self {
            CellSource::Text(text) => text.clone(),
            CellSource::Lines(lines) => lines.concat(),
        }
    }
}

/// Render notebook cells as `**<cell_type>**\n<source>` blocks
fn render_notebook(json: &str) -> std::result::Result<(String, usize), serde_json::Error> {
    let notebook: Notebook = serde_json::from_str(json)?;
    let rendered = notebook
        .cells
        .iter()
        .map(|cell| format!("**{}**\n{}", cell.cell_type, cell.source.joined()))
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok((rendered, notebook.cells.len()))
}

/// Extractor for `.ipynb` files hosted on GitHub
#[derive(Debug, Clone)]
pub struct GitHubNotebookExtractor {
    http: HttpFetcher,
    raw_base_url: String,
}

impl GitHubNotebookExtractor {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            raw_base_url: DEFAULT_RAW_BASE_URL.to_string(),
        }
    }

    /// Read raw files from a different origin
    pub fn with_raw_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.raw_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Map `github.com/<owner>/<repo>/blob/<ref>/<path>` to the raw host
    fn raw_url(&self, url: &str) -> Option<String> {
        let segments = github_segments(url)?;
        let rest: Vec<&str> = segments
            .iter()
            .enumerate()
            .filter(|(i, s)| !(*i == 2 && s.as_str() == "blob"))
            .map(|(_, s)| s.as_str())
            .collect();
        Some(format!("{}/{}", self.raw_base_url, rest.join("/")))
    }
}

#[async_trait]
impl Extractor for GitHubNotebookExtractor {
    fn name(&self) -> &str {
        "github_notebook"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Notebook
    }

    fn can_handle(&self, url: &str) -> bool {
        github_segments(url).is_some_and(|s| s.len() >= 3) && path_of(url).ends_with(".ipynb")
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<Extraction> {
        let raw_url = self
            .raw_url(url)
            .ok_or_else(|| KbError::extraction(url, "Not a GitHub notebook URL"))?;

        let page = self.http.fetch_text(&raw_url).await?;
        let (rendered, cell_count) = render_notebook(&page.body)
            .map_err(|e| KbError::extraction(url, format!("Invalid notebook JSON: {}", e)))?;

        let title = raw_url.rsplit('/').next().unwrap_or_default().to_string();

        Ok(Extraction::new(title, rendered)
            .with_meta("raw_url", raw_url)
            .with_meta("cell_count", cell_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::HttpSettings;

    fn http() -> HttpFetcher {
        HttpFetcher::new(&HttpSettings::default()).unwrap()
    }

    #[test]
    fn test_repo_can_handle() {
        let extractor = GitHubRepoExtractor::new(http());
        assert!(extractor.can_handle("https://github.com/rust-lang/rust"));
        assert!(extractor.can_handle("https://github.com/rust-lang/rust.git"));
        assert!(extractor.can_handle("https://github.com/rust-lang/rust/"));
        assert!(!extractor.can_handle("https://github.com/rust-lang"));
        assert!(!extractor.can_handle("https://github.com/u/r/blob/main/a.ipynb"));
        assert!(!extractor.can_handle("https://github.com/u/r/blob/main/paper.pdf"));
        assert!(!extractor.can_handle("https://gitlab.com/u/r"));
    }

    #[test]
    fn test_owner_and_repo() {
        assert_eq!(
            owner_and_repo("https://github.com/tokio-rs/tokio.git"),
            Some(("tokio-rs".to_string(), "tokio".to_string()))
        );
    }

    #[test]
    fn test_notebook_raw_url() {
        let extractor = GitHubNotebookExtractor::new(http());
        assert!(extractor.can_handle("https://github.com/u/r/blob/main/demo.ipynb"));
        assert!(!extractor.can_handle("https://github.com/u/r"));
        assert_eq!(
            extractor
                .raw_url("https://github.com/u/r/blob/main/nb/demo.ipynb")
                .as_deref(),
            Some("https://raw.githubusercontent.com/u/r/main/nb/demo.ipynb")
        );
    }

    #[test]
    fn test_render_notebook() {
        let json = r##"{"cells": [
            {"cell_type": "markdown", "source": ["# Title\n", "Intro"]},
            {"cell_type": "code", "source": "print(1)", "outputs": []}
        ], "nbformat": 4}"##;

        let (rendered, count) = render_notebook(json).unwrap();
        assert_eq!(count, 2);
        assert_eq!(rendered, "**markdown**\n# Title\nIntro\n\n**code**\nprint(1)");

        assert!(render_notebook("not json").is_err());
    }
}
