//! HTTP Extractor Integration Tests
//!
//! Network extractors against a local mock server, plus one end-to-end
//! ingest through a mocked chat-completions provider.

use std::sync::Arc;

use kbase::extractors::{
    ArxivExtractor, GitHubNotebookExtractor, GitHubRepoExtractor, HttpFetcher, HttpSettings,
    HuggingFaceExtractor, WebPageExtractor, YouTubeExtractor,
};
use kbase::summarizer::openai::OpenAiSummarizer;
use kbase::{
    ContentManager, ContentType, Extractor, ExtractorRegistry, IngestOptions, KbError,
    SqliteContentStore,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VIDEO_ID: &str = "dQw4w9WgXcQ";

fn http() -> HttpFetcher {
    HttpFetcher::new(&HttpSettings::default()).unwrap()
}

fn capped_http(max_bytes: u64) -> HttpFetcher {
    HttpFetcher::new(&HttpSettings {
        max_bytes,
        ..HttpSettings::default()
    })
    .unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

const ARTICLE: &str = r#"<!doctype html>
<html>
<head>
  <title>Ferris Goes Async</title>
  <meta name="description" content="A crab learns about futures.">
</head>
<body>
  <nav>Home | Blog | About</nav>
  <article>
    <h1>Ferris Goes Async</h1>
    <p>Ferris wrote an executor.</p>
    <script>trackPageView();</script>
    <p>Then Ferris wrote a reactor.</p>
  </article>
  <footer>Copyright</footer>
</body>
</html>"#;

// ============================================================================
// Web pages
// ============================================================================

#[tokio::test]
async fn test_webpage_extracts_article_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(html(ARTICLE))
        .mount(&server)
        .await;

    let url = format!("{}/post", server.uri());
    let extraction = WebPageExtractor::new(http()).extract(&url).await.unwrap();

    assert_eq!(extraction.title, "Ferris Goes Async");
    assert!(extraction.raw_content.contains("Ferris wrote an executor."));
    assert!(extraction.raw_content.contains("Then Ferris wrote a reactor."));
    assert!(!extraction.raw_content.contains("trackPageView"));
    assert!(!extraction.raw_content.contains("Home | Blog"));
    assert_eq!(extraction.metadata["description"], "A crab learns about futures.");
    assert_eq!(extraction.metadata["final_url"], url.as_str());
    assert_eq!(extraction.metadata["http_content_type"], "text/html; charset=utf-8");
    assert!(!extraction.metadata.contains_key("content_type"));
}

#[tokio::test]
async fn test_webpage_plain_text_is_kept_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  line one\nline two  "))
        .mount(&server)
        .await;

    let extraction = WebPageExtractor::new(http())
        .extract(&format!("{}/notes.txt", server.uri()))
        .await
        .unwrap();

    assert_eq!(extraction.title, "");
    assert_eq!(extraction.raw_content, "line one\nline two");
}

#[tokio::test]
async fn test_webpage_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = format!("{}/gone", server.uri());
    let err = WebPageExtractor::new(http()).extract(&url).await.unwrap_err();

    assert!(matches!(err, KbError::Extraction { .. }));
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_webpage_rejects_binary_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.7".to_vec(), "application/pdf"))
        .mount(&server)
        .await;

    let err = WebPageExtractor::new(http())
        .extract(&format!("{}/paper.pdf", server.uri()))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Unsupported content type"));
}

#[tokio::test]
async fn test_webpage_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/post"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(html(ARTICLE))
        .mount(&server)
        .await;

    let extraction = WebPageExtractor::new(http())
        .extract(&format!("{}/old", server.uri()))
        .await
        .unwrap();

    assert_eq!(extraction.metadata["final_url"], format!("{}/post", server.uri()).as_str());
}

// ============================================================================
// YouTube
// ============================================================================

fn watch_page(player: serde_json::Value) -> String {
    format!(
        "<html><head><title>Never Gonna - YouTube</title></head><body><script>var ytInitialPlayerResponse = {};var meta = {{}};</script></body></html>",
        player
    )
}

#[tokio::test]
async fn test_youtube_uses_preferred_caption_track() {
    let server = MockServer::start().await;

    let player = json!({
        "playabilityStatus": {"status": "OK"},
        "videoDetails": {
            "title": "Never Gonna Give You Up",
            "author": "Rick Astley",
            "shortDescription": "Official video",
            "lengthSeconds": "213"
        },
        "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
            {"baseUrl": "/api/timedtext?v=dQw4w9WgXcQ&lang=de", "languageCode": "de"},
            {"baseUrl": "/api/timedtext?v=dQw4w9WgXcQ&lang=en", "languageCode": "en"}
        ]}}
    });

    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("v", VIDEO_ID))
        .respond_with(html(&watch_page(player)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<?xml version="1.0"?><transcript><text start="0" dur="2">Never gonna</text><text start="2" dur="2">give you &amp;#39;up&amp;#39;</text></transcript>"#
                .as_bytes()
                .to_vec(),
            "text/xml",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let extractor = YouTubeExtractor::new(http()).with_base_url(server.uri());
    let extraction = extractor
        .extract(&format!("https://youtu.be/{}", VIDEO_ID))
        .await
        .unwrap();

    assert_eq!(extraction.title, "Never Gonna Give You Up");
    assert_eq!(extraction.raw_content, "Never gonna, give you 'up'");
    assert_eq!(extraction.metadata["video_id"], VIDEO_ID);
    assert_eq!(extraction.metadata["channel"], "Rick Astley");
    assert_eq!(extraction.metadata["duration_seconds"], 213);
    assert_eq!(extraction.metadata["transcript_available"], true);
    assert_eq!(extraction.metadata["transcript_language"], "en");
}

#[tokio::test]
async fn test_youtube_falls_back_to_description() {
    let server = MockServer::start().await;

    let player = json!({
        "playabilityStatus": {"status": "OK"},
        "videoDetails": {"title": "Quiet video", "shortDescription": "No captions here"}
    });
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(html(&watch_page(player)))
        .mount(&server)
        .await;

    let extraction = YouTubeExtractor::new(http())
        .with_base_url(server.uri())
        .extract(&format!("https://www.youtube.com/watch?v={}", VIDEO_ID))
        .await
        .unwrap();

    assert_eq!(extraction.raw_content, "No captions here");
    assert_eq!(extraction.metadata["transcript_available"], false);
    assert!(!extraction.metadata.contains_key("transcript_language"));
}

#[tokio::test]
async fn test_youtube_unavailable_video() {
    let server = MockServer::start().await;

    let player = json!({"playabilityStatus": {"status": "ERROR", "reason": "Video unavailable"}});
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(html(&watch_page(player)))
        .mount(&server)
        .await;

    let err = YouTubeExtractor::new(http())
        .with_base_url(server.uri())
        .extract(&format!("https://youtu.be/{}", VIDEO_ID))
        .await
        .unwrap_err();

    assert!(matches!(err, KbError::Extraction { .. }));
    assert!(err.to_string().contains("Video unavailable"));
}

// ============================================================================
// arXiv
// ============================================================================

#[tokio::test]
async fn test_arxiv_queries_export_api() {
    let server = MockServer::start().await;

    let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All You Need</title>
    <summary>The dominant sequence transduction models...</summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
  </entry>
</feed>"#;

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("id_list", "1706.03762"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(feed.as_bytes().to_vec(), "application/atom+xml"))
        .expect(1)
        .mount(&server)
        .await;

    let extraction = ArxivExtractor::new(http())
        .with_base_url(server.uri())
        .extract("https://arxiv.org/pdf/1706.03762")
        .await
        .unwrap();

    assert_eq!(extraction.title, "Attention Is All You Need");
    assert!(extraction.raw_content.starts_with("Title:Attention Is All You Need\n"));
    assert!(extraction.raw_content.contains("Authors:Ashish Vaswani, Noam Shazeer\n"));
    assert_eq!(extraction.metadata["arxiv_id"], "1706.03762");
    assert_eq!(extraction.metadata["authors"], json!(["Ashish Vaswani", "Noam Shazeer"]));
}

#[tokio::test]
async fn test_arxiv_unknown_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<feed><entry><title>Error</title><summary>incorrect id format</summary></entry></feed>"
                .as_bytes()
                .to_vec(),
            "application/atom+xml",
        ))
        .mount(&server)
        .await;

    let err = ArxivExtractor::new(http())
        .with_base_url(server.uri())
        .extract("https://arxiv.org/abs/9999.99999")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("No paper found"));
}

// ============================================================================
// Response size cap
// ============================================================================

#[tokio::test]
async fn test_body_over_cap_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let url = format!("{}/big.txt", server.uri());
    let err = WebPageExtractor::new(capped_http(1024))
        .extract(&url)
        .await
        .unwrap_err();

    assert!(matches!(err, KbError::Extraction { .. }));
    assert!(err.to_string().contains("exceeds 1024 bytes"), "{}", err);

    // Exactly at the cap is accepted
    let page = capped_http(4096).fetch_text(&url).await.unwrap();
    assert_eq!(page.body.len(), 4096);
}

/// Serve one chunked response without a Content-Length header
async fn serve_chunked(chunks: usize, chunk_size: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let mut response = String::from(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        );
        let chunk = "y".repeat(chunk_size);
        for _ in 0..chunks {
            response.push_str(&format!("{:x}\r\n{}\r\n", chunk.len(), chunk));
        }
        response.push_str("0\r\n\r\n");
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{}/stream.txt", addr)
}

#[tokio::test]
async fn test_streamed_body_over_cap_is_rejected() {
    let url = serve_chunked(8, 512).await;

    let err = capped_http(1024).fetch_text(&url).await.unwrap_err();

    assert!(matches!(err, KbError::Extraction { .. }));
    assert!(err.to_string().contains("exceeds 1024 bytes"), "{}", err);
}

#[tokio::test]
async fn test_streamed_body_under_cap_is_read() {
    let url = serve_chunked(2, 512).await;

    let page = capped_http(1024).fetch_text(&url).await.unwrap();

    assert_eq!(page.body, "y".repeat(1024));
}

// ============================================================================
// GitHub
// ============================================================================

#[tokio::test]
async fn test_github_repo_falls_back_to_master_branch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/octo/demo/master/README.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# Demo\n\n\nA demo repository.\n"))
        .mount(&server)
        .await;

    let extraction = GitHubRepoExtractor::new(http())
        .with_raw_base_url(server.uri())
        .extract("https://github.com/octo/demo.git")
        .await
        .unwrap();

    assert_eq!(extraction.title, "octo/demo");
    assert_eq!(extraction.raw_content, "# Demo\nA demo repository.");
    assert_eq!(extraction.metadata["branch"], "master");
    assert_eq!(extraction.metadata["readme"], "README.md");
}

#[tokio::test]
async fn test_github_repo_without_readme() {
    let server = MockServer::start().await;

    let err = GitHubRepoExtractor::new(http())
        .with_raw_base_url(server.uri())
        .extract("https://github.com/octo/empty")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("README.md not found"));
}

#[tokio::test]
async fn test_github_repo_reports_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = GitHubRepoExtractor::new(http())
        .with_raw_base_url(server.uri())
        .extract("https://github.com/octo/flaky")
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.url(), Some("https://github.com/octo/flaky"));
    assert!(err.to_string().contains("503"), "{}", err);
    assert!(!err.to_string().contains("not found"), "{}", err);
}

#[tokio::test]
async fn test_github_repo_reports_connection_failure() {
    // Bind then drop to get a port nothing listens on
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

    let err = GitHubRepoExtractor::new(http())
        .with_raw_base_url(format!("http://{}", addr))
        .extract("https://github.com/octo/demo")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Connection failed"), "{}", err);
    assert!(!err.to_string().contains("not found"), "{}", err);
}

#[tokio::test]
async fn test_github_notebook_renders_cells() {
    let server = MockServer::start().await;

    let notebook = json!({
        "cells": [
            {"cell_type": "markdown", "source": ["# Title\n", "Intro"]},
            {"cell_type": "code", "source": "print(1)"}
        ],
        "nbformat": 4
    });
    Mock::given(method("GET"))
        .and(path("/octo/demo/main/nb/intro.ipynb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(notebook))
        .mount(&server)
        .await;

    let extraction = GitHubNotebookExtractor::new(http())
        .with_raw_base_url(server.uri())
        .extract("https://github.com/octo/demo/blob/main/nb/intro.ipynb")
        .await
        .unwrap();

    assert_eq!(extraction.title, "intro.ipynb");
    assert_eq!(
        extraction.raw_content,
        "**markdown**\n# Title\nIntro\n\n**code**\nprint(1)"
    );
    assert_eq!(extraction.metadata["cell_count"], 2);
}

// ============================================================================
// Hugging Face
// ============================================================================

#[tokio::test]
async fn test_huggingface_extracts_card_sections() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/org/model"))
        .respond_with(html(
            r#"<html><head><title>org/model · Hugging Face</title></head><body>
<div class="model-card">
  <h2>Model description</h2><p>A small model.</p><p>Trained on text.</p>
  <h2>Limitations</h2><p>Hallucinates.</p>
</div></body></html>"#,
        ))
        .mount(&server)
        .await;

    // Hosts other than huggingface.co are only reachable by calling extract directly
    let extraction = HuggingFaceExtractor::new(http())
        .extract(&format!("{}/org/model", server.uri()))
        .await
        .unwrap();

    assert_eq!(extraction.title, "org/model");
    assert_eq!(
        extraction.raw_content,
        "**Model description**\nA small model. Trained on text.\n\n**Limitations**\nHallucinates."
    );
    assert_eq!(extraction.metadata["section_count"], 2);
}

// ============================================================================
// End to end
// ============================================================================

fn chat_completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
    })
}

#[tokio::test]
async fn test_ingest_webpage_with_openai_summary() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(html(ARTICLE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("separated by commas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("Rust, Executors, async")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Ferris wrote an executor."))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("A crab builds an async runtime.")))
        .expect(1)
        .mount(&server)
        .await;

    let mut registry = ExtractorRegistry::new();
    registry.register(WebPageExtractor::new(http()));
    let summarizer = OpenAiSummarizer::new()
        .with_base_url(server.uri())
        .with_api_key("sk-test");
    let manager = ContentManager::new(
        registry,
        Arc::new(summarizer),
        Arc::new(SqliteContentStore::open_in_memory().unwrap()),
    );

    let record = manager
        .ingest(&format!("{}/post", server.uri()), IngestOptions::new().with_tag("crabs"))
        .await
        .unwrap();

    assert_eq!(record.content_type, ContentType::Webpage);
    assert_eq!(record.title, "Ferris Goes Async");
    assert_eq!(record.summary, "A crab builds an async runtime.");
    let keywords: Vec<_> = record.keywords.iter().map(String::as_str).collect();
    assert_eq!(keywords, vec!["async", "crabs", "executors", "rust"]);
    assert_eq!(record.metadata["summarizer"], "openai");
    assert_eq!(record.metadata["extractor"], "webpage");
}
