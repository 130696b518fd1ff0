//! YouTube video extraction.
//!
//! The watch page embeds `ytInitialPlayerResponse`, which carries the video
//! details and the caption track list. The preferred caption track becomes
//! the record body; videos without captions fall back to the description.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{Extraction, Extractor, HttpFetcher};
use crate::domain::ContentType;
use crate::error::{KbError, Result};

/// Default origin for watch pages
pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

/// Caption languages in order of preference
const PREFERRED_LANGUAGES: &[&str] = &["en", "en-US", "zh-Hans", "zh-Hant"];

const PLAYER_RESPONSE_MARKER: &str = "ytInitialPlayerResponse = ";

static VIDEO_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.|m\.)?(?:(?:youtube\.com|youtube-nocookie\.com)/(?:watch\?(?:[^#]*&)?v=|embed/|v/|shorts/)|youtu\.be/)([A-Za-z0-9_-]{11})(?:[&?#/]|$)",
    )
    .expect("video id regex")
});

static TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>([^<]+)</title>").expect("title regex"));

static CAPTION_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("caption regex"));

static NUMERIC_ENTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("entity regex"));

/// Extract the 11-character video id from a YouTube URL
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_REGEX
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// Player response
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    #[serde(default)]
    playability_status: Option<PlayabilityStatus>,
    #[serde(default)]
    video_details: Option<VideoDetails>,
    #[serde(default)]
    captions: Option<Captions>,
}

#[derive(Debug, Default, Deserialize)]
struct PlayabilityStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    length_seconds: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    #[serde(default)]
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<CaptionTrack>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,
}

impl PlayerResponse {
    fn caption_tracks(&self) -> &[CaptionTrack] {
        self.captions
            .as_ref()
            .and_then(|c| c.player_captions_tracklist_renderer.as_ref())
            .map(|r| r.caption_tracks.as_slice())
            .unwrap_or(&[])
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// Extractor for YouTube videos
#[derive(Debug, Clone)]
pub struct YouTubeExtractor {
    http: HttpFetcher,
    base_url: String,
}

impl YouTubeExtractor {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Fetch watch pages from a different origin
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_transcript(&self, track: &CaptionTrack) -> Result<String> {
        let caption_url = if track.base_url.starts_with("http") {
            track.base_url.clone()
        } else {
            format!("{}{}", self.base_url, track.base_url)
        };

        let page = self.http.fetch_text(&caption_url).await?;
        Ok(parse_caption_xml(&page.body))
    }
}

#[async_trait]
impl Extractor for YouTubeExtractor {
    fn name(&self) -> &str {
        "youtube"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Video
    }

    fn can_handle(&self, url: &str) -> bool {
        extract_video_id(url).is_some()
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<Extraction> {
        let video_id = extract_video_id(url)
            .ok_or_else(|| KbError::extraction(url, "Could not find a video id"))?;

        let watch_url = format!("{}/watch?v={}", self.base_url, video_id);
        let page = self.http.fetch_text(&watch_url).await?;

        let json = find_player_response(&page.body)
            .ok_or_else(|| KbError::extraction(url, "Player response not found in watch page"))?;
        let player: PlayerResponse = serde_json::from_str(json)
            .map_err(|e| KbError::extraction(url, format!("Malformed player response: {}", e)))?;

        if let Some(status) = &player.playability_status {
            if status.status.as_deref() == Some("ERROR") {
                let reason = status.reason.as_deref().unwrap_or("Video unavailable");
                return Err(KbError::extraction(url, reason));
            }
        }

        let details = player.video_details.as_ref();
        let title = details
            .and_then(|d| d.title.clone())
            .or_else(|| page_title(&page.body))
            .unwrap_or_default();
        let channel = details.and_then(|d| d.author.clone()).unwrap_or_default();
        let description = details
            .and_then(|d| d.short_description.clone())
            .unwrap_or_default();
        let duration_seconds = details
            .and_then(|d| d.length_seconds.as_deref())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let mut transcript = String::new();
        let mut transcript_language = None;
        if let Some(track) = pick_caption_track(player.caption_tracks()) {
            match self.fetch_transcript(track).await {
                Ok(text) if !text.is_empty() => {
                    transcript = text;
                    transcript_language = Some(track.language_code.clone());
                }
                Ok(_) => debug!(video_id = %video_id, "Caption track was empty"),
                Err(e) => warn!(video_id = %video_id, error = %e, "Failed to fetch captions, using description"),
            }
        }

        let transcript_available = !transcript.is_empty();
        let body = if transcript_available {
            transcript
        } else {
            description.clone()
        };

        let mut extraction = Extraction::new(title, body)
            .with_meta("video_id", video_id)
            .with_meta("channel", channel)
            .with_meta("duration_seconds", duration_seconds)
            .with_meta("description", description)
            .with_meta("transcript_available", transcript_available);

        if let Some(language) = transcript_language {
            extraction = extraction.with_meta("transcript_language", language);
        }

        Ok(extraction)
    }
}

/// Locate the player response JSON object by brace counting
fn find_player_response(html: &str) -> Option<&str> {
    let start = html.find(PLAYER_RESPONSE_MARKER)? + PLAYER_RESPONSE_MARKER.len();
    let remaining = &html[start..];
    if !remaining.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in remaining.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&remaining[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn page_title(html: &str) -> Option<String> {
    TITLE_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            let title = decode_entities(m.as_str().trim());
            title
                .strip_suffix(" - YouTube")
                .map(str::to_string)
                .unwrap_or(title)
        })
        .filter(|t| !t.is_empty())
}

fn pick_caption_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    PREFERRED_LANGUAGES
        .iter()
        .find_map(|lang| tracks.iter().find(|t| t.language_code == *lang))
        .or_else(|| tracks.first())
}

/// Join timed-text caption lines with ", "
fn parse_caption_xml(xml: &str) -> String {
    CAPTION_LINE_REGEX
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            decode_entities(m.as_str())
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn decode_entities(s: &str) -> String {
    // Caption payloads are often entity-encoded twice
    let once = decode_entities_once(s);
    if once.contains('&') {
        decode_entities_once(&once)
    } else {
        once
    }
}

fn decode_entities_once(s: &str) -> String {
    let numeric = NUMERIC_ENTITY_REGEX.replace_all(s, |caps: &regex::Captures| {
        let code = &caps[1];
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    });

    numeric
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id_accepts_known_forms() {
        let accepted = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/v/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
        ];
        for url in accepted {
            assert_eq!(extract_video_id(url).as_deref(), Some("dQw4w9WgXcQ"), "{}", url);
        }
    }

    #[test]
    fn test_extract_video_id_rejects_invalid() {
        let rejected = [
            "https://youtube.com",
            "https://youtu.be/",
            "https://youtube.com/watch",
            "https://notyoutube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?v=short",
            "https://youtube.com/watch?v=dQw4w9WgXcQextra",
        ];
        for url in rejected {
            assert!(extract_video_id(url).is_none(), "{}", url);
        }
    }

    #[test]
    fn test_find_player_response_handles_nesting_and_escapes() {
        let html = r#"<script>var ytInitialPlayerResponse = {"a":{"b":"x \"}\" y"},"c":"é"};var other = {};</script>"#;
        assert_eq!(
            find_player_response(html),
            Some(r#"{"a":{"b":"x \"}\" y"},"c":"é"}"#)
        );

        assert!(find_player_response("<html></html>").is_none());
        assert!(find_player_response(r#"ytInitialPlayerResponse = {"open":"#).is_none());
    }

    #[test]
    fn test_pick_caption_track_prefers_languages() {
        let track = |lang: &str| CaptionTrack {
            base_url: format!("/tt?lang={}", lang),
            language_code: lang.to_string(),
        };

        let tracks = vec![track("de"), track("zh-Hans"), track("en-US")];
        assert_eq!(pick_caption_track(&tracks).unwrap().language_code, "en-US");

        let tracks = vec![track("de"), track("fr")];
        assert_eq!(pick_caption_track(&tracks).unwrap().language_code, "de");

        assert!(pick_caption_track(&[]).is_none());
    }

    #[test]
    fn test_parse_caption_xml() {
        let xml = r#"<?xml version="1.0"?><transcript>
            <text start="0" dur="1.5">Never gonna</text>
            <text start="1.5" dur="2">give you &amp;#39;up&amp;#39;</text>
            <text start="3.5" dur="1">  </text>
            <text start="4" dur="1">let&#39;s
            go</text></transcript>"#;

        assert_eq!(
            parse_caption_xml(xml),
            "Never gonna, give you 'up', let's go"
        );
    }

    #[test]
    fn test_page_title_strips_suffix() {
        assert_eq!(
            page_title("<title>Song &amp; Dance - YouTube</title>").as_deref(),
            Some("Song & Dance")
        );
        assert!(page_title("<html></html>").is_none());
    }
}
