//! Hugging Face model card extraction.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::instrument;
use url::Url;

use super::web::page_text;
use super::{Extraction, Extractor, HttpFetcher};
use crate::domain::ContentType;
use crate::error::Result;

/// Extractor for pages hosted on huggingface.co
#[derive(Debug, Clone)]
pub struct HuggingFaceExtractor {
    http: HttpFetcher,
}

impl HuggingFaceExtractor {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Extractor for HuggingFaceExtractor {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Model
    }

    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url.trim())
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .is_some_and(|host| host == "huggingface.co" || host.ends_with(".huggingface.co"))
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<Extraction> {
        let page = self.http.fetch_text(url).await?;

        let sections = card_sections(&page.body);
        let parsed = page_text(&page.body);

        // Pages without h2 headings still yield their readable text
        let body = if sections.is_empty() {
            parsed.text
        } else {
            sections
                .iter()
                .map(|(heading, text)| format!("**{}**\n{}", heading, text))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let title = parsed
            .title
            .strip_suffix(" · Hugging Face")
            .map(str::to_string)
            .unwrap_or(parsed.title);

        Ok(Extraction::new(title, body)
            .with_meta("final_url", page.final_url)
            .with_meta("section_count", sections.len()))
    }
}

/// Each `h2` heading with the text of the siblings up to the next `h2`
fn card_sections(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let Ok(h2) = Selector::parse("h2") else {
        return Vec::new();
    };

    document
        .select(&h2)
        .filter_map(|heading| {
            let title = element_text(heading);
            if title.is_empty() {
                return None;
            }

            let content = heading
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .take_while(|sibling| sibling.value().name() != "h2")
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(" ");

            Some((title, content))
        })
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::HttpSettings;

    #[test]
    fn test_can_handle() {
        let extractor = HuggingFaceExtractor::new(HttpFetcher::new(&HttpSettings::default()).unwrap());
        assert!(extractor.can_handle("https://huggingface.co/meta-llama/Llama-2-7b"));
        assert!(extractor.can_handle("https://HuggingFace.co/org/model"));
        assert!(!extractor.can_handle("https://example.com/huggingface.co"));
    }

    #[test]
    fn test_card_sections() {
        let html = r#"<html><body><div class="card">
            <h1>my-model</h1>
            <h2>Model description</h2>
            <p>A small   model.</p>
            <ul><li>fast</li><li>tiny</li></ul>
            <h2>Usage</h2>
            <pre>pip install x</pre>
            <h2> </h2>
        </div></body></html>"#;

        let sections = card_sections(html);
        assert_eq!(
            sections,
            vec![
                (
                    "Model description".to_string(),
                    "A small model. fast tiny".to_string()
                ),
                ("Usage".to_string(), "pip install x".to_string()),
            ]
        );
    }
}
