//! # Content Extraction Module
//!
//! Fetches a document and reduces it to plain narrative text: paragraphs,
//! headings and list items, with page chrome (scripts, navigation, footers,
//! forms...) removed. Every way this can go wrong is an
//! [`ExtractionFailure`]; none of them are fatal to a research run.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ExtractionFailure;
use crate::search::USER_AGENT;

/// Subtrees that never contribute text.
const SKIPPED_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "aside", "form"];

/// Elements whose text is collected.
const CONTENT_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, li";

// =============================================================================
// EXTRACTED DOCUMENT
// =============================================================================
/// Readable text of one document. `text` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub url: String,
    pub text: String,
}

// =============================================================================
// EXTRACTOR TRAIT
// =============================================================================
/// Fetch-and-extract collaborator used by the research controller.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ExtractedDocument, ExtractionFailure>;
}

// =============================================================================
// WEB PAGE EXTRACTOR
// =============================================================================
/// Extracts text from HTML pages over HTTP(S).
#[derive(Debug, Clone)]
pub struct WebPageExtractor {
    client: reqwest::Client,
}

impl WebPageExtractor {
    pub fn new(timeout: Duration) -> Result<Self, ExtractionFailure> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }

    async fn fetch_and_extract(&self, url: &str) -> Result<ExtractedDocument, ExtractionFailure> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionFailure::Http(status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.contains("html") {
            return Err(ExtractionFailure::NotHtml(content_type));
        }

        let body = response.text().await?;
        let text = html_to_text(&body)?;

        Ok(ExtractedDocument {
            url: url.to_string(),
            text,
        })
    }
}

#[async_trait]
impl ContentExtractor for WebPageExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedDocument, ExtractionFailure> {
        info!(url = %url, "Extracting page content");

        match self.fetch_and_extract(url).await {
            Ok(document) => {
                info!(url = %url, chars = document.text.chars().count(), "Extracted page content");
                Ok(document)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Extraction failed");
                Err(e)
            }
        }
    }
}

// =============================================================================
// HTML -> TEXT
// =============================================================================
/// Reduce an HTML document to newline-separated content text.
///
/// Text is collected from `p`, `h1`-`h6` and `li` elements inside `<body>`,
/// in document order, skipping anything under a [`SKIPPED_TAGS`] element.
/// Each element's text is whitespace-normalized on its own.
pub fn html_to_text(html: &str) -> Result<String, ExtractionFailure> {
    let document = Html::parse_document(html);

    // html5ever always produces a <body>, even for fragments and plain text.
    let body_selector = Selector::parse("body").map_err(|_| ExtractionFailure::Empty)?;
    let body = document
        .select(&body_selector)
        .next()
        .ok_or(ExtractionFailure::Empty)?;

    let content_selector = Selector::parse(CONTENT_SELECTOR).map_err(|_| ExtractionFailure::Empty)?;

    let parts: Vec<String> = body
        .select(&content_selector)
        .filter(|element| !inside_skipped(element))
        .map(|element| visible_text(&element))
        .filter(|text| !text.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(ExtractionFailure::Empty);
    }

    Ok(parts.join("\n"))
}

fn inside_skipped(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| SKIPPED_TAGS.contains(&ancestor.value().name()))
}

/// Whitespace-normalized text of `element`, minus skipped subtrees.
fn visible_text(element: &ElementRef<'_>) -> String {
    let mut buf = String::new();
    collect_text(element, &mut buf);
    buf.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: &ElementRef<'_>, buf: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                buf.push(' ');
                buf.push_str(text);
            }
            Node::Element(el) if SKIPPED_TAGS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(&child_ref, buf);
                }
            }
            _ => {}
        }
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE: &str = r#"<!DOCTYPE html>
        <html>
          <head><title>QEC</title><style>p { color: red }</style></head>
          <body>
            <header><h1>Site banner</h1></header>
            <nav><ul><li>Home</li><li>About</li></ul></nav>
            <h1>Quantum   error
                correction</h1>
            <p>Surface codes <b>protect</b> logical qubits.</p>
            <script>var tracking = "p";</script>
            <ul><li>Threshold ~1%</li><li>  </li></ul>
            <aside><p>Sponsored</p></aside>
            <form><p>Subscribe</p></form>
            <footer><p>Copyright</p></footer>
          </body>
        </html>"#;

    #[test]
    fn test_html_to_text_keeps_content_in_order() {
        let text = html_to_text(ARTICLE).unwrap();
        assert_eq!(
            text,
            "Quantum error correction\nSurface codes protect logical qubits.\nThreshold ~1%"
        );
    }

    #[test]
    fn test_html_to_text_skips_page_chrome() {
        let text = html_to_text(ARTICLE).unwrap();
        for noise in ["Site banner", "Home", "Sponsored", "Subscribe", "Copyright", "tracking"] {
            assert!(!text.contains(noise), "unexpected {noise:?} in {text:?}");
        }
    }

    #[test]
    fn test_html_without_content_is_empty() {
        let result = html_to_text("<html><body><div>just a div</div></body></html>");
        assert!(matches!(result, Err(ExtractionFailure::Empty)));
    }

    #[test]
    fn test_markup_without_body_falls_through_to_content_rules() {
        assert!(matches!(
            html_to_text("plain text, no markup at all"),
            Err(ExtractionFailure::Empty)
        ));
        assert!(matches!(
            html_to_text("<head><title>Only a head</title></head>"),
            Err(ExtractionFailure::Empty)
        ));
        assert_eq!(html_to_text("<p>A bare   fragment</p>").unwrap(), "A bare fragment");
    }

    #[tokio::test]
    async fn test_extract_from_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/qec"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let extractor = WebPageExtractor::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/qec", server.uri());
        let document = extractor.extract(&url).await.unwrap();

        assert_eq!(document.url, url);
        assert!(document.text.starts_with("Quantum error correction"));
    }

    #[tokio::test]
    async fn test_extract_404_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<html><body><p>Not found</p></body></html>"))
            .mount(&server)
            .await;

        let extractor = WebPageExtractor::new(Duration::from_secs(5)).unwrap();
        let result = extractor.extract(&format!("{}/missing", server.uri())).await;

        match result {
            Err(ExtractionFailure::Http(status)) => assert_eq!(status.as_u16(), 404),
            other => panic!("expected HTTP failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_extract_rejects_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"%PDF-1.7".to_vec(), "application/pdf"),
            )
            .mount(&server)
            .await;

        let extractor = WebPageExtractor::new(Duration::from_secs(5)).unwrap();
        let result = extractor.extract(&format!("{}/paper.pdf", server.uri())).await;
        assert!(matches!(result, Err(ExtractionFailure::NotHtml(_))));
    }

    #[tokio::test]
    async fn test_extract_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body><p>Moved here</p></body></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let extractor = WebPageExtractor::new(Duration::from_secs(5)).unwrap();
        let document = extractor.extract(&format!("{}/old", server.uri())).await.unwrap();
        assert_eq!(document.text, "Moved here");
    }
}
