//! # Search Module
//!
//! Web search in two layers:
//! - [`SearchProvider`]: a raw provider (DuckDuckGo's HTML endpoint here)
//!   that may fail and may return junk.
//! - [`Retriever`]: the research-facing contract. It over-fetches, drops
//!   malformed candidates, normalizes URLs, truncates to the requested
//!   limit, and turns every provider failure into an empty result.

use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SearchError;

/// Browser-like identity sent with every outgoing request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Raw candidates requested per wanted result.
const OVERFETCH_FACTOR: usize = 2;

// =============================================================================
// SEARCH HIT
// =============================================================================
/// One candidate document location returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
}

impl SearchHit {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

// =============================================================================
// PROVIDER TRAIT
// =============================================================================
/// A text search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return up to roughly `max_results` candidates for `query`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError>;
}

// =============================================================================
// DUCKDUCKGO PROVIDER
// =============================================================================
/// Search through DuckDuckGo's keyless HTML endpoint.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub const DEFAULT_ENDPOINT: &'static str = "https://html.duckduckgo.com/html/";

    pub fn new(timeout: Duration) -> Result<Self, SearchError> {
        Self::with_endpoint(Self::DEFAULT_ENDPOINT, timeout)
    }

    /// Point the provider at a different endpoint (used by tests).
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        debug!(query = %query, endpoint = %self.endpoint, "Fetching search results");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .header(reqwest::header::ACCEPT, "text/html")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            return Err(SearchError::Http(status));
        }

        let body = response.text().await?;
        Ok(parse_result_page(&body, max_results))
    }
}

/// Pull result URLs out of a DuckDuckGo HTML result page.
///
/// Result anchors (`a.result__a`) are read first; if the markup changed and
/// none are found, raw `uddg=` redirect parameters are scanned instead.
fn parse_result_page(html: &str, max_results: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    // `Html` is !Send; it stays inside this synchronous function.
    let document = Html::parse_document(html);
    if let Ok(selector) = Selector::parse("a.result__a") {
        for anchor in document.select(&selector) {
            if hits.len() >= max_results {
                break;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if let Some(url) = resolve_result_href(href) {
                if seen.insert(url.clone()) {
                    hits.push(SearchHit::new(url));
                }
            }
        }
    }

    if hits.is_empty() {
        for segment in html.split("uddg=").skip(1) {
            if hits.len() >= max_results {
                break;
            }
            let end = segment
                .find(|c: char| c == '&' || c == '"' || c == '\'')
                .unwrap_or(segment.len());
            if let Ok(decoded) = urlencoding::decode(&segment[..end]) {
                let url = decoded.into_owned();
                if is_external(&url) && seen.insert(url.clone()) {
                    hits.push(SearchHit::new(url));
                }
            }
        }
    }

    hits
}

/// Turn a result anchor's `href` into the target URL.
///
/// DuckDuckGo wraps targets in `//duckduckgo.com/l/?uddg=<encoded>&...`.
fn resolve_result_href(href: &str) -> Option<String> {
    if let Some(start) = href.find("uddg=") {
        let encoded = &href[start + "uddg=".len()..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        let decoded = urlencoding::decode(encoded).ok()?.into_owned();
        return is_external(&decoded).then_some(decoded);
    }

    let url = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        href.to_string()
    };
    is_external(&url).then_some(url)
}

fn is_external(url: &str) -> bool {
    url.starts_with("http") && !url.contains("duckduckgo.com")
}

// =============================================================================
// RETRIEVER
// =============================================================================
/// The research loop's view of search: bounded, normalized, infallible.
#[derive(Clone)]
pub struct Retriever {
    provider: Arc<dyn SearchProvider>,
}

impl Retriever {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }

    /// Return at most `limit` normalized URLs for `query`.
    ///
    /// Provider failures are logged and produce an empty list.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }

        info!(query = %query, limit, "Performing web search");

        let hits = match self.provider.search(query, limit * OVERFETCH_FACTOR).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(query = %query, error = %e, "Search failed; treating as no results");
                return Vec::new();
            }
        };

        let raw = hits.len();
        let urls: Vec<String> = hits
            .into_iter()
            .filter_map(|hit| {
                let normalized = normalize_url(&hit.url);
                if normalized.is_none() {
                    debug!(url = %hit.url, "Dropping malformed search result");
                }
                normalized
            })
            .take(limit)
            .collect();

        if urls.is_empty() {
            warn!(query = %query, raw, "No usable search results");
        } else {
            info!(query = %query, raw, kept = urls.len(), "Search completed");
        }

        urls
    }
}

/// Canonical form of a candidate URL, or `None` if it is malformed.
///
/// Scheme-less candidates are assumed to be `https`. Only `http`/`https`
/// locations with a host are accepted. Fragments are dropped, so two links to
/// different anchors of one page count as the same document.
pub fn normalize_url(raw: &str) -> Option<String> {
    let candidate = raw.trim();
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return None;
    }

    // `example.com:8080/x` parses with scheme "example.com"; a dotted scheme is really a host.
    let with_scheme = match Url::parse(candidate) {
        Ok(url) if !url.scheme().contains('.') => candidate.to_string(),
        _ => format!("https://{candidate}"),
    };

    let mut url = Url::parse(&with_scheme).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}
