//! # Error Types
//!
//! Every research component reports its failures as a typed value instead of
//! a panic or a stringly error. Only [`ResearchError`] ever escapes a research
//! run: search and extraction failures are recovered by the controller, a
//! model call that fails outright is not.

use thiserror::Error;

// =============================================================================
// LANGUAGE MODEL ERRORS
// =============================================================================
/// Failure talking to the language model backend.
///
/// An empty reply (blocked or filtered generation) is *not* an error: the
/// backend returns `Ok(String::new())` and each caller decides what empty
/// means for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Network/protocol trouble: unreachable server, timeout, 5xx.
    #[error("model request failed: {0}")]
    Transport(String),

    /// Missing credentials, unknown model, rejected API key.
    #[error("model is misconfigured: {0}")]
    Configuration(String),
}

impl ModelError {
    /// Whether retrying cannot help until the user fixes their settings.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ModelError::Configuration(_))
    }
}

// =============================================================================
// SEARCH ERRORS
// =============================================================================
/// Failure of a single search provider request.
///
/// These never leave the retriever: a failed search is an empty result list.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search provider returned HTTP {0}")]
    Http(reqwest::StatusCode),

    #[error("rate limited by search provider, please wait")]
    RateLimited,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

// =============================================================================
// EXTRACTION FAILURES
// =============================================================================
/// Why a document produced no usable text.
///
/// The controller does not distinguish between these; they exist for logs.
#[derive(Error, Debug)]
pub enum ExtractionFailure {
    #[error("HTTP {0}")]
    Http(reqwest::StatusCode),

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("not an HTML document (content type: {0:?})")]
    NotHtml(String),

    /// Also covers markup without a body: the HTML parser always
    /// synthesizes one, so such input simply yields no content elements.
    #[error("no readable text after cleaning")]
    Empty,
}

// =============================================================================
// SYNTHESIS FAILURES
// =============================================================================
/// Why the insight synthesizer could not produce findings.
#[derive(Error, Debug)]
pub enum SynthesisFailure {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("model reply is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("model reply is missing `learnings`/`directions` arrays")]
    WrongShape,
}

// =============================================================================
// RUN-LEVEL ERRORS
// =============================================================================
/// Fatal failure of a research run. No partial outcome accompanies it.
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("invalid research request: {0}")]
    InvalidRequest(String),

    #[error("research for {query:?} aborted: {source}")]
    Model {
        query: String,
        #[source]
        source: ModelError,
    },
}
