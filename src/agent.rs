//! # Agent Module
//!
//! The research controller. [`ResearchAgent::run`] owns one
//! [`ResearchSession`] and drives it through `depth` iterations of
//!
//! 1. query expansion,
//! 2. concurrent retrieval + URL dedup,
//! 3. concurrent content extraction,
//! 4. insight synthesis,
//!
//! before composing the final report. Failed searches, failed page fetches
//! and unusable model replies are absorbed here; a model call that fails
//! outright or an invalid request leaves `run` as `Err`.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ResearchLimits;
use crate::error::{ModelError, ResearchError, SynthesisFailure};
use crate::expander::QueryExpander;
use crate::extract::{ContentExtractor, ExtractedDocument};
use crate::llm::LanguageModel;
use crate::report::ReportComposer;
use crate::search::{Retriever, SearchProvider};
use crate::session::{ResearchOutcome, ResearchSession};
use crate::synthesizer::{truncate_chars, InsightSynthesizer, SynthesisResult};

/// Accepted range for both depth and breadth.
pub const MAX_DEPTH: usize = 5;
pub const MAX_BREADTH: usize = 5;

/// Placed between documents in the synthesis input.
const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

// =============================================================================
// RESEARCH REQUEST
// =============================================================================
/// What to research and how hard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchRequest {
    pub query: String,

    /// Number of sequential iterations (1..=5)
    pub depth: usize,

    /// Search queries generated per iteration (1..=5)
    pub breadth: usize,

    /// Findings known before the run starts
    pub existing_findings: Vec<String>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>, depth: usize, breadth: usize) -> Self {
        Self {
            query: query.into(),
            depth,
            breadth,
            existing_findings: Vec::new(),
        }
    }

    pub fn with_findings(mut self, findings: Vec<String>) -> Self {
        self.existing_findings = findings;
        self
    }

    fn validate(&self) -> Result<(), ResearchError> {
        if self.query.trim().is_empty() {
            return Err(ResearchError::InvalidRequest("query must not be empty".to_string()));
        }
        if !(1..=MAX_DEPTH).contains(&self.depth) {
            return Err(ResearchError::InvalidRequest(format!(
                "depth must be between 1 and {MAX_DEPTH}, got {}",
                self.depth
            )));
        }
        if !(1..=MAX_BREADTH).contains(&self.breadth) {
            return Err(ResearchError::InvalidRequest(format!(
                "breadth must be between 1 and {MAX_BREADTH}, got {}",
                self.breadth
            )));
        }
        Ok(())
    }
}

// =============================================================================
// RESEARCH AGENT
// =============================================================================
/// The research controller.
///
/// # Rust Concept: Trait Objects
///
/// The collaborators are held as `Arc<dyn Trait>`, so the same controller
/// runs against real HTTP/LLM backends in `main` and against in-memory fakes
/// in tests. The agent itself holds no per-run state; every call to
/// [`run`](Self::run) gets a fresh [`ResearchSession`], so concurrent runs
/// never share visited URLs or findings.
pub struct ResearchAgent {
    expander: QueryExpander,
    retriever: Retriever,
    extractor: Arc<dyn ContentExtractor>,
    synthesizer: InsightSynthesizer,
    composer: ReportComposer,
    limits: ResearchLimits,
    model_name: String,
}

impl ResearchAgent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        extractor: Arc<dyn ContentExtractor>,
        limits: ResearchLimits,
    ) -> Self {
        Self {
            model_name: model.name().to_string(),
            expander: QueryExpander::new(model.clone()),
            retriever: Retriever::new(search),
            extractor,
            synthesizer: InsightSynthesizer::new(model.clone(), limits.max_synthesis_chars),
            composer: ReportComposer::new(model),
            limits,
        }
    }

    /// Run a complete research session.
    pub async fn run(&self, request: ResearchRequest) -> Result<ResearchOutcome, ResearchError> {
        request.validate()?;

        info!(
            query = %request.query,
            model = %self.model_name,
            depth = request.depth,
            breadth = request.breadth,
            existing_findings = request.existing_findings.len(),
            "Starting research"
        );

        let mut session = ResearchSession::new(request.query, request.existing_findings);

        for iteration in 1..=request.depth {
            let span = info_span!("iteration", current = iteration, depth = request.depth);
            self.run_iteration(&mut session, request.breadth)
                .instrument(span)
                .await?;
        }

        info!(
            findings = session.findings().len(),
            visited = session.visited_count(),
            "Composing final report"
        );
        let report = self
            .composer
            .compose(session.original_query(), session.findings())
            .await;

        let outcome = session.into_outcome(report);
        info!(sources = outcome.sources.len(), "Research completed");
        Ok(outcome)
    }

    /// One expand -> retrieve -> extract -> synthesize pass.
    ///
    /// Starvation at any step ends the iteration early without an error;
    /// a failed model call does not.
    async fn run_iteration(
        &self,
        session: &mut ResearchSession,
        breadth: usize,
    ) -> Result<(), ResearchError> {
        // Step 1: search queries
        let queries = match self
            .expander
            .expand(session.current_context(), session.findings(), breadth)
            .await
        {
            Ok(queries) => queries,
            Err(e) => return Err(model_failure(session, e, "Query generation failed")),
        };
        if queries.is_empty() {
            info!("No search queries this iteration");
            return Ok(());
        }

        // Step 2: retrieval + dedup
        let per_query = self.limits.results_per_query;
        let results: Vec<Vec<String>> = stream::iter(queries.iter())
            .map(|query| self.retriever.search(query, per_query))
            .buffered(self.limits.max_concurrency)
            .collect()
            .await;

        let new_urls = session.admit_new_urls(results.into_iter().flatten());
        if new_urls.is_empty() {
            info!("No new URLs to explore this iteration");
            return Ok(());
        }
        info!(count = new_urls.len(), "Found new URLs to extract");

        // Step 3: extraction
        let extractions: Vec<_> = stream::iter(new_urls.iter())
            .map(|url| self.extractor.extract(url))
            .buffered(self.limits.max_concurrency)
            .collect()
            .await;

        let mut documents: Vec<ExtractedDocument> = Vec::new();
        for (url, extraction) in new_urls.iter().zip(extractions) {
            match extraction {
                Ok(document) if !document.text.trim().is_empty() => {
                    debug!(url = %url, final_url = %document.url, chars = document.text.len(), "Page extracted");
                    session.record_source(url);
                    documents.push(document);
                }
                Ok(_) => debug!(url = %url, "Extraction returned no text"),
                Err(e) => debug!(url = %url, error = %e, "Skipping URL"),
            }
        }
        if documents.is_empty() {
            warn!("Could not extract content from any page this iteration");
            return Ok(());
        }
        info!(pages = documents.len(), "Extracted page content");

        // Step 4: synthesis
        let combined = documents
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join(DOCUMENT_SEPARATOR);
        let text = truncate_chars(&combined, self.limits.max_synthesis_chars);
        if text.len() < combined.len() {
            warn!(
                total_chars = combined.chars().count(),
                kept_chars = self.limits.max_synthesis_chars,
                "Combined page text truncated"
            );
        }

        let result = match self
            .synthesizer
            .synthesize(session.current_context(), session.findings(), text)
            .await
        {
            Ok(result) => result,
            Err(SynthesisFailure::Model(e)) => return Err(model_failure(session, e, "Synthesis failed")),
            Err(e) => {
                warn!(error = %e, "Unusable synthesis reply; no findings this iteration");
                SynthesisResult::default()
            }
        };

        let new_findings = result.findings.len();
        session.absorb(result);
        info!(
            new_findings,
            directions = ?session.last_directions(),
            "Iteration complete"
        );
        Ok(())
    }
}

/// A model call that produced no reply at all ends the run.
fn model_failure(session: &ResearchSession, error: ModelError, what: &str) -> ResearchError {
    error!(query = %session.original_query(), error = %error, "{what}; aborting research");
    ResearchError::Model {
        query: session.original_query().to_string(),
        source: error,
    }
}
