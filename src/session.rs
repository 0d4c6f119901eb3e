//! # Research Session
//!
//! The mutable state of one research run. A session is created by
//! [`ResearchAgent::run`](crate::agent::ResearchAgent::run), mutated only
//! between its suspension points, and consumed into a [`ResearchOutcome`].

use std::collections::{BTreeSet, HashSet};

use crate::synthesizer::SynthesisResult;

#[derive(Debug)]
pub struct ResearchSession {
    original_query: String,

    /// Context handed to the query expander. Stays equal to the original
    /// query for the whole run.
    current_context: String,

    /// Append-only, in discovery order.
    findings: Vec<String>,

    /// Every URL ever handed to the extractor.
    visited_urls: HashSet<String>,

    /// Directions from the most recent synthesis.
    last_directions: Vec<String>,

    /// URLs that yielded usable text. Always a subset of `visited_urls`.
    sources: BTreeSet<String>,
}

impl ResearchSession {
    pub fn new(query: impl Into<String>, existing_findings: Vec<String>) -> Self {
        let original_query = query.into();
        Self {
            current_context: original_query.clone(),
            original_query,
            findings: existing_findings,
            visited_urls: HashSet::new(),
            last_directions: Vec::new(),
            sources: BTreeSet::new(),
        }
    }

    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    pub fn current_context(&self) -> &str {
        &self.current_context
    }

    pub fn findings(&self) -> &[String] {
        &self.findings
    }

    pub fn last_directions(&self) -> &[String] {
        &self.last_directions
    }

    pub fn visited_count(&self) -> usize {
        self.visited_urls.len()
    }

    /// Keep the URLs not seen before, marking each as visited as it passes.
    ///
    /// A URL repeated inside `urls` is kept only once.
    pub fn admit_new_urls(&mut self, urls: impl IntoIterator<Item = String>) -> Vec<String> {
        urls.into_iter()
            .filter(|url| self.visited_urls.insert(url.clone()))
            .collect()
    }

    /// Record a URL whose extraction produced text.
    pub fn record_source(&mut self, url: &str) {
        if self.visited_urls.contains(url) {
            self.sources.insert(url.to_string());
        }
    }

    /// Fold a synthesis result in: findings are appended, directions replace
    /// the previous ones.
    pub fn absorb(&mut self, result: SynthesisResult) {
        self.findings.extend(result.findings);
        self.last_directions = result.directions;
    }

    pub fn into_outcome(self, report: String) -> ResearchOutcome {
        ResearchOutcome {
            report,
            sources: self.sources,
            findings: self.findings,
            directions: self.last_directions,
        }
    }
}

/// The terminal artifact of a successful research run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchOutcome {
    pub report: String,
    pub sources: BTreeSet<String>,
    pub findings: Vec<String>,
    pub directions: Vec<String>,
}
