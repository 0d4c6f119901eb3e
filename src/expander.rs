//! # Query Expander
//!
//! Asks the language model for the next round of web search queries.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ModelError;
use crate::llm::{GenerationRequest, LanguageModel, QUERY_GENERATOR_PREAMBLE};

/// Only this many of the most recent findings are shown to the model.
pub const RECENT_FINDINGS_SHOWN: usize = 5;

pub struct QueryExpander {
    model: Arc<dyn LanguageModel>,
}

impl QueryExpander {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Produce at most `breadth` search queries for `context`.
    ///
    /// A reply with fewer (or zero) usable lines is not an error. `Err` is
    /// returned only when the model call itself failed.
    pub async fn expand(
        &self,
        context: &str,
        findings: &[String],
        breadth: usize,
    ) -> Result<Vec<String>, ModelError> {
        let request = GenerationRequest::new(
            QUERY_GENERATOR_PREAMBLE,
            build_prompt(context, findings, breadth),
        );
        let reply = self.model.generate(&request).await?;

        let queries = parse_queries(&reply, breadth);
        if queries.is_empty() {
            warn!(context = %context, "Model produced no usable search queries");
        } else {
            info!(count = queries.len(), queries = ?queries, "Generated search queries");
        }
        Ok(queries)
    }
}

fn build_prompt(context: &str, findings: &[String], breadth: usize) -> String {
    let recent = &findings[findings.len().saturating_sub(RECENT_FINDINGS_SHOWN)..];
    let known = if recent.is_empty() {
        "None yet".to_string()
    } else {
        recent
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Based on the research context and the findings gathered so far, generate {breadth} new, diverse and specific web search queries that take the research deeper.

**Context / previous query:**
{context}

**Known findings (most recent {RECENT_FINDINGS_SHOWN}):**
{known}

**Task:**
Generate exactly {breadth} distinct search queries. Put each query on its own line, without numbering or bullet markers. Do not add explanations or introductions, only the queries themselves.

**Example output:**
Best practices for quantum computing 2024
Applications of qubits in medicine
Trapped-ion versus superconducting qubits
"#
    )
}

/// One query per non-empty line, list markers stripped, duplicates dropped,
/// truncated to `breadth`.
fn parse_queries(reply: &str, breadth: usize) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();
    for line in reply.lines() {
        if queries.len() >= breadth {
            break;
        }
        let query = strip_list_marker(line.trim()).trim_matches('"').trim();
        if query.is_empty() || query.starts_with("```") {
            continue;
        }
        if !queries.iter().any(|q| q == query) {
            queries.push(query.to_string());
        }
    }
    queries
}

/// Remove a leading `-`, `*`, `•` or `1.`/`1)` marker.
fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
    {
        return rest;
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest;
        }
    }
    line
}
