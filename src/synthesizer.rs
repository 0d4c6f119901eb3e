//! # Insight Synthesizer
//!
//! Turns freshly extracted text into new findings plus follow-up directions.
//! The model is asked for a JSON object of the form
//!
//! ```json
//! { "learnings": ["..."], "directions": ["..."] }
//! ```
//!
//! and anything else is reported as a [`SynthesisFailure`].

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::SynthesisFailure;
use crate::llm::{GenerationRequest, LanguageModel, ANALYST_PREAMBLE};

/// New findings and directions from one synthesis call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisResult {
    pub findings: Vec<String>,
    pub directions: Vec<String>,
}

pub struct InsightSynthesizer {
    model: Arc<dyn LanguageModel>,
    max_input_chars: usize,
}

impl InsightSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, max_input_chars: usize) -> Self {
        Self {
            model,
            max_input_chars,
        }
    }

    pub async fn synthesize(
        &self,
        context: &str,
        findings: &[String],
        text: &str,
    ) -> Result<SynthesisResult, SynthesisFailure> {
        let kept = truncate_chars(text, self.max_input_chars);
        if kept.len() < text.len() {
            warn!(
                total_chars = text.chars().count(),
                kept_chars = self.max_input_chars,
                "Synthesis input too long, truncating"
            );
        }
        let text = kept;

        let request =
            GenerationRequest::new(ANALYST_PREAMBLE, build_prompt(context, findings, text)).structured();
        let reply = self.model.generate(&request).await?;

        let result = parse_reply(&reply)?;
        info!(
            findings = result.findings.len(),
            directions = result.directions.len(),
            "Synthesized findings"
        );
        Ok(result)
    }
}

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

fn build_prompt(context: &str, findings: &[String], text: &str) -> String {
    let known = if findings.is_empty() {
        "None yet".to_string()
    } else {
        findings
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Analyze the following text gathered during web research.
Take the original query and the already known findings into account.

**Original query / context:**
{context}

**Known findings:**
{known}

**Text to analyze (from several sources):**

{text}

**Your task:**
Return ONLY a JSON object with the following structure:
{{
  "learnings": [
    "Short finding 1 based on the text",
    "Short finding 2 that is new knowledge",
    "..."
  ],
  "directions": [
    "A specific question for further research raised by the text",
    "A related topic worth digging into",
    "..."
  ]
}}
Avoid repeating findings that are already known. Focus on new information from the text to analyze.
Each learning must be a short, self-contained statement.
Each direction must be a question or topic for further searching.
If the text contains nothing useful, return empty lists.
"#
    )
}

/// Parse the model reply into a [`SynthesisResult`].
///
/// Markdown code fences around the JSON are tolerated. Non-string array
/// entries and blank strings are dropped.
fn parse_reply(reply: &str) -> Result<SynthesisResult, SynthesisFailure> {
    let value: Value = serde_json::from_str(strip_code_fence(reply))?;

    let (Some(learnings), Some(directions)) = (
        value.get("learnings").and_then(Value::as_array),
        value.get("directions").and_then(Value::as_array),
    ) else {
        return Err(SynthesisFailure::WrongShape);
    };

    Ok(SynthesisResult {
        findings: string_items(learnings),
        directions: string_items(directions),
    })
}

fn string_items(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
