//! # Report Composer
//!
//! Compiles the accumulated findings into one Markdown narrative. This step
//! never fails: without findings, or when the model cannot produce a report,
//! a fixed-template document is returned instead.

use std::sync::Arc;
use tracing::{info, warn};

use crate::llm::{GenerationRequest, LanguageModel, REPORT_WRITER_PREAMBLE};

pub struct ReportComposer {
    model: Arc<dyn LanguageModel>,
}

impl ReportComposer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn compose(&self, query: &str, findings: &[String]) -> String {
        if findings.is_empty() {
            warn!(query = %query, "No findings to report");
            return no_information_report(query);
        }

        let request = GenerationRequest::new(REPORT_WRITER_PREAMBLE, build_prompt(query, findings));
        match self.model.generate(&request).await {
            Ok(report) if !report.trim().is_empty() => {
                info!(chars = report.chars().count(), "Report composed");
                report
            }
            Ok(_) => {
                warn!(query = %query, "Model returned an empty report; using fallback");
                fallback_report(query, findings)
            }
            Err(e) => {
                warn!(query = %query, error = %e, "Report generation failed; using fallback");
                fallback_report(query, findings)
            }
        }
    }
}

/// Document returned when the research gathered nothing.
pub fn no_information_report(query: &str) -> String {
    format!("# Research: {query}\n\nNo information could be gathered for this query.")
}

/// Document returned when the model could not write the report.
pub fn fallback_report(query: &str, findings: &[String]) -> String {
    let bullets = findings
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "# Research: {query}\n\n\
         The language model did not produce a report. The collected findings are listed below.\n\n\
         {bullets}"
    )
}

fn build_prompt(query: &str, findings: &[String]) -> String {
    let listed = findings
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Write a detailed, well-structured final research report in Markdown.

**Original query:**
{query}

**Key findings gathered during the research:**

{listed}

**Task:**
Write a report that:
1. Starts with the heading `# Research: {query}`.
2. Contains a short introduction (1-2 sentences) summarizing the goal of the research.
3. Presents the main findings in a logically structured way. Use subheadings (`##`), lists and **bold** emphasis.
4. Groups related findings together.
5. Connects the findings into a coherent narrative instead of just listing them.
6. Ends with a `## Conclusion` section summarizing the research (1-2 sentences).
7. Does not include a list of sources; it is added separately.
8. Is clear and informative.
"#
    )
}
