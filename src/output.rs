//! # Output Module
//!
//! Turns a [`ResearchOutcome`] into the final Markdown document and persists
//! it. Every run gets a [`ResultId`]; the document, a JSON record of the run,
//! and the run log all share it as their file stem:
//!
//! ```text
//! results/
//!   result-20261016-142501-3f9c2a1b.md
//!   result-20261016-142501-3f9c2a1b.json
//!   result-20261016-142501-3f9c2a1b.log
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use crate::session::ResearchOutcome;

// =============================================================================
// RESULT IDENTIFIERS
// =============================================================================
/// `result-<YYYYmmdd-HHMMSS>-<8 hex>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultId {
    created_at: DateTime<Local>,
    value: String,
}

impl ResultId {
    pub fn generate() -> Self {
        Self::at(Local::now())
    }

    pub fn at(created_at: DateTime<Local>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        let value = format!(
            "result-{}-{}",
            created_at.format("%Y%m%d-%H%M%S"),
            &suffix[..8]
        );
        Self { created_at, value }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// =============================================================================
// FINAL DOCUMENT
// =============================================================================
/// Assemble the document printed to the user and saved to disk.
///
/// The `## Sources` and `## Further research directions` sections are left
/// out when there is nothing to list.
pub fn render_document(query: &str, id: &ResultId, outcome: &ResearchOutcome) -> String {
    let mut doc = format!(
        "> Deep research on \"{query}\" ({id}, generated {})\n\n",
        id.created_at().format("%Y-%m-%d %H:%M:%S")
    );
    doc.push_str(outcome.report.trim_end());
    doc.push('\n');

    if !outcome.sources.is_empty() {
        doc.push_str("\n## Sources\n\n");
        for source in &outcome.sources {
            doc.push_str(&format!("- <{source}>\n"));
        }
    }

    if !outcome.directions.is_empty() {
        doc.push_str("\n## Further research directions\n\n");
        for direction in &outcome.directions {
            doc.push_str(&format!("- {direction}\n"));
        }
    }

    doc
}

/// Machine-readable summary of a run.
#[derive(Debug, Serialize)]
pub struct ResultRecord<'a> {
    pub id: &'a str,
    pub created_at: DateTime<Local>,
    pub query: &'a str,
    pub model: &'a str,
    pub depth: usize,
    pub breadth: usize,
    pub findings: &'a [String],
    pub directions: &'a [String],
    pub sources: Vec<&'a str>,
    pub report: &'a str,
}

// =============================================================================
// RESULT SINKS
// =============================================================================
/// Destination for finished research results.
pub trait ResultSink {
    /// Store the rendered document, returning where it went.
    fn persist(&self, id: &ResultId, document: &str) -> Result<PathBuf>;

    /// Store the structured record next to the document.
    fn persist_record(&self, id: &ResultId, record: &ResultRecord<'_>) -> Result<PathBuf>;
}

/// Writes results as files into one directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Create the sink, creating `dir` if it does not exist yet.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create results directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Path of the run log belonging to `id`.
    pub fn log_path(&self, id: &ResultId) -> PathBuf {
        self.path_for(id, "log")
    }

    fn path_for(&self, id: &ResultId, extension: &str) -> PathBuf {
        self.dir.join(format!("{id}.{extension}"))
    }

    fn write(&self, path: PathBuf, content: &str) -> Result<PathBuf> {
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Result saved");
        Ok(path)
    }
}

impl ResultSink for FileSink {
    fn persist(&self, id: &ResultId, document: &str) -> Result<PathBuf> {
        self.write(self.path_for(id, "md"), document)
    }

    fn persist_record(&self, id: &ResultId, record: &ResultRecord<'_>) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(record).context("Failed to serialize result record")?;
        self.write(self.path_for(id, "json"), &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn fixed_id() -> ResultId {
        let at = Local.with_ymd_and_hms(2026, 10, 16, 14, 25, 1).unwrap();
        ResultId::at(at)
    }

    fn outcome(sources: &[&str], directions: &[&str]) -> ResearchOutcome {
        ResearchOutcome {
            report: "# Research: qec\n\nSurface codes work.\n".to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            findings: vec!["Surface codes work".to_string()],
            directions: directions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_result_id_format() {
        let id = fixed_id();
        let value = id.as_str();

        assert!(value.starts_with("result-20261016-142501-"));
        let suffix = value.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_result_ids_are_unique() {
        assert_ne!(fixed_id().as_str(), fixed_id().as_str());
    }

    #[test]
    fn test_document_lists_sources_and_directions() {
        let id = fixed_id();
        let doc = render_document(
            "qec",
            &id,
            &outcome(&["https://b.example/", "https://a.example/"], &["What about overhead?"]),
        );

        assert!(doc.starts_with("> Deep research on \"qec\""));
        assert!(doc.contains("generated 2026-10-16 14:25:01"));
        assert!(doc.contains("# Research: qec\n\nSurface codes work.\n"));

        let sources = doc.find("## Sources").unwrap();
        let directions = doc.find("## Further research directions").unwrap();
        assert!(sources < directions);
        // Sources are listed in sorted order.
        let a = doc.find("- <https://a.example/>").unwrap();
        let b = doc.find("- <https://b.example/>").unwrap();
        assert!(a < b);
        assert!(doc.ends_with("- What about overhead?\n"));
    }

    #[test]
    fn test_document_omits_empty_sections() {
        let doc = render_document("qec", &fixed_id(), &outcome(&[], &[]));
        assert!(!doc.contains("## Sources"));
        assert!(!doc.contains("## Further research directions"));
    }

    #[test]
    fn test_file_sink_creates_directory_and_writes() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("nested").join("results");
        let sink = FileSink::create(&dir).unwrap();
        let id = fixed_id();

        let path = sink.persist(&id, "# doc").unwrap();

        assert_eq!(path, dir.join(format!("{id}.md")));
        assert_eq!(fs::read_to_string(&path).unwrap(), "# doc");
        assert_eq!(sink.log_path(&id), dir.join(format!("{id}.log")));
    }

    #[test]
    fn test_file_sink_writes_json_record() {
        let tmp = tempdir().unwrap();
        let sink = FileSink::create(tmp.path()).unwrap();
        let id = fixed_id();
        let outcome = outcome(&["https://a.example/"], &["next"]);
        let record = ResultRecord {
            id: id.as_str(),
            created_at: id.created_at(),
            query: "qec",
            model: "llama3.2",
            depth: 2,
            breadth: 3,
            findings: &outcome.findings,
            directions: &outcome.directions,
            sources: outcome.sources.iter().map(String::as_str).collect(),
            report: &outcome.report,
        };

        let path = sink.persist_record(&id, &record).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["query"], "qec");
        assert_eq!(value["depth"], 2);
        assert_eq!(value["sources"][0], "https://a.example/");
        assert_eq!(value["findings"][0], "Surface codes work");
    }
}
