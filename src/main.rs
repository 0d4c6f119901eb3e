//! # Deep Research Agent
//!
//! Iterative web research from the command line, built with the Rig framework.
//!
//! Each run expands the question into search queries, searches the web,
//! extracts readable text from the new pages, and distills findings from it,
//! repeating for `--depth` rounds before a language model writes a report.
//!
//! ## Quick Start
//! ```bash
//! cargo run -- --depth 2 --breadth 3 "How does quantum error correction work?"
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================
/// Configuration management
mod config;

/// Error types shared by the research components
mod error;

/// Language model backends
mod llm;

/// Web search and URL normalization
mod search;

/// Page fetching and readable-text extraction
mod extract;

/// Search query generation
mod expander;

/// Findings and directions from page text
mod synthesizer;

/// Final report writing
mod report;

/// Per-run research state
mod session;

/// The research controller
mod agent;

/// Final document rendering and persistence
mod output;

#[cfg(test)]
mod testing;

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::agent::{ResearchAgent, ResearchRequest};
use crate::config::{Config, Provider};
use crate::error::ResearchError;
use crate::extract::WebPageExtractor;
use crate::llm::RigModel;
use crate::output::{render_document, FileSink, ResultId, ResultRecord, ResultSink};
use crate::search::DuckDuckGoSearch;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
/// # Rust Concept: Derive Macros with Clap
///
/// `value_parser!(u8).range(..)` rejects out-of-range depth and breadth
/// before any research starts, with a clap-formatted error message.
#[derive(Parser, Debug)]
#[command(
    name = "deep-research-agent",
    version,
    about = "Iterative deep research: search, read, distill, repeat, then report",
    long_about = r#"
Deep Research Agent

Researches a question in several rounds. Every round:
  1. Generates new search queries from the question and what is known so far
  2. Searches the web (DuckDuckGo) and skips pages already read
  3. Extracts the readable text of each new page
  4. Distills new findings and follow-up directions from that text
After the last round a language model turns all findings into a report.

PREREQUISITES (default provider):
  1. Install Ollama: https://ollama.ai
  2. Pull a model: ollama pull llama3.2
  3. Start Ollama: ollama serve

EXAMPLES:
  # Two rounds of three queries each (the defaults)
  deep-research-agent "How does quantum error correction work?"

  # Go deeper with Gemini
  GEMINI_API_KEY=... deep-research-agent --provider gemini -d 4 -b 2 "Rust async runtimes"

  # Continue from earlier findings
  deep-research-agent -f "Surface codes have a ~1% threshold" "QEC overhead"
"#
)]
struct Args {
    /// The research topic or question to investigate
    #[arg(value_name = "QUERY")]
    query: String,

    /// Number of research rounds
    #[arg(
        short = 'd',
        long = "depth",
        default_value_t = 2,
        value_parser = clap::value_parser!(u8).range(1..=5)
    )]
    depth: u8,

    /// Search queries generated per round
    #[arg(
        short = 'b',
        long = "breadth",
        default_value_t = 3,
        value_parser = clap::value_parser!(u8).range(1..=5)
    )]
    breadth: u8,

    /// A finding known before the research starts (repeatable)
    #[arg(short = 'f', long = "finding", value_name = "TEXT")]
    findings: Vec<String>,

    /// File with one known finding per line
    #[arg(long = "findings-file", value_name = "PATH")]
    findings_file: Option<PathBuf>,

    /// Language model provider (overrides LLM_PROVIDER)
    #[arg(long = "provider", value_enum)]
    provider: Option<Provider>,

    /// Model name (overrides OLLAMA_MODEL / GEMINI_MODEL)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Directory for result documents and run logs (overrides RESULTS_DIR)
    #[arg(long = "output-dir", value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Print the result without writing any files
    #[arg(long = "no-save")]
    no_save: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args, config::environment())?;

    let id = ResultId::generate();
    let sink = if args.no_save {
        None
    } else {
        Some(FileSink::create(&config.results_dir)?)
    };
    init_logging(args.verbose, sink.as_ref().map(|s| s.log_path(&id)).as_deref())?;

    info!(
        provider = ?config.model.provider,
        model = %config.model.model,
        result_id = %id,
        "Deep Research Agent starting up"
    );

    let mut existing_findings = args.findings.clone();
    if let Some(path) = &args.findings_file {
        existing_findings.extend(read_findings_file(path)?);
    }

    let model = RigModel::new(config.model.clone()).with_context(|| not_started(&args.query))?;
    let search = DuckDuckGoSearch::new(config.search_timeout).context("Failed to set up web search")?;
    let extractor =
        WebPageExtractor::new(config.fetch_timeout).context("Failed to set up page fetching")?;
    let agent = ResearchAgent::new(
        Arc::new(model),
        Arc::new(search),
        Arc::new(extractor),
        config.limits,
    );

    let request = ResearchRequest::new(
        args.query.clone(),
        usize::from(args.depth),
        usize::from(args.breadth),
    )
    .with_findings(existing_findings);

    let outcome = match agent.run(request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(query = %args.query, error = %e, "Research failed");
            eprintln!("\nResearch failed: {e}");
            if let Some(tip) = failure_tip(&e) {
                eprintln!("\nTip: {tip}");
            }
            return Err(e.into());
        }
    };

    let document = render_document(&args.query, &id, &outcome);
    println!("{document}");

    if let Some(sink) = &sink {
        let path = sink.persist(&id, &document)?;
        sink.persist_record(
            &id,
            &ResultRecord {
                id: id.as_str(),
                created_at: id.created_at(),
                query: &args.query,
                model: &config.model.model,
                depth: usize::from(args.depth),
                breadth: usize::from(args.breadth),
                findings: &outcome.findings,
                directions: &outcome.directions,
                sources: outcome.sources.iter().map(String::as_str).collect(),
                report: &outcome.report,
            },
        )?;
        println!("\nSaved to {}", path.display());
    }

    info!(result_id = %id, "Research completed successfully");
    Ok(())
}

/// Context for failures that stop a run before research starts.
fn not_started(query: &str) -> String {
    format!("research for {query:?} could not start")
}

/// Configuration from `lookup` with the command-line overrides applied.
fn load_config(args: &Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let mut config = Config::from_lookup(lookup).with_context(|| not_started(&args.query))?;

    if let Some(provider) = args.provider {
        config.set_provider(provider);
    }
    if let Some(model) = &args.model {
        config.model.model = model.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.results_dir = dir.clone();
    }

    config.validate().with_context(|| not_started(&args.query))?;
    Ok(config)
}

/// Hint for the most common reasons a run fails.
fn failure_tip(error: &ResearchError) -> Option<&'static str> {
    let ResearchError::Model { source, .. } = error else {
        return None;
    };
    if source.is_configuration() {
        return Some("check GEMINI_API_KEY and that the model name exists (ollama pull <model>)");
    }
    if source.to_string().to_ascii_lowercase().contains("connection refused") {
        return Some("make sure Ollama is running:\n   ollama serve");
    }
    None
}

/// One finding per non-empty line.
fn read_findings_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read findings file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Console logging on stderr, plus a plain-text copy in `log_file` if given.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use std::io::Write;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["test", "What is Rust?"]);
        assert_eq!(args.query, "What is Rust?");
        assert_eq!(args.depth, 2);
        assert_eq!(args.breadth, 3);
        assert!(args.findings.is_empty());
        assert!(!args.no_save);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_with_flags() {
        let args = Args::parse_from([
            "test",
            "-d", "4",
            "--breadth", "1",
            "-f", "known one",
            "--finding", "known two",
            "--provider", "gemini",
            "--model", "gemini-1.5-pro",
            "--no-save",
            "--verbose",
            "Test query",
        ]);

        assert_eq!(args.query, "Test query");
        assert_eq!(args.depth, 4);
        assert_eq!(args.breadth, 1);
        assert_eq!(args.findings, vec!["known one", "known two"]);
        assert_eq!(args.provider, Some(Provider::Gemini));
        assert_eq!(args.model, Some("gemini-1.5-pro".to_string()));
        assert!(args.no_save);
        assert!(args.verbose);
    }

    #[test]
    fn test_depth_and_breadth_ranges() {
        for bad in [["test", "-d", "0", "q"], ["test", "-d", "6", "q"], ["test", "-b", "0", "q"], ["test", "-b", "9", "q"]] {
            assert!(Args::try_parse_from(bad).is_err(), "accepted {bad:?}");
        }
        assert!(Args::try_parse_from(["test", "-d", "5", "-b", "5", "q"]).is_ok());
    }

    #[test]
    fn test_missing_gemini_key_names_the_query() {
        let args = Args::parse_from(["test", "--provider", "gemini", "quantum error correction"]);

        let err = load_config(&args, |_| None).unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("research for \"quantum error correction\" could not start"));
        assert!(message.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_bad_environment_names_the_query() {
        let args = Args::parse_from(["test", "qec"]);
        let lookup = |key: &str| (key == "TEMPERATURE").then(|| "warm".to_string());

        let err = load_config(&args, lookup).unwrap_err();
        assert!(format!("{err:#}").contains("research for \"qec\" could not start"));
    }

    #[test]
    fn test_cli_overrides_apply() {
        let args = Args::parse_from(["test", "-m", "mistral", "--output-dir", "out", "qec"]);
        let config = load_config(&args, |_| None).unwrap();
        assert_eq!(config.model.model, "mistral");
        assert_eq!(config.results_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_failure_tips() {
        let refused = ResearchError::Model {
            query: "qec".into(),
            source: ModelError::Transport("error sending request: Connection refused".into()),
        };
        assert!(failure_tip(&refused).unwrap().contains("ollama serve"));

        let bad_key = ResearchError::Model {
            query: "qec".into(),
            source: ModelError::Configuration("401 Unauthorized".into()),
        };
        assert!(failure_tip(&bad_key).unwrap().contains("GEMINI_API_KEY"));

        assert!(failure_tip(&ResearchError::InvalidRequest("depth".into())).is_none());
    }

    #[test]
    fn test_read_findings_file_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Surface codes have a ~1% threshold\n\n   \n  Logical qubits are expensive  ").unwrap();

        let findings = read_findings_file(file.path()).unwrap();
        assert_eq!(
            findings,
            vec!["Surface codes have a ~1% threshold", "Logical qubits are expensive"]
        );
    }

    #[test]
    fn test_missing_findings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_findings_file(&dir.path().join("nope.txt")).is_err());
    }
}
