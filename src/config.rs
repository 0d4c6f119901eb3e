//! # Configuration Module
//!
//! Loads configuration from environment variables (and a `.env` file when
//! present) into one explicit [`Config`] value. Nothing downstream reads the
//! environment: each component receives the slice of configuration it needs
//! through its constructor.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// MODEL PROVIDER
// =============================================================================
/// Which language model backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Provider {
    /// Local inference through an Ollama server
    Ollama,
    /// Google Gemini (requires `GEMINI_API_KEY`)
    Gemini,
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "gemini" => Ok(Provider::Gemini),
            other => anyhow::bail!("LLM_PROVIDER must be 'ollama' or 'gemini', got: {other}"),
        }
    }
}

// =============================================================================
// CONFIGURATION STRUCTS
// =============================================================================
/// Settings handed to the language model backend.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub provider: Provider,

    /// Model name for the selected provider (e.g. "llama3.2", "gemini-1.5-flash")
    pub model: String,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Only needed for [`Provider::Gemini`]
    pub gemini_api_key: Option<String>,

    /// Sampling temperature (0.0 = deterministic)
    pub temperature: f64,

    pub max_output_tokens: u64,
}

/// Tunables of the research loop itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResearchLimits {
    /// URLs kept per generated query
    pub results_per_query: usize,

    /// Ceiling on concurrent searches / fetches within one iteration
    pub max_concurrency: usize,

    /// Character budget for the text handed to the synthesizer
    pub max_synthesis_chars: usize,
}

impl Default for ResearchLimits {
    fn default() -> Self {
        Self {
            results_per_query: 2,
            max_concurrency: 4,
            max_synthesis_chars: 30_000,
        }
    }
}

/// Main configuration for the research agent.
#[derive(Debug, Clone)]
pub struct Config {
    pub model: ModelSettings,

    pub limits: ResearchLimits,

    pub search_timeout: Duration,

    pub fetch_timeout: Duration,

    /// Where result documents and run logs are written
    pub results_dir: PathBuf,
}

/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Default Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelSettings {
                provider: Provider::Ollama,
                model: DEFAULT_OLLAMA_MODEL.to_string(),
                ollama_host: "http://localhost:11434".to_string(),
                gemini_api_key: None,
                temperature: 0.7,
                max_output_tokens: 8192,
            },
            limits: ResearchLimits::default(),
            search_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(15),
            results_dir: PathBuf::from("results"),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
/// Variable lookup over the process environment, after loading `.env`.
pub fn environment() -> impl Fn(&str) -> Option<String> {
    let _ = dotenvy::dotenv();
    |key: &str| env::var(key).ok()
}

impl Config {
    /// Build a configuration from a variable lookup, normally [`environment`].
    ///
    /// # Rust Concept: Closures as Parameters
    ///
    /// Taking `impl Fn(&str) -> Option<String>` instead of reading the process
    /// environment directly lets tests feed a plain map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(val) = lookup("LLM_PROVIDER") {
            config.model.provider = val.parse()?;
        }

        config.model.model = match config.model.provider {
            Provider::Ollama => lookup("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            Provider::Gemini => lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        };

        if let Some(val) = lookup("OLLAMA_API_BASE_URL") {
            config.model.ollama_host = val;
        }

        config.model.gemini_api_key = lookup("GEMINI_API_KEY").filter(|key| !key.trim().is_empty());

        if let Some(val) = lookup("TEMPERATURE") {
            config.model.temperature = val
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.7)")?;
        }

        if let Some(val) = lookup("MAX_OUTPUT_TOKENS") {
            config.model.max_output_tokens = val
                .parse()
                .context("MAX_OUTPUT_TOKENS must be a valid positive integer")?;
        }

        if let Some(val) = lookup("RESULTS_PER_QUERY") {
            config.limits.results_per_query = val
                .parse()
                .context("RESULTS_PER_QUERY must be a valid positive integer")?;
        }

        if let Some(val) = lookup("MAX_CONCURRENCY") {
            config.limits.max_concurrency = val
                .parse()
                .context("MAX_CONCURRENCY must be a valid positive integer")?;
        }

        if let Some(val) = lookup("MAX_SYNTHESIS_CHARS") {
            config.limits.max_synthesis_chars = val
                .parse()
                .context("MAX_SYNTHESIS_CHARS must be a valid positive integer")?;
        }

        if let Some(val) = lookup("SEARCH_TIMEOUT_SECS") {
            let secs: u64 = val
                .parse()
                .context("SEARCH_TIMEOUT_SECS must be a whole number of seconds")?;
            config.search_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("FETCH_TIMEOUT_SECS") {
            let secs: u64 = val
                .parse()
                .context("FETCH_TIMEOUT_SECS must be a whole number of seconds")?;
            config.fetch_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("RESULTS_DIR") {
            config.results_dir = PathBuf::from(val);
        }

        Ok(config)
    }

    /// Switch provider, resetting the model name to that provider's default.
    pub fn set_provider(&mut self, provider: Provider) {
        if provider == self.model.provider {
            return;
        }
        self.model.provider = provider;
        self.model.model = match provider {
            Provider::Ollama => DEFAULT_OLLAMA_MODEL.to_string(),
            Provider::Gemini => DEFAULT_GEMINI_MODEL.to_string(),
        };
    }

    /// Validate the configuration before any research starts.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.model.temperature
            );
        }

        if self.model.model.trim().is_empty() {
            anyhow::bail!("Model name cannot be empty");
        }

        if self.model.provider == Provider::Gemini && self.model.gemini_api_key.is_none() {
            anyhow::bail!("GEMINI_API_KEY must be set when LLM_PROVIDER is 'gemini'");
        }

        if self.model.max_output_tokens == 0 {
            anyhow::bail!("MAX_OUTPUT_TOKENS must be at least 1");
        }

        if self.limits.results_per_query == 0 {
            anyhow::bail!("RESULTS_PER_QUERY must be at least 1");
        }

        if self.limits.max_concurrency == 0 {
            anyhow::bail!("MAX_CONCURRENCY must be at least 1");
        }

        if self.limits.max_synthesis_chars == 0 {
            anyhow::bail!("MAX_SYNTHESIS_CHARS must be at least 1");
        }

        if self.search_timeout.is_zero() || self.fetch_timeout.is_zero() {
            anyhow::bail!("Timeouts must be at least one second");
        }

        Ok(())
    }
}
