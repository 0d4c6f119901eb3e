//! # Language Model Module
//!
//! A narrow, provider-agnostic seam over the language model: one prompt in,
//! raw text out. The research components only ever see [`LanguageModel`];
//! [`RigModel`] bridges it to rig-core's Ollama and Gemini clients.

use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::{gemini, ollama};
use tracing::{debug, warn};

use crate::config::{ModelSettings, Provider};
use crate::error::ModelError;

// =============================================================================
// ROLE PREAMBLES
// =============================================================================
/// Preamble for the query expander.
pub const QUERY_GENERATOR_PREAMBLE: &str =
    "You are an AI research assistant. Your job is to generate web search queries.";

/// Preamble for the insight synthesizer.
pub const ANALYST_PREAMBLE: &str = "You are an AI research analyst. Your job is to analyze text, \
     extract key findings and propose new directions for research. Reply ONLY with JSON.";

/// Preamble for the report composer.
pub const REPORT_WRITER_PREAMBLE: &str = "You are an AI report writer. Your job is to turn \
     research findings into a detailed, well-structured Markdown report.";

// =============================================================================
// REQUEST TYPE
// =============================================================================
/// A single generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// System preamble describing the model's role for this call
    pub preamble: &'static str,

    pub prompt: String,

    /// The reply must be a JSON document
    pub structured: bool,
}

impl GenerationRequest {
    pub fn new(preamble: &'static str, prompt: impl Into<String>) -> Self {
        Self {
            preamble,
            prompt: prompt.into(),
            structured: false,
        }
    }

    /// Require a JSON reply.
    pub fn structured(mut self) -> Self {
        self.structured = true;
        self
    }
}

// =============================================================================
// LANGUAGE MODEL TRAIT
// =============================================================================
/// Provider-agnostic text generation.
///
/// Implementations return `Ok(String::new())` when the provider blocks or
/// filters the generation, and `Err` only when the call itself failed.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError>;

    /// Provider/model name for logging
    fn name(&self) -> &str;
}

// =============================================================================
// RIG BACKEND
// =============================================================================
enum Backend {
    Ollama(ollama::Client),
    Gemini(gemini::Client),
}

/// [`LanguageModel`] backed by rig-core.
pub struct RigModel {
    backend: Backend,
    settings: ModelSettings,
    name: String,
}

impl RigModel {
    /// Create the backend described by `settings`.
    ///
    /// Fails with [`ModelError::Configuration`] when credentials are missing.
    pub fn new(settings: ModelSettings) -> Result<Self, ModelError> {
        let backend = match settings.provider {
            Provider::Ollama => {
                // rig's Ollama client reads its base URL from the environment.
                std::env::set_var("OLLAMA_API_BASE_URL", &settings.ollama_host);
                Backend::Ollama(ollama::Client::from_env())
            }
            Provider::Gemini => {
                let api_key = settings.gemini_api_key.clone().ok_or_else(|| {
                    ModelError::Configuration("GEMINI_API_KEY is not set".to_string())
                })?;
                Backend::Gemini(gemini::Client::from_val(api_key.into()))
            }
        };

        let name = match settings.provider {
            Provider::Ollama => format!("ollama/{}", settings.model),
            Provider::Gemini => format!("gemini/{}", settings.model),
        };

        debug!(model = %name, "Language model backend ready");

        Ok(Self {
            backend,
            settings,
            name,
        })
    }

    fn json_hint(&self) -> serde_json::Value {
        match self.settings.provider {
            Provider::Ollama => serde_json::json!({ "format": "json" }),
            Provider::Gemini => serde_json::json!({
                "generationConfig": { "responseMimeType": "application/json" }
            }),
        }
    }
}

#[async_trait]
impl LanguageModel for RigModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        debug!(
            model = %self.name,
            prompt_chars = request.prompt.chars().count(),
            structured = request.structured,
            "Calling language model"
        );

        let result = match &self.backend {
            Backend::Ollama(client) => {
                let mut builder = client
                    .agent(&self.settings.model)
                    .preamble(request.preamble)
                    .temperature(self.settings.temperature)
                    .max_tokens(self.settings.max_output_tokens);
                if request.structured {
                    builder = builder.additional_params(self.json_hint());
                }
                builder.build().prompt(request.prompt.as_str()).await
            }
            Backend::Gemini(client) => {
                let mut builder = client
                    .agent(&self.settings.model)
                    .preamble(request.preamble)
                    .temperature(self.settings.temperature)
                    .max_tokens(self.settings.max_output_tokens);
                if request.structured {
                    builder = builder.additional_params(self.json_hint());
                }
                builder.build().prompt(request.prompt.as_str()).await
            }
        };

        match result {
            Ok(text) => {
                if text.trim().is_empty() {
                    warn!(model = %self.name, "Model returned an empty reply");
                }
                debug!(model = %self.name, reply_chars = text.chars().count(), "Model replied");
                Ok(text)
            }
            Err(e) => Err(classify_failure(&e.to_string())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sort a provider error message into configuration and transport failures.
fn classify_failure(message: &str) -> ModelError {
    let lower = message.to_ascii_lowercase();
    let configuration_markers = [
        "401",
        "403",
        "unauthorized",
        "forbidden",
        "api key",
        "api_key",
        "model not found",
    ];
    let unknown_model = lower.contains("model") && lower.contains("not found");

    if unknown_model || configuration_markers.iter().any(|marker| lower.contains(marker)) {
        ModelError::Configuration(message.to_string())
    } else {
        ModelError::Transport(message.to_string())
    }
}
