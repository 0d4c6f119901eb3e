//! In-memory collaborators shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{ExtractionFailure, ModelError, SearchError};
use crate::extract::{ContentExtractor, ExtractedDocument};
use crate::llm::{GenerationRequest, LanguageModel};
use crate::search::{SearchHit, SearchProvider};

type Responder = Box<dyn Fn(&GenerationRequest) -> Result<String, ModelError> + Send + Sync>;

/// Language model whose replies come from a closure. Records every request.
pub struct ScriptedModel {
    respond: Responder,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new(
        respond: impl Fn(&GenerationRequest) -> Result<String, ModelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub fn failing(error: ModelError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, preamble: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.preamble == preamble)
            .count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.respond)(request)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Search provider answering from a fixed query -> URLs table.
#[derive(Default)]
pub struct StaticSearch {
    results: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, query: &str, urls: &[&str]) -> Self {
        self.results
            .insert(query.to_string(), urls.iter().map(|u| u.to_string()).collect());
        self
    }

    pub fn failing_for(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing.iter().any(|q| q == query) {
            return Err(SearchError::RateLimited);
        }
        Ok(self
            .results
            .get(query)
            .map(|urls| urls.iter().take(max_results).map(SearchHit::new).collect())
            .unwrap_or_default())
    }
}

/// Extractor serving fixed texts; unknown URLs answer 404.
#[derive(Default)]
pub struct StaticPages {
    pages: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl StaticPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), text.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentExtractor for StaticPages {
    async fn extract(&self, url: &str) -> Result<ExtractedDocument, ExtractionFailure> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(text) if !text.is_empty() => Ok(ExtractedDocument {
                url: url.to_string(),
                text: text.clone(),
            }),
            Some(_) => Err(ExtractionFailure::Empty),
            None => Err(ExtractionFailure::Http(reqwest::StatusCode::NOT_FOUND)),
        }
    }
}
