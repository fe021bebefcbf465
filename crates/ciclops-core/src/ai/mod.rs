//! Pluggable AI backend abstraction
//!
//! The AI layer is only a fallback for document classification: when the
//! heuristics cannot determine a document's type, period or store, a backend
//! is asked for a structured guess. Nothing downstream depends on it being
//! available.
//!
//! # Architecture
//!
//! - `AIBackend` trait: the interface every backend implements
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `AnthropicBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (ollama, anthropic, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Default model name (default: llama3.2)
//! - `ANTHROPIC_API_KEY`: API key (required for anthropic backend)
//! - `ANTHROPIC_HOST`: API base URL (default: https://api.anthropic.com)
//! - `ANTHROPIC_MODEL`: Model name (default: claude-3-5-haiku-latest)

mod anthropic;
mod mock;
mod ollama;
pub mod parsing;
pub mod types;

pub use anthropic::{AnthropicBackend, Message};
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use types::*;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::prompts::{PromptId, PromptLibrary};

/// Longest slice of document text sent to a backend
const MAX_PROMPT_TEXT_CHARS: usize = 4000;

/// Trait defining the interface for all AI backends
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Guess document type, period and stores for a document
    async fn suggest_classification(
        &self,
        request: &SuggestionRequest,
    ) -> Result<ClassificationSuggestion>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Anthropic Messages API
    Anthropic(AnthropicBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(AIClient::Ollama),
            "anthropic" | "claude" => AnthropicBackend::from_env().map(AIClient::Anthropic),
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(AIClient::Ollama)
            }
        }
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        AIClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::Ollama(b) => AIClient::Ollama(b.with_model(model)),
            AIClient::Anthropic(b) => AIClient::Anthropic(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }

    pub fn info(&self) -> BackendInfo {
        let backend = match self {
            AIClient::Ollama(_) => "ollama",
            AIClient::Anthropic(_) => "anthropic",
            AIClient::Mock(_) => "mock",
        };
        BackendInfo {
            backend: backend.to_string(),
            model: self.model().to_string(),
            host: self.host().to_string(),
        }
    }
}

#[async_trait]
impl AIBackend for AIClient {
    async fn suggest_classification(
        &self,
        request: &SuggestionRequest,
    ) -> Result<ClassificationSuggestion> {
        match self {
            AIClient::Ollama(b) => b.suggest_classification(request).await,
            AIClient::Anthropic(b) => b.suggest_classification(request).await,
            AIClient::Mock(b) => b.suggest_classification(request).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::Anthropic(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.model(),
            AIClient::Anthropic(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.host(),
            AIClient::Anthropic(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// Rendered classification prompt: optional system section and user message
pub(crate) struct RenderedPrompt {
    pub system: Option<String>,
    pub user: String,
}

/// Render the classification prompt for a request
pub(crate) fn render_classification_prompt(
    prompts: &RwLock<PromptLibrary>,
    request: &SuggestionRequest,
) -> Result<RenderedPrompt> {
    let document_text: String = request
        .document_text
        .chars()
        .take(MAX_PROMPT_TEXT_CHARS)
        .collect();
    let line_items = request.line_items.join("\n");
    let stores = request.known_stores.join(", ");

    let mut prompts = prompts
        .write()
        .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
    let template = prompts.get(PromptId::ClassifyDocument)?;

    let mut vars = HashMap::new();
    vars.insert("document_text", document_text.as_str());
    vars.insert("line_items", line_items.as_str());
    vars.insert("stores", stores.as_str());
    if let Some(ref filename) = request.filename {
        vars.insert("filename", filename.as_str());
    }

    Ok(RenderedPrompt {
        system: template.system_section().map(str::to_string),
        user: template.render_user(&vars),
    })
}
