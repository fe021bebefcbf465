//! Anthropic Messages API backend
//!
//! Sends the classification prompt as a single user message with the prompt's
//! system section, and parses the JSON object out of the text blocks.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::prompts::PromptLibrary;

use super::parsing::parse_classification_suggestion;
use super::types::{ClassificationSuggestion, SuggestionRequest};
use super::{render_classification_prompt, AIBackend};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 512;

/// Messages API request
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

/// Message in conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: text.into(),
        }
    }
}

/// Content block types
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Messages API response
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

impl MessagesResponse {
    /// Extract text content from the response
    fn text(&self) -> Option<String> {
        let texts: Vec<_> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}

#[derive(Clone)]
pub struct AnthropicBackend {
    http_client: Client,
    base_url: String,
    api_key: String,
    model: String,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl AnthropicBackend {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    /// Create from environment (`ANTHROPIC_API_KEY` required)
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        let base_url = std::env::var("ANTHROPIC_HOST")
            .unwrap_or_else(|_| "https://api.anthropic.com".to_string());
        let model = std::env::var("ANTHROPIC_MODEL")
            .unwrap_or_else(|_| "claude-3-5-haiku-latest".to_string());
        Some(Self::new(&base_url, &api_key, &model))
    }

    /// Create a new backend with a different model (same host)
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: model.to_string(),
            prompts: self.prompts.clone(),
        }
    }

    async fn messages(&self, system: Option<String>, messages: Vec<Message>) -> Result<String> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages,
            system,
        };

        debug!(model = %self.model, "Sending Messages API request");

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidData(format!(
                "Messages API error {}: {}",
                status, body
            )));
        }

        let result: MessagesResponse = response.json().await?;
        debug!(stop_reason = ?result.stop_reason, "Messages API response");
        result
            .text()
            .ok_or_else(|| Error::InvalidData("Messages API returned no text".into()))
    }
}

#[async_trait]
impl AIBackend for AnthropicBackend {
    async fn suggest_classification(
        &self,
        request: &SuggestionRequest,
    ) -> Result<ClassificationSuggestion> {
        let prompt = render_classification_prompt(&self.prompts, request)?;
        let text = self
            .messages(prompt.system, vec![Message::user(prompt.user)])
            .await?;
        parse_classification_suggestion(&text)
    }

    async fn health_check(&self) -> bool {
        // No unauthenticated ping endpoint; a configured key is the best local signal
        !self.api_key.is_empty()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
