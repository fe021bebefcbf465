//! Test utilities for ciclops-core
//!
//! This module provides testing infrastructure including a mock Ollama server
//! that can be used for development and integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::ai::ClassificationSuggestion;

/// How the mock answers classification prompts
#[derive(Clone)]
enum Reply {
    /// Guess from the prompt's document text
    FromPrompt,
    /// Always the same suggestion
    Fixed(ClassificationSuggestion),
    /// Text that is not JSON
    Garbage,
}

struct MockState {
    reply: Reply,
    delay: Option<Duration>,
    requests: AtomicUsize,
}

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::spawn(Reply::FromPrompt, None).await
    }

    /// Start a server that always answers with `suggestion`
    pub async fn with_suggestion(suggestion: ClassificationSuggestion) -> Self {
        Self::spawn(Reply::Fixed(suggestion), None).await
    }

    /// Start a server that waits `delay` before every generate response
    pub async fn slow(delay: Duration) -> Self {
        Self::spawn(Reply::FromPrompt, Some(delay)).await
    }

    /// Start a server whose generate responses cannot be parsed
    pub async fn garbage() -> Self {
        Self::spawn(Reply::Garbage, None).await
    }

    async fn spawn(reply: Reply, delay: Option<Duration>) -> Self {
        let state = Arc::new(MockState {
            reply,
            delay,
            requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of generate requests received so far
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2025-01-01T00:00:00Z".to_string(),
            size: 4_000_000_000,
        }],
    })
}

/// Ollama generate endpoint
async fn handle_generate(
    State(state): State<Arc<MockState>>,
    Json(request): Json<GenerateRequest>,
) -> Json<GenerateResponse> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    let response = match &state.reply {
        Reply::FromPrompt => {
            let suggestion = suggest_from_prompt(&request.prompt);
            serde_json::to_string(&suggestion).unwrap()
        }
        Reply::Fixed(suggestion) => {
            // Wrapped in prose the way small models tend to answer
            format!(
                "Here is the classification:\n{}",
                serde_json::to_string(suggestion).unwrap()
            )
        }
        Reply::Garbage => "I am not sure what this document is.".to_string(),
    };

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
}

/// Guess from the sections of the classify_document prompt
fn suggest_from_prompt(prompt: &str) -> ClassificationSuggestion {
    let text = document_text(prompt).to_uppercase();

    let doc_type = if text.contains("ESTADO DE RESULTADOS") {
        "statement_of_results"
    } else if text.contains("ESTADO DE CUENTA") || text.contains("SALDO") {
        "bank_statement"
    } else if text.contains("VENTAS") || text.contains("CORTE") {
        "sales_report"
    } else if text.contains("INVENTARIO") || text.contains("EXISTENCIAS") {
        "inventory"
    } else {
        "unknown"
    };

    let store_guesses = prompt
        .lines()
        .find_map(|line| line.strip_prefix("Known stores: "))
        .map(|stores| {
            stores
                .split(", ")
                .filter(|name| !name.is_empty() && text.contains(&name.to_uppercase()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    ClassificationSuggestion {
        doc_type: Some(doc_type.to_string()),
        period_guess: None,
        store_guesses,
        confidence: 0.6,
    }
}

/// Text between the first pair of `"""` fences
fn document_text(prompt: &str) -> &str {
    let mut parts = prompt.splitn(3, "\"\"\"");
    parts.next();
    parts.next().unwrap_or("").trim()
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIBackend, OllamaBackend, SuggestionRequest};

    #[tokio::test]
    async fn test_mock_server_round_trip() {
        let server = MockOllamaServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");
        assert!(backend.health_check().await);

        let suggestion = backend
            .suggest_classification(&SuggestionRequest {
                document_text: "ESTADO DE RESULTADOS sucursal Centro".into(),
                line_items: vec!["VENTAS: 1000".into()],
                filename: None,
                known_stores: vec!["Centro".into(), "Universidad".into()],
            })
            .await
            .unwrap();
        assert_eq!(suggestion.doc_type.as_deref(), Some("statement_of_results"));
        assert_eq!(suggestion.store_guesses, vec!["Centro".to_string()]);
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_fixed_suggestion_survives_prose() {
        let fixed = ClassificationSuggestion {
            doc_type: Some("inventory".into()),
            period_guess: Some("2025-P3".into()),
            store_guesses: vec![],
            confidence: 0.9,
        };
        let server = MockOllamaServer::with_suggestion(fixed.clone()).await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");
        let suggestion = backend
            .suggest_classification(&SuggestionRequest::default())
            .await
            .unwrap();
        assert_eq!(suggestion, fixed);
    }

    #[tokio::test]
    async fn test_garbage_reply_is_an_error() {
        let server = MockOllamaServer::garbage().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");
        assert!(backend
            .suggest_classification(&SuggestionRequest::default())
            .await
            .is_err());
    }
}
