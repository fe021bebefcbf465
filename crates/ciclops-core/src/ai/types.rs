//! AI backend response types
//!
//! These types are backend-agnostic and used across all AI implementations.

use serde::{Deserialize, Serialize};

/// Structured guess returned by the AI classification fallback
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationSuggestion {
    /// One of the document type names (`statement_of_results`, ...)
    #[serde(default)]
    pub doc_type: Option<String>,
    /// `2025-P11` or an ISO date inside the period
    #[serde(default)]
    pub period_guess: Option<String>,
    /// Store names or ids as written in the document
    #[serde(default)]
    pub store_guesses: Vec<String>,
    /// Model's own confidence, 0.0 - 1.0
    #[serde(default)]
    pub confidence: f64,
}

/// Backend identity for display
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub backend: String,
    pub model: String,
    pub host: String,
}

/// What the classification fallback is allowed to see about a document
#[derive(Debug, Clone, Default)]
pub struct SuggestionRequest {
    pub document_text: String,
    /// `label: amount` lines
    pub line_items: Vec<String>,
    pub filename: Option<String>,
    /// Display names of configured stores
    pub known_stores: Vec<String>,
}
