//! Mock backend for testing
//!
//! Returns a configurable suggestion, optionally after a delay or as a
//! failure, so the assisted classifier can be tested without a model server.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::{ClassificationSuggestion, SuggestionRequest};
use super::AIBackend;

#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    suggestion: ClassificationSuggestion,
    fail: bool,
    delay: Option<Duration>,
}

impl MockBackend {
    /// Create a new mock backend (healthy, empty suggestion)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Return this suggestion from every call
    pub fn with_suggestion(mut self, suggestion: ClassificationSuggestion) -> Self {
        self.suggestion = suggestion;
        self
    }

    /// Fail every call
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// No-op for mock
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn suggest_classification(
        &self,
        _request: &SuggestionRequest,
    ) -> Result<ClassificationSuggestion> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::InvalidData("mock backend failure".into()));
        }
        Ok(self.suggestion.clone())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_configured_suggestion() {
        let backend = MockBackend::new().with_suggestion(ClassificationSuggestion {
            doc_type: Some("sales_report".into()),
            confidence: 0.6,
            ..Default::default()
        });
        let s = backend
            .suggest_classification(&SuggestionRequest::default())
            .await
            .unwrap();
        assert_eq!(s.doc_type.as_deref(), Some("sales_report"));
        assert!(backend.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_failing_and_unhealthy() {
        let backend = MockBackend::unhealthy().failing();
        assert!(backend
            .suggest_classification(&SuggestionRequest::default())
            .await
            .is_err());
        assert!(!backend.health_check().await);
    }
}
