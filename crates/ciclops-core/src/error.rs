//! Error types for Ciclops

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Pipeline stage where a fatal error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Classify,
    Map,
    Evaluate,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Classify => "classify",
            Self::Map => "map",
            Self::Evaluate => "evaluate",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid date: {date} is outside the supported fiscal range")]
    InvalidDate { date: String },

    #[error("Document {} has no line items (stage: {stage})", display_doc(.document_id))]
    EmptyDocument {
        document_id: Option<i64>,
        stage: Stage,
    },

    #[error("Summary for store {store_id}, period {period} is already being processed")]
    ConcurrentProcessing { store_id: String, period: String },

    #[error("Processing of document {document_id} was cancelled (stage: {stage})")]
    Cancelled { document_id: i64, stage: Stage },

    #[error("Document {document_id} failed at {stage}: {source}")]
    Pipeline {
        document_id: i64,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

fn display_doc(id: &Option<i64>) -> String {
    id.map(|i| i.to_string()).unwrap_or_else(|| "<unsaved>".into())
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// Attach document and stage context to a fatal error.
    ///
    /// Errors that already carry a document id are filled in or kept as-is;
    /// anything else is wrapped in `Error::Pipeline`.
    pub fn at(self, document_id: i64, stage: Stage) -> Self {
        match self {
            Error::EmptyDocument { document_id: None, stage } => Error::EmptyDocument {
                document_id: Some(document_id),
                stage,
            },
            e @ (Error::EmptyDocument { .. }
            | Error::Cancelled { .. }
            | Error::Pipeline { .. }
            | Error::ConcurrentProcessing { .. }) => e,
            other => Error::Pipeline {
                document_id,
                stage,
                source: Box::new(other),
            },
        }
    }

    /// True when the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConcurrentProcessing { .. } => true,
            Error::Pipeline { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Innermost error, skipping pipeline context wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_fills_document_id() {
        let err = Error::EmptyDocument {
            document_id: None,
            stage: Stage::Classify,
        }
        .at(7, Stage::Classify);

        match err {
            Error::EmptyDocument { document_id, stage } => {
                assert_eq!(document_id, Some(7));
                assert_eq!(stage, Stage::Classify);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_at_wraps_other_errors() {
        let err = Error::InvalidData("bad".into()).at(3, Stage::Persist);
        assert!(matches!(
            err,
            Error::Pipeline {
                document_id: 3,
                stage: Stage::Persist,
                ..
            }
        ));
        assert!(matches!(err.root(), Error::InvalidData(_)));
        assert!(err.to_string().contains("persist"));
    }

    #[test]
    fn test_retryable() {
        let err = Error::ConcurrentProcessing {
            store_id: "CENTRO".into(),
            period: "2025-P3".into(),
        };
        assert!(err.is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
    }
}
