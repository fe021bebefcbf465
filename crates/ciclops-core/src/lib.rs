//! Ciclops Core Library
//!
//! Extraction and categorization pipeline for franchise financial documents:
//! - Fiscal calendar (13 periods of four weeks)
//! - Concept taxonomy and learnable correction memory
//! - Concept mapper from free-text labels to taxonomy leaves
//! - Document classifier (type, period, stores) with an optional AI fallback
//! - Metrics and anomaly evaluator producing per-store, per-period summaries
//! - Database access, migrations and the summary persistence contract
//! - Pipeline orchestration with per-key locking and cancellation

pub mod ai;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluate;
pub mod extraction;
pub mod fiscal;
pub mod locks;
pub mod mapper;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod store;
pub mod stores;
pub mod taxonomy;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AIBackend, AIClient, AnthropicBackend, BackendInfo, ClassificationSuggestion, MockBackend,
    OllamaBackend, SuggestionRequest,
};
pub use classify::{
    AssistedClassifier, ClassificationInput, Classifier, ClassifierConfig, HeuristicClassifier,
};
pub use config::PipelineConfig;
pub use db::{Database, IngestResult};
pub use error::{Error, Result, Stage};
pub use evaluate::{AnomalyConfig, MetricsEvaluator};
pub use extraction::{ExtractionInput, LineItemInput};
pub use fiscal::{FiscalCalendar, FiscalPeriod};
pub use locks::ProcessingLocks;
pub use mapper::{CategoryMapping, ConceptMapper, MapperConfig};
pub use memory::{Correction, CorrectionEvent, CorrectionMemory, CorrectionTarget, MemoryKey};
pub use pipeline::{CancelToken, Pipeline, ProcessingReport};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use store::SummaryStore;
pub use stores::{FuzzyConfig, StoreRegistry, UNASSIGNED_STORE};
pub use taxonomy::{Branch, Category};
