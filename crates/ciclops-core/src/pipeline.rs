//! End-to-end document processing
//!
//! ```text
//! ingest -> classify -> map -> partition per store -> lock -> evaluate -> persist -> touch memory
//! ```
//!
//! A run either writes the summaries for every store the document covers or
//! writes nothing. Corrections used by the run are counted only after its
//! summaries are committed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ai::AIClient;
use crate::classify::{AssistedClassifier, ClassificationInput, Classifier, HeuristicClassifier};
use crate::config::PipelineConfig;
use crate::db::{Database, IngestResult};
use crate::error::{Error, Result, Stage};
use crate::evaluate::MetricsEvaluator;
use crate::extraction::ExtractionInput;
use crate::fiscal::{FiscalCalendar, FiscalPeriod};
use crate::locks::{KeyGuard, ProcessingLocks};
use crate::mapper::ConceptMapper;
use crate::memory::{Correction, CorrectionMemory, MemoryKey};
use crate::models::{
    DocumentClassification, DocumentStatus, FinancialSummary, MappedLineItem, MappingSource,
};
use crate::store::SummaryStore;
use crate::stores::{StoreRegistry, UNASSIGNED_STORE};
use crate::taxonomy::Category;

/// Shared cancellation flag for a processing run
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, document_id: i64, stage: Stage) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled { document_id, stage });
        }
        Ok(())
    }
}

/// What one processing run produced
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub document_id: i64,
    pub classification: DocumentClassification,
    pub period: FiscalPeriod,
    /// True when the period came from the upload date
    pub period_inferred: bool,
    pub summaries: Vec<FinancialSummary>,
    pub unmapped_items: usize,
    /// Stored corrections counted as reused by this run
    pub reused_corrections: usize,
}

pub struct Pipeline {
    db: Database,
    memory: Arc<CorrectionMemory>,
    registry: Arc<StoreRegistry>,
    classifier: Arc<dyn Classifier>,
    mapper: ConceptMapper,
    evaluator: MetricsEvaluator,
    calendar: FiscalCalendar,
    locks: ProcessingLocks,
}

impl Pipeline {
    /// Build a pipeline over `db`, loading the correction memory from it and
    /// syncing the configured stores into it
    pub fn new(db: Database, config: &PipelineConfig, ai: Option<AIClient>) -> Result<Self> {
        let memory = Arc::new(db.load_correction_memory()?);
        db.sync_stores(&config.stores)?;
        let registry = Arc::new(config.store_registry());

        let heuristic = HeuristicClassifier::with_config(
            config.calendar.clone(),
            registry.clone(),
            memory.clone(),
            config.classifier.clone(),
        );
        let classifier: Arc<dyn Classifier> = Arc::new(AssistedClassifier::new(heuristic, ai));

        info!(
            corrections = memory.len(),
            stores = registry.stores().len(),
            "Pipeline ready"
        );

        Ok(Self {
            mapper: ConceptMapper::with_config(memory.clone(), config.mapper.clone()),
            evaluator: MetricsEvaluator::with_config(config.anomalies.clone()),
            calendar: config.calendar.clone(),
            db,
            memory,
            registry,
            classifier,
            locks: ProcessingLocks::new(),
        })
    }

    /// Replace the classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn memory(&self) -> &Arc<CorrectionMemory> {
        &self.memory
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    pub fn calendar(&self) -> &FiscalCalendar {
        &self.calendar
    }

    pub fn locks(&self) -> &ProcessingLocks {
        &self.locks
    }

    /// Store an extraction. Identical content returns the existing document.
    pub fn ingest(&self, input: &ExtractionInput) -> Result<IngestResult> {
        if input.tenant_id.trim().is_empty() {
            return Err(Error::InvalidData("tenant_id must not be empty".into()));
        }
        if input.line_items.is_empty() {
            return Err(Error::EmptyDocument {
                document_id: None,
                stage: Stage::Ingest,
            });
        }

        let result = self.db.insert_document(input)?;
        info!(
            document_id = result.document_id,
            created = result.created,
            items = input.line_items.len(),
            "Ingested document"
        );
        Ok(result)
    }

    /// Process a pending document
    pub async fn process(&self, document_id: i64, cancel: &CancelToken) -> Result<ProcessingReport> {
        let doc = self
            .db
            .require_document(document_id)
            .map_err(|e| e.at(document_id, Stage::Ingest))?;
        if doc.status == DocumentStatus::Processed {
            return Err(Error::InvalidData(format!(
                "Document {} is already processed; reprocess it instead",
                document_id
            ))
            .at(document_id, Stage::Ingest));
        }
        self.run_tracked(document_id, cancel).await
    }

    /// Re-run the pipeline on a stored document, replacing what it wrote before
    pub async fn reprocess(
        &self,
        document_id: i64,
        cancel: &CancelToken,
    ) -> Result<ProcessingReport> {
        info!(document_id, "Reprocessing document");
        self.run_tracked(document_id, cancel).await
    }

    /// Ingest and process in one step. Already-processed content is reprocessed.
    pub async fn submit(
        &self,
        input: &ExtractionInput,
        cancel: &CancelToken,
    ) -> Result<ProcessingReport> {
        let ingested = self.ingest(input)?;
        self.run_tracked(ingested.document_id, cancel).await
    }

    /// Run and record the outcome on the document row
    async fn run_tracked(&self, document_id: i64, cancel: &CancelToken) -> Result<ProcessingReport> {
        match self.run(document_id, cancel).await {
            Ok(report) => {
                self.db
                    .set_document_status(document_id, DocumentStatus::Processed, None)
                    .map_err(|e| e.at(document_id, Stage::Persist))?;
                Ok(report)
            }
            Err(e) => {
                let status = match e.root() {
                    Error::Cancelled { .. } => Some(DocumentStatus::Cancelled),
                    // Retryable; the document stays as it was
                    Error::ConcurrentProcessing { .. } => None,
                    Error::NotFound(_) => None,
                    _ => Some(DocumentStatus::Failed),
                };
                if let Some(status) = status {
                    if let Err(db_err) =
                        self.db
                            .set_document_status(document_id, status, Some(&e.to_string()))
                    {
                        warn!(document_id, error = %db_err, "Failed to record document status");
                    }
                }
                warn!(document_id, error = %e, "Document processing failed");
                Err(e)
            }
        }
    }

    async fn run(&self, document_id: i64, cancel: &CancelToken) -> Result<ProcessingReport> {
        let doc = self
            .db
            .require_document(document_id)
            .map_err(|e| e.at(document_id, Stage::Ingest))?;

        let raw_items = doc.extraction.raw_items();
        if raw_items.is_empty() {
            return Err(Error::EmptyDocument {
                document_id: Some(document_id),
                stage: Stage::Classify,
            });
        }

        let input = ClassificationInput::new(
            &doc.extraction.raw_text,
            &raw_items,
            doc.extraction.filename_hint.as_deref(),
        );
        let classification = self
            .classifier
            .classify(&input)
            .await
            .map_err(|e| e.at(document_id, Stage::Classify))?;
        cancel.check(document_id, Stage::Classify)?;

        let (period, period_inferred) = match classification.period {
            Some(period) => (period, false),
            None => {
                let period = self
                    .calendar
                    .period_for(doc.uploaded_at.date_naive())
                    .map_err(|e| e.at(document_id, Stage::Classify))?;
                debug!(document_id, period = %period, "Period inferred from upload date");
                (period, true)
            }
        };

        let mapped = self.mapper.map_items(&raw_items);
        let unmapped_items = mapped
            .iter()
            .filter(|m| m.mapping_source == MappingSource::Unmapped)
            .count();
        let sections = self.partition(&classification, mapped);

        // Take every key up front so the run is all-or-nothing
        let _guards: Vec<KeyGuard> = sections
            .keys()
            .map(|store_id| self.locks.try_acquire(store_id, &period))
            .collect::<Result<_>>()
            .map_err(|e| e.at(document_id, Stage::Evaluate))?;

        cancel.check(document_id, Stage::Evaluate)?;

        let mut summaries = Vec::with_capacity(sections.len());
        let mut used_keys: BTreeSet<MemoryKey> = classification.memory_keys.iter().cloned().collect();
        for (store_id, items) in &sections {
            used_keys.extend(items.iter().filter_map(|i| i.memory_key.clone()));
            let mut summary = self
                .evaluate_store(&self.db, store_id, period, items)
                .map_err(|e| e.at(document_id, Stage::Evaluate))?;
            summary.period_inferred = period_inferred;
            summary.document_id = Some(document_id);
            summaries.push(summary);
        }

        cancel.check(document_id, Stage::Persist)?;

        // Nothing about this run is stored until cancellation is ruled out
        self.db
            .set_document_classification(document_id, &classification)
            .map_err(|e| e.at(document_id, Stage::Persist))?;
        self.db
            .replace_document_summaries(document_id, &summaries)
            .map_err(|e| e.at(document_id, Stage::Persist))?;

        let keys: Vec<MemoryKey> = used_keys.into_iter().collect();
        let events = self.memory.touch(&keys);
        self.db
            .save_reuse(&self.memory, &events)
            .map_err(|e| e.at(document_id, Stage::Persist))?;

        info!(
            document_id,
            doc_type = %classification.doc_type,
            period = %period,
            period_inferred,
            stores = summaries.len(),
            unmapped_items,
            "Processed document"
        );

        Ok(ProcessingReport {
            document_id,
            classification,
            period,
            period_inferred,
            summaries,
            unmapped_items,
            reused_corrections: events.len(),
        })
    }

    /// Evaluate one store's items against its prior-period summary
    fn evaluate_store(
        &self,
        store: &dyn SummaryStore,
        store_id: &str,
        period: FiscalPeriod,
        items: &[MappedLineItem],
    ) -> Result<FinancialSummary> {
        let prior = match self.calendar.previous(&period) {
            Ok(prior_period) => store.get_summary(store_id, &prior_period)?,
            // First supported period has no predecessor
            Err(Error::InvalidDate { .. }) => None,
            Err(e) => return Err(e),
        };
        self.evaluator
            .evaluate(store_id, period, items, prior.as_ref())
    }

    /// Split items into per-store sections.
    ///
    /// An unmapped item whose label names one of the document's stores is a
    /// section header: it switches the current store and is dropped when its
    /// amount is zero. Items before the first header belong to the first
    /// header's store. Without headers everything goes to the primary store,
    /// and a document with no stores goes to `UNASSIGNED`.
    fn partition(
        &self,
        classification: &DocumentClassification,
        items: Vec<MappedLineItem>,
    ) -> BTreeMap<String, Vec<MappedLineItem>> {
        let stores = &classification.stores;
        let mut sections: BTreeMap<String, Vec<MappedLineItem>> = BTreeMap::new();

        let default_store = classification
            .primary_store
            .as_ref()
            .filter(|id| stores.contains(*id))
            .or_else(|| stores.iter().next());
        let Some(default_store) = default_store else {
            sections.insert(UNASSIGNED_STORE.to_string(), items);
            return sections;
        };
        if stores.len() == 1 {
            sections.insert(default_store.clone(), items);
            return sections;
        }

        let headers: Vec<Option<String>> = items
            .iter()
            .map(|item| {
                if item.category != Category::Unknown {
                    return None;
                }
                self.registry
                    .match_label(&item.label, Some(self.memory.as_ref()))
                    .map(|m| m.store_id)
                    .filter(|id| stores.contains(id))
            })
            .collect();

        let mut current = headers
            .iter()
            .flatten()
            .next()
            .unwrap_or(default_store)
            .clone();
        if headers.iter().all(Option::is_none) {
            warn!(
                stores = ?stores,
                store = %current,
                "Multi-store document without section headers"
            );
        }

        for (item, header) in items.into_iter().zip(headers) {
            if let Some(store_id) = header {
                current = store_id;
                if item.amount == Decimal::ZERO {
                    continue;
                }
            }
            sections.entry(current.clone()).or_default().push(item);
        }

        debug!(
            sections = ?sections.iter().map(|(k, v)| (k.as_str(), v.len())).collect::<Vec<_>>(),
            "Partitioned line items"
        );
        sections
    }

    /// Teach the mapper that `label` means `category`
    pub fn submit_correction(
        &self,
        label: &str,
        category: Category,
        confidence: Option<f64>,
    ) -> Result<Correction> {
        let outcome = self.memory.record_with(
            label,
            category,
            confidence.unwrap_or(1.0),
            |outcome| self.db.save_record_outcome(outcome),
        )?;
        info!(
            label = %label,
            category = %category.path(),
            created = outcome.created,
            "Correction recorded"
        );
        Ok(outcome.correction)
    }

    /// Teach the classifier that `label` names store `store_id`
    pub fn submit_store_correction(
        &self,
        label: &str,
        store_id: &str,
        confidence: Option<f64>,
    ) -> Result<Correction> {
        if !self.registry.contains(store_id) {
            return Err(Error::NotFound(format!("Store {}", store_id)));
        }
        let outcome = self.memory.record_store_alias_with(
            label,
            store_id,
            confidence.unwrap_or(1.0),
            |outcome| self.db.save_record_outcome(outcome),
        )?;
        info!(
            label = %label,
            store = %store_id,
            created = outcome.created,
            "Store correction recorded"
        );
        Ok(outcome.correction)
    }

    pub fn get_summary(
        &self,
        store_id: &str,
        period: &FiscalPeriod,
    ) -> Result<Option<FinancialSummary>> {
        SummaryStore::get_summary(&self.db, store_id, period)
    }

    /// Fiscal period containing `date`
    pub fn period_for(&self, date: NaiveDate) -> Result<FiscalPeriod> {
        self.calendar.period_for(date)
    }
}
