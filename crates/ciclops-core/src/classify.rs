//! Document classification: type, fiscal period and stores
//!
//! `Classifier` is the capability the pipeline depends on. Two
//! implementations exist:
//!
//! - `HeuristicClassifier`: keyword scoring, period markers and dates, store
//!   registry matching. Always available and deterministic.
//! - `AssistedClassifier`: runs the heuristics, then asks an AI backend to
//!   fill whatever is still missing. The backend call runs under a timeout and
//!   any failure leaves the heuristic result untouched.
//!
//! Confidence is `w_type * type_signal + w_period * [period] + w_store * [store]`
//! normalized by the weight sum, so each positive signal can only raise it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::{AIBackend, AIClient, ClassificationSuggestion, SuggestionRequest};
use crate::error::{Error, Result, Stage};
use crate::fiscal::{FiscalCalendar, FiscalPeriod};
use crate::memory::{CorrectionMemory, MemoryKey};
use crate::models::{DocumentClassification, DocumentType, PeriodSource, RawLineItem};
use crate::normalize;
use crate::stores::StoreRegistry;

/// Keywords this short only match whole tokens
const SHORT_KEYWORD_CHARS: usize = 3;

/// Keywords characteristic of each document type
const TYPE_KEYWORDS: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::StatementOfResults,
        &[
            "estado de resultados",
            "perdidas y ganancias",
            "utilidad bruta",
            "utilidad neta",
            "utilidad de operacion",
            "costo de ventas",
            "gastos de operacion",
            "utilidad",
        ],
    ),
    (
        DocumentType::BankStatement,
        &[
            "estado de cuenta",
            "saldo",
            "movimientos",
            "cargo",
            "abono",
            "cuenta",
            "banco",
            "clabe",
        ],
    ),
    (
        DocumentType::SalesReport,
        &[
            "reporte de ventas",
            "ventas",
            "tickets",
            "transacciones",
            "mostrador",
            "delivery",
            "total del dia",
            "corte",
        ],
    ),
    (
        DocumentType::Inventory,
        &[
            "inventario",
            "stock",
            "existencia",
            "producto",
            "cantidad",
            "unidad",
            "almacen",
        ],
    ),
];

/// "Periodo 11", "periodo: 4" or a compact "P11"/"P-07". A spaced or
/// dotted "p. 2" is a page number, not a period.
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:periodo|period)[\s.:#]*(\d{1,2})\b|\bp-?(\d{1,2})\b").expect("valid regex")
});
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2})\b").expect("valid regex"));
static ISO_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{1,2})(?:-(\d{1,2}))?\b").expect("valid regex")
});
static DMY_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{4})\b").expect("valid regex")
});
static SPANISH_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d{1,2})\s+de\s+(enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|setiembre|octubre|noviembre|diciembre)\s+(?:de\s+|del\s+)?(\d{4})\b",
    )
    .expect("valid regex")
});

/// A full written date ("5 de febrero de 2025"). Removed before store
/// matching so dates don't read as store names like "5 de Febrero".
static WRITTEN_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b\d{1,2}\s+de\s+(?:enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|setiembre|octubre|noviembre|diciembre)\s+del?\s+\d{4}\b",
    )
    .expect("valid regex")
});

const MONTHS: &[&str] = &[
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub type_weight: f64,
    pub period_weight: f64,
    pub store_weight: f64,
    /// Budget for the AI fallback call
    pub ai_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            type_weight: 0.5,
            period_weight: 0.25,
            store_weight: 0.25,
            ai_timeout_secs: 10,
        }
    }
}

/// What a classifier sees of a document
#[derive(Debug, Clone, Copy)]
pub struct ClassificationInput<'a> {
    pub raw_text: &'a str,
    pub line_items: &'a [RawLineItem],
    pub filename_hint: Option<&'a str>,
}

impl<'a> ClassificationInput<'a> {
    pub fn new(
        raw_text: &'a str,
        line_items: &'a [RawLineItem],
        filename_hint: Option<&'a str>,
    ) -> Self {
        Self {
            raw_text,
            line_items,
            filename_hint,
        }
    }
}

/// Document classification capability
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, input: &ClassificationInput<'_>) -> Result<DocumentClassification>;
}

/// Strength of each confidence signal in [0, 1]
#[derive(Debug, Clone, Copy, Default)]
struct Signals {
    doc_type: f64,
    period: f64,
    store: f64,
}

pub struct HeuristicClassifier {
    calendar: FiscalCalendar,
    registry: Arc<StoreRegistry>,
    memory: Arc<CorrectionMemory>,
    config: ClassifierConfig,
}

impl HeuristicClassifier {
    pub fn new(
        calendar: FiscalCalendar,
        registry: Arc<StoreRegistry>,
        memory: Arc<CorrectionMemory>,
    ) -> Self {
        Self::with_config(calendar, registry, memory, ClassifierConfig::default())
    }

    pub fn with_config(
        calendar: FiscalCalendar,
        registry: Arc<StoreRegistry>,
        memory: Arc<CorrectionMemory>,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            calendar,
            registry,
            memory,
            config,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    /// Synchronous heuristic classification
    pub fn classify_now(&self, input: &ClassificationInput<'_>) -> Result<DocumentClassification> {
        self.run(input).map(|(classification, _)| classification)
    }

    fn run(&self, input: &ClassificationInput<'_>) -> Result<(DocumentClassification, Signals)> {
        if input.line_items.is_empty() {
            return Err(Error::EmptyDocument {
                document_id: None,
                stage: Stage::Classify,
            });
        }

        let (doc_type, type_signal) = self.detect_type(input);
        let period = self.detect_period(input.raw_text, input.filename_hint);
        let StoreDetection {
            stores,
            primary_store,
            sectioned,
            memory_keys,
        } = self.detect_stores(input);

        let signals = Signals {
            doc_type: type_signal,
            period: if period.is_some() { 1.0 } else { 0.0 },
            store: match stores.len() {
                0 => 0.0,
                1 => 1.0,
                // Several stores but no line-item section headers to split on
                _ if !sectioned => 0.5,
                _ => 1.0,
            },
        };
        let confidence = self.confidence(signals);

        debug!(
            doc_type = %doc_type,
            period = ?period.map(|(p, _)| p.key()),
            stores = ?stores,
            primary_store = ?primary_store,
            confidence,
            "Heuristic classification"
        );

        Ok((
            DocumentClassification {
                doc_type,
                period: period.map(|(p, _)| p),
                period_source: period.map(|(_, s)| s),
                stores,
                primary_store,
                confidence,
                memory_keys,
            },
            signals,
        ))
    }

    fn confidence(&self, signals: Signals) -> f64 {
        let c = &self.config;
        let total = c.type_weight + c.period_weight + c.store_weight;
        if total <= 0.0 {
            return 0.0;
        }
        let score = c.type_weight * signals.doc_type
            + c.period_weight * signals.period
            + c.store_weight * signals.store;
        (score / total).clamp(0.0, 1.0)
    }

    /// Highest keyword score wins; ties go to the earlier type in priority order.
    /// Matches in the body text or filename weigh double those in labels only.
    fn detect_type(&self, input: &ClassificationInput<'_>) -> (DocumentType, f64) {
        let body = normalize::phrase(&format!(
            "{} {}",
            input.raw_text,
            input.filename_hint.unwrap_or_default()
        ));
        let labels: Vec<String> = input
            .line_items
            .iter()
            .map(|i| normalize::phrase(&i.label))
            .collect();

        let mut scores: Vec<(DocumentType, u32)> = DocumentType::PRIORITY
            .iter()
            .map(|t| (*t, 0))
            .collect();

        for (doc_type, keywords) in TYPE_KEYWORDS {
            let mut score = 0;
            for keyword in *keywords {
                let phrase = normalize::phrase(keyword);
                let weight = phrase.split(' ').count() as u32;
                if normalize::contains_keyword(&body, &phrase, SHORT_KEYWORD_CHARS) {
                    score += 2 * weight;
                } else if labels
                    .iter()
                    .any(|l| normalize::contains_keyword(l, &phrase, SHORT_KEYWORD_CHARS))
                {
                    score += weight;
                }
            }
            if let Some(entry) = scores.iter_mut().find(|entry| entry.0 == *doc_type) {
                entry.1 = score;
            }
        }

        // Stable sort keeps priority order among equal scores
        scores.sort_by(|a, b| b.1.cmp(&a.1));
        let (best_type, best) = scores[0];
        if best == 0 {
            return (DocumentType::Unknown, 0.0);
        }
        let second = scores.get(1).map(|s| s.1).unwrap_or(0);
        let margin = f64::from(best - second) / f64::from(best);
        (best_type, 0.5 + 0.5 * margin)
    }

    /// Markers in the text, then dates in the text, then the filename
    fn detect_period(
        &self,
        raw_text: &str,
        filename_hint: Option<&str>,
    ) -> Option<(FiscalPeriod, PeriodSource)> {
        let text = fold_text(raw_text);
        let text_years = years_in(&text);

        if let Some(period) = self.marker_period(&text, &text_years) {
            return Some((period, PeriodSource::Marker));
        }
        if let Some(period) = self.date_period(&text) {
            return Some((period, PeriodSource::Dates));
        }

        let filename = fold_text(filename_hint?);
        let mut years = years_in(&filename);
        if years.is_empty() {
            years = text_years;
        }
        self.marker_period(&filename, &years)
            .or_else(|| self.date_period(&filename))
            .map(|p| (p, PeriodSource::FilenameHint))
    }

    fn marker_period(&self, text: &str, years: &[i32]) -> Option<FiscalPeriod> {
        let year = most_frequent(years.iter().copied())?;
        let candidates = MARKER_RE
            .captures_iter(text)
            .filter_map(|cap| cap.get(1).or_else(|| cap.get(2))?.as_str().parse::<u32>().ok())
            .filter(|n| (1..=13).contains(n))
            .filter_map(|n| self.resolve(|cal| cal.period(year, n)));
        most_frequent(candidates)
    }

    fn date_period(&self, text: &str) -> Option<FiscalPeriod> {
        let candidates = dates_in(text)
            .into_iter()
            .filter_map(|date| self.resolve(|cal| cal.period_for(date)));
        most_frequent(candidates)
    }

    /// Resolve a candidate, dropping it with a warning if it falls outside the calendar
    fn resolve(
        &self,
        f: impl FnOnce(&FiscalCalendar) -> Result<FiscalPeriod>,
    ) -> Option<FiscalPeriod> {
        match f(&self.calendar) {
            Ok(period) => Some(period),
            Err(e) => {
                warn!(error = %e, "Skipping period candidate");
                None
            }
        }
    }

    /// Stores named in the text lines, then line-item labels, then the
    /// filename. Written dates are removed first.
    fn detect_stores(&self, input: &ClassificationInput<'_>) -> StoreDetection {
        let mut detection = StoreDetection::default();
        let mut header_stores = BTreeSet::new();

        let texts = input
            .raw_text
            .lines()
            .map(|line| (line, false))
            .chain(input.line_items.iter().map(|i| (i.label.as_str(), true)))
            .chain(input.filename_hint.map(|f| (f, false)));

        for (text, is_label) in texts {
            let text = strip_written_dates(&fold_text(text));
            for m in self.registry.find_in_text(&text, Some(self.memory.as_ref())) {
                if detection.primary_store.is_none() {
                    detection.primary_store = Some(m.store_id.clone());
                }
                if is_label {
                    header_stores.insert(m.store_id.clone());
                }
                detection.stores.insert(m.store_id);
                if let Some(key) = m.memory_key {
                    if !detection.memory_keys.contains(&key) {
                        detection.memory_keys.push(key);
                    }
                }
            }
        }
        detection.sectioned = header_stores.len() > 1;
        detection
    }
}

#[derive(Debug, Default)]
struct StoreDetection {
    stores: BTreeSet<String>,
    primary_store: Option<String>,
    /// More than one store appears as a line-item label
    sectioned: bool,
    memory_keys: Vec<MemoryKey>,
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn classify(&self, input: &ClassificationInput<'_>) -> Result<DocumentClassification> {
        self.classify_now(input)
    }
}

/// Heuristics first, AI backend for the gaps
pub struct AssistedClassifier {
    heuristic: HeuristicClassifier,
    ai: Option<AIClient>,
    timeout: Duration,
}

impl AssistedClassifier {
    pub fn new(heuristic: HeuristicClassifier, ai: Option<AIClient>) -> Self {
        let timeout = Duration::from_secs(heuristic.config.ai_timeout_secs);
        Self {
            heuristic,
            ai,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ai(&self) -> Option<&AIClient> {
        self.ai.as_ref()
    }

    fn request(&self, input: &ClassificationInput<'_>) -> SuggestionRequest {
        SuggestionRequest {
            document_text: input.raw_text.to_string(),
            line_items: input
                .line_items
                .iter()
                .map(|i| format!("{}: {}", i.label, i.amount))
                .collect(),
            filename: input.filename_hint.map(str::to_string),
            known_stores: self
                .heuristic
                .registry
                .stores()
                .iter()
                .map(|s| s.name.clone())
                .collect(),
        }
    }

    /// Fill gaps from a suggestion; confidence never drops
    fn merge(
        &self,
        classification: &mut DocumentClassification,
        mut signals: Signals,
        suggestion: ClassificationSuggestion,
    ) {
        let ai_confidence = suggestion.confidence;

        if classification.doc_type == DocumentType::Unknown {
            if let Some(doc_type) = suggestion
                .doc_type
                .as_deref()
                .and_then(|t| t.parse::<DocumentType>().ok())
                .filter(|t| *t != DocumentType::Unknown)
            {
                classification.doc_type = doc_type;
                signals.doc_type = 0.5 * ai_confidence;
            }
        }

        if classification.period.is_none() {
            if let Some(period) = suggestion
                .period_guess
                .as_deref()
                .and_then(|g| self.parse_period_guess(g))
            {
                classification.period = Some(period);
                classification.period_source = Some(PeriodSource::Assisted);
                signals.period = ai_confidence;
            }
        }

        if classification.stores.is_empty() {
            for guess in &suggestion.store_guesses {
                let resolved = self.heuristic.registry.resolve(guess).or_else(|| {
                    self.heuristic
                        .registry
                        .match_label(guess, Some(self.heuristic.memory.as_ref()))
                        .map(|m| m.store_id)
                });
                match resolved {
                    Some(store_id) => {
                        if classification.primary_store.is_none() {
                            classification.primary_store = Some(store_id.clone());
                        }
                        classification.stores.insert(store_id);
                    }
                    None => debug!(guess = %guess, "Ignoring unknown store guess"),
                }
            }
            if !classification.stores.is_empty() {
                signals.store = ai_confidence;
            }
        }

        let recomputed = self.heuristic.confidence(signals);
        classification.confidence = classification.confidence.max(recomputed);
    }

    fn parse_period_guess(&self, guess: &str) -> Option<FiscalPeriod> {
        let calendar = &self.heuristic.calendar;
        if let Ok(period) = calendar.parse_period(guess) {
            return Some(period);
        }
        match NaiveDate::parse_from_str(guess.trim(), "%Y-%m-%d") {
            Ok(date) => self.heuristic.resolve(|cal| cal.period_for(date)),
            Err(_) => {
                debug!(guess = %guess, "Unparseable period guess");
                None
            }
        }
    }
}

#[async_trait]
impl Classifier for AssistedClassifier {
    async fn classify(&self, input: &ClassificationInput<'_>) -> Result<DocumentClassification> {
        let (mut classification, signals) = self.heuristic.run(input)?;

        let Some(ai) = &self.ai else {
            return Ok(classification);
        };
        let has_gaps = classification.doc_type == DocumentType::Unknown
            || classification.period.is_none()
            || classification.stores.is_empty();
        if !has_gaps {
            return Ok(classification);
        }

        let request = self.request(input);
        match tokio::time::timeout(self.timeout, ai.suggest_classification(&request)).await {
            Ok(Ok(suggestion)) => {
                debug!(?suggestion, "AI classification suggestion");
                self.merge(&mut classification, signals, suggestion);
            }
            Ok(Err(e)) => {
                warn!(error = %e, host = %ai.host(), "AI classification fallback failed, using heuristics");
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    host = %ai.host(),
                    "AI classification fallback timed out, using heuristics"
                );
            }
        }
        Ok(classification)
    }
}

/// Lowercase, accent-free text with underscores as spaces, punctuation kept
fn fold_text(text: &str) -> String {
    text.chars()
        .filter(|c| !normalize::is_combining_mark(*c))
        .map(normalize::fold_accents)
        .map(|c| if c == '_' { ' ' } else { c })
        .collect::<String>()
        .to_lowercase()
}

fn strip_written_dates(text: &str) -> String {
    WRITTEN_DATE_RE.replace_all(text, " ").into_owned()
}

fn years_in(text: &str) -> Vec<i32> {
    YEAR_RE
        .captures_iter(text)
        .filter_map(|cap| cap[1].parse().ok())
        .collect()
}

/// ISO, day-first and Spanish long-form dates. `YYYY-MM` stands for the 15th.
fn dates_in(text: &str) -> Vec<NaiveDate> {
    let mut dates = Vec::new();

    for cap in ISO_DATE_RE.captures_iter(text) {
        let year = cap[1].parse().ok();
        let month = cap[2].parse().ok();
        let day = cap.get(3).map_or(Some(15), |d| d.as_str().parse().ok());
        if let (Some(y), Some(m), Some(d)) = (year, month, day) {
            dates.extend(NaiveDate::from_ymd_opt(y, m, d));
        }
    }

    for cap in DMY_DATE_RE.captures_iter(text) {
        let parsed = (
            cap[3].parse().ok(),
            cap[2].parse().ok(),
            cap[1].parse().ok(),
        );
        if let (Some(y), Some(m), Some(d)) = parsed {
            dates.extend(NaiveDate::from_ymd_opt(y, m, d));
        }
    }

    for cap in SPANISH_DATE_RE.captures_iter(text) {
        let month = MONTHS
            .iter()
            .position(|m| *m == &cap[2])
            .map(|i| i as u32 + 1)
            .or_else(|| (&cap[2] == "setiembre").then_some(9));
        if let (Some(d), Some(m), Some(y)) = (cap[1].parse().ok(), month, cap[3].parse().ok()) {
            dates.extend(NaiveDate::from_ymd_opt(y, m, d));
        }
    }

    dates
}

/// Most frequent value; ties go to the greatest
fn most_frequent<T: Ord>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: BTreeMap<T, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::models::Store;
    use rust_decimal::Decimal;

    fn items(labels: &[(&str, i64)]) -> Vec<RawLineItem> {
        labels
            .iter()
            .enumerate()
            .map(|(i, (label, amount))| RawLineItem {
                label: label.to_string(),
                amount: Decimal::from(*amount),
                source_row: i + 1,
            })
            .collect()
    }

    fn registry() -> Arc<StoreRegistry> {
        Arc::new(StoreRegistry::new(vec![
            Store {
                id: "5_FEBRERO".into(),
                name: "5 de Febrero".into(),
                aliases: vec![],
            },
            Store {
                id: "CENTRO".into(),
                name: "Centro".into(),
                aliases: vec![],
            },
            Store {
                id: "UNIVERSIDAD".into(),
                name: "Universidad".into(),
                aliases: vec![],
            },
        ]))
    }

    fn classifier_with(memory: Arc<CorrectionMemory>) -> HeuristicClassifier {
        HeuristicClassifier::new(FiscalCalendar::default(), registry(), memory)
    }

    fn classifier() -> HeuristicClassifier {
        classifier_with(Arc::new(CorrectionMemory::new()))
    }

    fn standard_items() -> Vec<RawLineItem> {
        items(&[("NOMINAS", 45000), ("CFE", 8000), ("VENTAS MOSTRADOR", 230000)])
    }

    #[test]
    fn test_statement_with_marker_and_store() {
        let items = standard_items();
        let text = "ESTADO DE RESULTADOS\nSucursal Centro\nPeriodo 11 2024\nUTILIDAD NETA";
        let c = classifier()
            .classify_now(&ClassificationInput::new(text, &items, None))
            .unwrap();
        assert_eq!(c.doc_type, DocumentType::StatementOfResults);
        let period = c.period.unwrap();
        assert_eq!((period.year, period.period_number), (2024, 11));
        assert_eq!(c.period_source, Some(PeriodSource::Marker));
        assert_eq!(c.stores.iter().collect::<Vec<_>>(), vec!["CENTRO"]);
        assert!(c.confidence > 0.75);
    }

    #[test]
    fn test_empty_line_items_fail() {
        let err = classifier()
            .classify_now(&ClassificationInput::new("ESTADO DE RESULTADOS", &[], None))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EmptyDocument {
                document_id: None,
                stage: Stage::Classify
            }
        ));
    }

    #[test]
    fn test_empty_text_uses_line_items() {
        let items = items(&[("SALDO INICIAL", 1000), ("ABONO", 500), ("CARGO", 200)]);
        let c = classifier()
            .classify_now(&ClassificationInput::new("", &items, None))
            .unwrap();
        assert_eq!(c.doc_type, DocumentType::BankStatement);
        assert!(c.period.is_none());
        assert!(c.stores.is_empty());
    }

    #[test]
    fn test_unknown_type_without_keywords() {
        let items = items(&[("XYZ", 1)]);
        let c = classifier()
            .classify_now(&ClassificationInput::new("", &items, None))
            .unwrap();
        assert_eq!(c.doc_type, DocumentType::Unknown);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn test_type_tie_goes_to_priority() {
        // "utilidad" (statement) and "saldo" (bank) score the same
        let items = items(&[("UTILIDAD", 1), ("SALDO", 1)]);
        let c = classifier()
            .classify_now(&ClassificationInput::new("", &items, None))
            .unwrap();
        assert_eq!(c.doc_type, DocumentType::StatementOfResults);
    }

    #[test]
    fn test_period_from_dates() {
        let items = standard_items();
        let cl = classifier();

        let iso = cl
            .classify_now(&ClassificationInput::new("Fecha: 2025-01-03", &items, None))
            .unwrap();
        let p = iso.period.unwrap();
        assert_eq!((p.year, p.period_number), (2024, 13));
        assert_eq!(iso.period_source, Some(PeriodSource::Dates));

        let dmy = cl
            .classify_now(&ClassificationInput::new("Corte al 10/02/2025", &items, None))
            .unwrap();
        let p = dmy.period.unwrap();
        assert_eq!((p.year, p.period_number), (2025, 2));

        let spanish = cl
            .classify_now(&ClassificationInput::new(
                "Emitido el 15 de enero de 2024",
                &items,
                None,
            ))
            .unwrap();
        let p = spanish.period.unwrap();
        assert_eq!((p.year, p.period_number), (2024, 1));
    }

    #[test]
    fn test_most_frequent_date_period_wins() {
        let items = standard_items();
        let text = "2025-01-08 2025-01-09 2025-02-10";
        let c = classifier()
            .classify_now(&ClassificationInput::new(text, &items, None))
            .unwrap();
        let p = c.period.unwrap();
        assert_eq!((p.year, p.period_number), (2025, 1));
    }

    #[test]
    fn test_marker_beats_dates() {
        let items = standard_items();
        let text = "P3 2025\nImpreso 2025-06-01";
        let c = classifier()
            .classify_now(&ClassificationInput::new(text, &items, None))
            .unwrap();
        assert_eq!(c.period.unwrap().period_number, 3);
    }

    #[test]
    fn test_page_numbers_are_not_period_markers() {
        let items = standard_items();
        let cl = classifier();

        let text = "Corte 2025-04-10\np. 2 de 5\nPag. 3";
        let c = cl
            .classify_now(&ClassificationInput::new(text, &items, None))
            .unwrap();
        assert_eq!(c.period_source, Some(PeriodSource::Dates));
        assert_eq!(c.period.unwrap().period_number, 4);

        for text in ["P11 2025", "Periodo: 11 2025", "reporte p-11 2025"] {
            let c = cl
                .classify_now(&ClassificationInput::new(text, &items, None))
                .unwrap();
            assert_eq!(c.period_source, Some(PeriodSource::Marker), "text {text}");
            assert_eq!(c.period.unwrap().period_number, 11, "text {text}");
        }
    }

    #[test]
    fn test_out_of_range_dates_are_skipped() {
        let items = standard_items();
        let c = classifier()
            .classify_now(&ClassificationInput::new("Fecha 1999-05-01", &items, None))
            .unwrap();
        assert!(c.period.is_none());
    }

    #[test]
    fn test_filename_hint_fallback() {
        let items = standard_items();
        let c = classifier()
            .classify_now(&ClassificationInput::new(
                "sin fecha",
                &items,
                Some("ER_UNIVERSIDAD_P07_2025.pdf"),
            ))
            .unwrap();
        let p = c.period.unwrap();
        assert_eq!((p.year, p.period_number), (2025, 7));
        assert_eq!(c.period_source, Some(PeriodSource::FilenameHint));
        assert!(c.stores.contains("UNIVERSIDAD"));
    }

    #[test]
    fn test_multiple_stores() {
        let items = items(&[("CENTRO", 0), ("VENTAS", 100), ("5 FEBRERO", 0), ("VENTAS", 200)]);
        let c = classifier()
            .classify_now(&ClassificationInput::new("", &items, None))
            .unwrap();
        assert_eq!(c.stores.len(), 2);
        assert!(c.stores.contains("CENTRO"));
        assert!(c.stores.contains("5_FEBRERO"));
    }

    #[test]
    fn test_written_dates_are_not_store_names() {
        let items = standard_items();
        let cl = classifier();
        let text = "ESTADO DE RESULTADOS\nSucursal Centro\nEmitido el 5 de febrero de 2025";
        let c = cl
            .classify_now(&ClassificationInput::new(text, &items, None))
            .unwrap();
        assert_eq!(c.stores.iter().collect::<Vec<_>>(), vec!["CENTRO"]);
        assert_eq!(c.primary_store.as_deref(), Some("CENTRO"));
        // The date still drives the period
        assert_eq!(c.period_source, Some(PeriodSource::Dates));

        let c = cl
            .classify_now(&ClassificationInput::new("Sucursal 5 de Febrero P4 2025", &items, None))
            .unwrap();
        assert_eq!(c.stores.iter().collect::<Vec<_>>(), vec!["5_FEBRERO"]);
    }

    #[test]
    fn test_unsectioned_multi_store_prefers_header_store() {
        let items = standard_items();
        let cl = classifier();
        let single = cl
            .classify_now(&ClassificationInput::new("Sucursal Universidad", &items, None))
            .unwrap();
        let mixed = cl
            .classify_now(&ClassificationInput::new(
                "Sucursal Universidad\nComparativo contra Centro",
                &items,
                None,
            ))
            .unwrap();
        assert_eq!(mixed.stores.len(), 2);
        assert_eq!(mixed.primary_store.as_deref(), Some("UNIVERSIDAD"));
        assert!(mixed.confidence < single.confidence);

        // Line-item headers make the split unambiguous
        let sectioned = items_with_headers();
        let c = cl
            .classify_now(&ClassificationInput::new("Sucursal Universidad", &sectioned, None))
            .unwrap();
        assert_eq!(c.stores.len(), 2);
        assert!(c.confidence > mixed.confidence);
    }

    fn items_with_headers() -> Vec<RawLineItem> {
        items(&[("UNIVERSIDAD", 0), ("VENTAS", 100), ("CENTRO", 0), ("VENTAS", 200)])
    }

    #[test]
    fn test_learned_store_alias() {
        let memory = Arc::new(CorrectionMemory::new());
        memory.record_store_alias("5 FEB", "5_FEBRERO", 1.0).unwrap();
        let cl = classifier_with(memory);
        let items = standard_items();
        let c = cl
            .classify_now(&ClassificationInput::new("Sucursal ´5 FEB", &items, None))
            .unwrap();
        assert!(c.stores.contains("5_FEBRERO"));
        assert_eq!(c.memory_keys, vec![MemoryKey::store("5 FEB")]);
    }

    #[test]
    fn test_confidence_monotonic_in_store_and_period() {
        let items = standard_items();
        let cl = classifier();
        let base = cl
            .classify_now(&ClassificationInput::new("ESTADO DE RESULTADOS", &items, None))
            .unwrap()
            .confidence;
        let with_store = cl
            .classify_now(&ClassificationInput::new(
                "ESTADO DE RESULTADOS\nCentro",
                &items,
                None,
            ))
            .unwrap()
            .confidence;
        let with_both = cl
            .classify_now(&ClassificationInput::new(
                "ESTADO DE RESULTADOS\nCentro\nP11 2024",
                &items,
                None,
            ))
            .unwrap()
            .confidence;
        assert!(with_store >= base);
        assert!(with_both >= with_store);
        assert!(with_both > base);
    }

    #[test]
    fn test_most_frequent_ties_go_to_greatest() {
        assert_eq!(most_frequent([1, 3, 3, 1].into_iter()), Some(3));
        assert_eq!(most_frequent([2, 2, 5].into_iter()), Some(2));
        assert_eq!(most_frequent(std::iter::empty::<i32>()), None);
    }

    fn assisted(backend: MockBackend) -> AssistedClassifier {
        AssistedClassifier::new(classifier(), Some(AIClient::Mock(backend)))
    }

    #[tokio::test]
    async fn test_assisted_fills_gaps_only() {
        let backend = MockBackend::new().with_suggestion(ClassificationSuggestion {
            doc_type: Some("inventory".into()),
            period_guess: Some("2025-P4".into()),
            store_guesses: vec!["Universidad".into(), "Sucursal Fantasma".into()],
            confidence: 0.8,
        });
        let items = standard_items();
        let text = "ESTADO DE RESULTADOS\nCentro";
        let heuristic = classifier()
            .classify_now(&ClassificationInput::new(text, &items, None))
            .unwrap();
        let c = assisted(backend)
            .classify(&ClassificationInput::new(text, &items, None))
            .await
            .unwrap();

        assert_eq!(c.doc_type, DocumentType::StatementOfResults);
        assert_eq!(c.stores.iter().collect::<Vec<_>>(), vec!["CENTRO"]);
        let p = c.period.unwrap();
        assert_eq!((p.year, p.period_number), (2025, 4));
        assert_eq!(c.period_source, Some(PeriodSource::Assisted));
        assert!(c.confidence >= heuristic.confidence);
    }

    #[tokio::test]
    async fn test_assisted_failure_falls_back() {
        let items = items(&[("XYZ", 1)]);
        let c = assisted(MockBackend::new().failing())
            .classify(&ClassificationInput::new("", &items, None))
            .await
            .unwrap();
        assert_eq!(c.doc_type, DocumentType::Unknown);
        assert_eq!(c.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_assisted_timeout_falls_back() {
        let backend = MockBackend::new()
            .with_delay(Duration::from_secs(5))
            .with_suggestion(ClassificationSuggestion {
                doc_type: Some("inventory".into()),
                confidence: 1.0,
                ..Default::default()
            });
        let classifier = assisted(backend).with_timeout(Duration::from_millis(50));
        let items = items(&[("XYZ", 1)]);
        let c = classifier
            .classify(&ClassificationInput::new("", &items, None))
            .await
            .unwrap();
        assert_eq!(c.doc_type, DocumentType::Unknown);
    }

    #[tokio::test]
    async fn test_assisted_without_backend_matches_heuristics() {
        let items = standard_items();
        let input = ClassificationInput::new("Centro 2025-03-10", &items, None);
        let heuristic = classifier().classify_now(&input).unwrap();
        let c = AssistedClassifier::new(classifier(), None)
            .classify(&input)
            .await
            .unwrap();
        assert_eq!(c, heuristic);
    }
}
