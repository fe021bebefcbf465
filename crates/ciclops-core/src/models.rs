//! Data models for Ciclops

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::fiscal::FiscalPeriod;
use crate::memory::MemoryKey;
use crate::taxonomy::{Branch, Category};

/// One `(label, amount)` pair produced by extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLineItem {
    pub label: String,
    pub amount: Decimal,
    /// Zero-based position in the extracted document
    pub source_row: usize,
}

/// How a line item's category was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    Memory,
    Taxonomy,
    Unmapped,
}

impl MappingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Taxonomy => "taxonomy",
            Self::Unmapped => "unmapped",
        }
    }
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A line item with its resolved category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedLineItem {
    pub label: String,
    pub amount: Decimal,
    pub source_row: usize,
    pub category: Category,
    pub mapping_confidence: f64,
    pub mapping_source: MappingSource,
    /// Correction that produced the mapping, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_key: Option<MemoryKey>,
}

/// Kind of financial document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    StatementOfResults,
    BankStatement,
    SalesReport,
    Inventory,
    Unknown,
}

impl DocumentType {
    /// Known types in tie-break priority order
    pub const PRIORITY: [DocumentType; 4] = [
        Self::StatementOfResults,
        Self::BankStatement,
        Self::SalesReport,
        Self::Inventory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatementOfResults => "statement_of_results",
            Self::BankStatement => "bank_statement",
            Self::SalesReport => "sales_report",
            Self::Inventory => "inventory",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "statement_of_results" | "estado_de_resultados" | "income_statement" => {
                Ok(Self::StatementOfResults)
            }
            "bank_statement" | "estado_de_cuenta" => Ok(Self::BankStatement),
            "sales_report" | "reporte_de_ventas" => Ok(Self::SalesReport),
            "inventory" | "inventario" => Ok(Self::Inventory),
            "unknown" => Ok(Self::Unknown),
            _ => Err(Error::InvalidData(format!("Unknown document type: {}", s))),
        }
    }
}

/// Where the classifier found the fiscal period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodSource {
    /// Explicit `P11` / `Periodo 11` marker
    Marker,
    /// Dates found in the text
    Dates,
    FilenameHint,
    /// AI fallback guess
    Assisted,
}

/// Result of document classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentClassification {
    pub doc_type: DocumentType,
    pub period: Option<FiscalPeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_source: Option<PeriodSource>,
    pub stores: BTreeSet<String>,
    /// Store named first (document header, then line items, then filename).
    /// Items outside any store section belong to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_store: Option<String>,
    pub confidence: f64,
    /// Store-alias corrections that matched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_keys: Vec<MemoryKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighCost,
    LowMargin,
    RevenueDrop,
    MissingData,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighCost => "high_cost",
            Self::LowMargin => "low_margin",
            Self::RevenueDrop => "revenue_drop",
            Self::MissingData => "missing_data",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub category_path: String,
    pub message: String,
    pub severity: Severity,
}

/// Derived ratios and profits. Ratios are rounded to 4 decimal places.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub gross_profit: Decimal,
    pub gross_margin: Decimal,
    pub net_profit: Decimal,
    pub net_margin: Decimal,
    /// costs / revenue
    pub cost_ratio: Decimal,
    /// payroll / revenue
    pub labor_ratio: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Growing,
    Stable,
    Declining,
}

/// Change against the prior period's summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub prior_period: FiscalPeriod,
    /// Percent change in revenue; `None` when prior revenue was zero
    pub revenue_variation_pct: Option<Decimal>,
    pub expense_variation_pct: Option<Decimal>,
    pub trend: Trend,
}

/// Normalized financial record for one store and fiscal period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub store_id: String,
    pub period: FiscalPeriod,
    /// True when the period came from the upload date rather than the document
    #[serde(default)]
    pub period_inferred: bool,
    /// Total for every node of the taxonomy, zero-filled
    pub totals: BTreeMap<String, Decimal>,
    /// Sum of unmapped amounts
    pub uncategorized: Decimal,
    /// Mapped item count per branch, plus `uncategorized`
    pub item_counts: BTreeMap<String, usize>,
    pub metrics: FinancialMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<PeriodComparison>,
    pub alerts: Vec<Alert>,
    pub document_id: Option<i64>,
    pub generated_at: DateTime<Utc>,
}

impl FinancialSummary {
    /// Total for a node path; zero for paths not in the tree
    pub fn total(&self, path: &str) -> Decimal {
        self.totals.get(path).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn branch_total(&self, branch: Branch) -> Decimal {
        self.total(branch.as_str())
    }

    pub fn category_total(&self, category: Category) -> Decimal {
        self.total(category.path())
    }

    pub fn item_count(&self, key: &str) -> usize {
        self.item_counts.get(key).copied().unwrap_or(0)
    }

    /// Equality ignoring `generated_at`
    pub fn same_content(&self, other: &FinancialSummary) -> bool {
        let mut a = self.clone();
        a.generated_at = other.generated_at;
        a == *other
    }
}

/// Lifecycle of an ingested document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processed,
    Failed,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(Error::InvalidData(format!("Unknown document status: {}", s))),
        }
    }
}

/// A stored document: the raw extraction plus processing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub tenant_id: String,
    pub filename_hint: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub content_hash: String,
    pub status: DocumentStatus,
    pub extraction: crate::extraction::ExtractionInput,
    pub classification: Option<DocumentClassification>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A known store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}
