//! Summary persistence contract
//!
//! The pipeline only needs two operations from storage: idempotent upsert
//! of a summary keyed by `(store_id, period)` and lookup by the same key.

use crate::db::Database;
use crate::error::Result;
use crate::fiscal::FiscalPeriod;
use crate::models::FinancialSummary;

pub trait SummaryStore: Send + Sync {
    /// Insert or replace the summary for `summary.store_id` and `summary.period`
    fn upsert_summary(&self, summary: &FinancialSummary) -> Result<()>;

    fn get_summary(&self, store_id: &str, period: &FiscalPeriod)
        -> Result<Option<FinancialSummary>>;
}

impl SummaryStore for Database {
    fn upsert_summary(&self, summary: &FinancialSummary) -> Result<()> {
        Database::upsert_summary(self, summary)
    }

    fn get_summary(
        &self,
        store_id: &str,
        period: &FiscalPeriod,
    ) -> Result<Option<FinancialSummary>> {
        Database::get_summary(self, store_id, period)
    }
}
