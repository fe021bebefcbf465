//! Financial summary operations
//!
//! Summaries are keyed by `(store_id, period_key)` and stored as JSON; the
//! period columns exist for filtering and ordering.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::Database;
use crate::error::Result;
use crate::fiscal::FiscalPeriod;
use crate::models::FinancialSummary;

fn upsert(conn: &Connection, summary: &FinancialSummary) -> Result<()> {
    conn.execute(
        "INSERT INTO summaries
             (store_id, period_key, fiscal_year, period_number, document_id,
              period_inferred, summary, generated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(store_id, period_key) DO UPDATE SET
             document_id = excluded.document_id,
             period_inferred = excluded.period_inferred,
             summary = excluded.summary,
             generated_at = excluded.generated_at,
             updated_at = CURRENT_TIMESTAMP",
        params![
            summary.store_id,
            summary.period.key(),
            summary.period.year,
            summary.period.period_number,
            summary.document_id,
            summary.period_inferred,
            serde_json::to_string(summary)?,
            summary.generated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn decode(rows: Vec<String>) -> Result<Vec<FinancialSummary>> {
    rows.iter()
        .map(|json| serde_json::from_str(json).map_err(Into::into))
        .collect()
}

impl Database {
    /// Insert or replace the summary for its store and period
    pub fn upsert_summary(&self, summary: &FinancialSummary) -> Result<()> {
        let conn = self.conn()?;
        upsert(&conn, summary)
    }

    /// Get the summary for a store and fiscal period
    pub fn get_summary(
        &self,
        store_id: &str,
        period: &FiscalPeriod,
    ) -> Result<Option<FinancialSummary>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT summary FROM summaries WHERE store_id = ? AND period_key = ?",
                params![store_id, period.key()],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j).map_err(Into::into))
            .transpose()
    }

    /// List summaries ordered by period then store
    pub fn list_summaries(
        &self,
        store_id: Option<&str>,
        fiscal_year: Option<i32>,
    ) -> Result<Vec<FinancialSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT summary FROM summaries
             WHERE (?1 IS NULL OR store_id = ?1)
               AND (?2 IS NULL OR fiscal_year = ?2)
             ORDER BY fiscal_year, period_number, store_id",
        )?;

        let rows = stmt
            .query_map(params![store_id, fiscal_year], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        decode(rows)
    }

    /// Summaries last written from a document
    pub fn summaries_for_document(&self, document_id: i64) -> Result<Vec<FinancialSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT summary FROM summaries WHERE document_id = ?
             ORDER BY fiscal_year, period_number, store_id",
        )?;

        let rows = stmt
            .query_map(params![document_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        decode(rows)
    }

    /// Replace everything a document contributed with a new set of summaries.
    ///
    /// Runs in one transaction: summaries previously written from the
    /// document are deleted, then the new ones are upserted. Readers see
    /// either the old set or the new one.
    pub fn replace_document_summaries(
        &self,
        document_id: i64,
        summaries: &[FinancialSummary],
    ) -> Result<usize> {
        let conn = self.conn()?;

        // Use explicit transaction for atomicity
        conn.execute("BEGIN TRANSACTION", [])?;

        let result: Result<usize> = (|| {
            let removed = conn.execute(
                "DELETE FROM summaries WHERE document_id = ?",
                params![document_id],
            )?;
            for summary in summaries {
                upsert(&conn, summary)?;
            }
            Ok(removed)
        })();

        match result {
            Ok(removed) => {
                conn.execute("COMMIT", [])?;
                debug!(
                    document_id,
                    removed,
                    written = summaries.len(),
                    "Replaced document summaries"
                );
                Ok(removed)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }
}
