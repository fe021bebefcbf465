//! Document operations

use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use super::{parse_datetime, parse_timestamp, Database};
use crate::error::{Error, Result};
use crate::extraction::ExtractionInput;
use crate::models::{Document, DocumentClassification, DocumentStatus};

/// Outcome of storing an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    pub document_id: i64,
    /// False when identical content was already stored
    pub created: bool,
}

/// Columns shared by every document query, in `DocumentRow::from_row` order
const DOCUMENT_COLUMNS: &str = "id, tenant_id, filename_hint, uploaded_at, content_hash, status, \
     extraction, classification, error, created_at";

/// Raw column values, decoded after the statement is done with the row
struct DocumentRow {
    id: i64,
    tenant_id: String,
    filename_hint: Option<String>,
    uploaded_at: String,
    content_hash: String,
    status: String,
    extraction: String,
    classification: Option<String>,
    error: Option<String>,
    created_at: String,
}

impl DocumentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            filename_hint: row.get(2)?,
            uploaded_at: row.get(3)?,
            content_hash: row.get(4)?,
            status: row.get(5)?,
            extraction: row.get(6)?,
            classification: row.get(7)?,
            error: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_document(self) -> Result<Document> {
        let classification: Option<DocumentClassification> = self
            .classification
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Document {
            id: self.id,
            tenant_id: self.tenant_id,
            filename_hint: self.filename_hint,
            uploaded_at: parse_timestamp(&self.uploaded_at)?,
            content_hash: self.content_hash,
            status: self.status.parse()?,
            extraction: serde_json::from_str(&self.extraction)?,
            classification,
            error: self.error,
            created_at: parse_datetime(&self.created_at),
        })
    }
}

impl Database {
    /// Store an extraction, deduplicating on content hash
    pub fn insert_document(&self, input: &ExtractionInput) -> Result<IngestResult> {
        let conn = self.conn()?;
        let hash = input.content_hash();

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM documents WHERE content_hash = ?",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            debug!(document_id = id, hash = %hash, "Duplicate document content");
            return Ok(IngestResult {
                document_id: id,
                created: false,
            });
        }

        conn.execute(
            "INSERT INTO documents (tenant_id, filename_hint, uploaded_at, content_hash, status, extraction)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                input.tenant_id,
                input.filename_hint,
                input.uploaded_at.to_rfc3339(),
                hash,
                DocumentStatus::Pending.as_str(),
                serde_json::to_string(input)?,
            ],
        )?;

        Ok(IngestResult {
            document_id: conn.last_insert_rowid(),
            created: true,
        })
    }

    /// Get a document by ID
    pub fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS),
                params![id],
                DocumentRow::from_row,
            )
            .optional()?;

        row.map(DocumentRow::into_document).transpose()
    }

    /// Get a document by ID, failing when it does not exist
    pub fn require_document(&self, id: i64) -> Result<Document> {
        self.get_document(id)?
            .ok_or_else(|| Error::NotFound(format!("Document {}", id)))
    }

    /// List documents, newest first, optionally filtered by status
    pub fn list_documents(
        &self,
        status: Option<DocumentStatus>,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY id DESC
             LIMIT ?2",
            DOCUMENT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![status.map(|s| s.as_str()), limit], DocumentRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    /// Record the classifier's result for a document
    pub fn set_document_classification(
        &self,
        id: i64,
        classification: &DocumentClassification,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE documents SET classification = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![serde_json::to_string(classification)?, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Document {}", id)));
        }
        Ok(())
    }

    /// Update processing status; `error` is cleared unless given
    pub fn set_document_status(
        &self,
        id: i64,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE documents SET status = ?, error = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![status.as_str(), error, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Document {}", id)));
        }
        Ok(())
    }

    /// Count documents in each status
    pub fn count_documents_by_status(&self) -> Result<Vec<(DocumentStatus, i64)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM documents GROUP BY status ORDER BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(status, count)| -> Result<(DocumentStatus, i64)> {
                Ok((status.parse()?, count))
            })
            .collect()
    }
}
