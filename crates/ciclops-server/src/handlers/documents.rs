//! Document ingest and processing handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{AppError, AppState, MAX_PAGE_LIMIT, MAX_UPLOAD_SIZE};
use ciclops_core::models::{Document, DocumentStatus, FinancialSummary};
use ciclops_core::{CancelToken, ExtractionInput, ProcessingReport};

/// Query parameters for creating a document
#[derive(Debug, Default, Deserialize)]
pub struct CreateDocumentQuery {
    /// Run the pipeline right after ingesting
    #[serde(default)]
    pub process: bool,
}

/// POST /api/documents - Ingest an extraction
///
/// Returns 201 with the new id, or 200 with the existing id when identical
/// content was already stored. With `?process=true` the processing report is
/// returned instead.
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreateDocumentQuery>,
    request: Request,
) -> Result<Response, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_UPLOAD_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let input: ExtractionInput = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::bad_request(&format!("Invalid extraction JSON: {}", e)))?;

    if params.process {
        let report = state.pipeline.submit(&input, &CancelToken::new()).await?;
        return Ok(Json(report).into_response());
    }

    let result = state.pipeline.ingest(&input)?;
    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)).into_response())
}

/// Query parameters for listing documents
#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    /// Status filter: pending, processed, failed, cancelled
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/documents - List documents, newest first
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DocumentQuery>,
) -> Result<Json<Vec<Document>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            s.parse::<DocumentStatus>().map_err(|_| {
                AppError::bad_request(&format!(
                    "Invalid status: {}. Valid: pending, processed, failed, cancelled",
                    s
                ))
            })
        })
        .transpose()?;
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    Ok(Json(state.pipeline.db().list_documents(status, limit)?))
}

/// GET /api/documents/:id - Get a document with its classification
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Document>, AppError> {
    let document = state
        .pipeline
        .db()
        .get_document(id)?
        .ok_or_else(|| AppError::not_found("Document not found"))?;
    Ok(Json(document))
}

/// GET /api/documents/:id/summaries - Summaries written by a document
pub async fn get_document_summaries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<FinancialSummary>>, AppError> {
    state.pipeline.db().require_document(id)?;
    Ok(Json(state.pipeline.db().summaries_for_document(id)?))
}

/// POST /api/documents/:id/process - Process a pending document
pub async fn process_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ProcessingReport>, AppError> {
    let report = state.pipeline.process(id, &CancelToken::new()).await?;
    Ok(Json(report))
}

/// POST /api/documents/:id/reprocess - Re-run the pipeline, replacing prior output
pub async fn reprocess_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ProcessingReport>, AppError> {
    info!(document_id = id, "Reprocess requested");
    let report = state.pipeline.reprocess(id, &CancelToken::new()).await?;
    Ok(Json(report))
}
