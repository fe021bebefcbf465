//! Correction feedback handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{AppError, AppState};
use ciclops_core::taxonomy::Category;
use ciclops_core::{Correction, CorrectionEvent};

/// GET /api/corrections - All learned corrections
pub async fn list_corrections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Correction>>, AppError> {
    Ok(Json(state.pipeline.db().list_corrections()?))
}

/// GET /api/corrections/log - Correction events in the order they happened
pub async fn get_correction_log(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CorrectionEvent>>, AppError> {
    Ok(Json(state.pipeline.db().correction_log()?))
}

/// Request body for a category correction
#[derive(Debug, Deserialize)]
pub struct CreateCorrectionRequest {
    pub label: String,
    /// Taxonomy path (`expenses.servicios.electricidad`) or leaf name
    pub category: String,
    pub confidence: Option<f64>,
}

/// POST /api/corrections - Teach the mapper a label
pub async fn create_correction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCorrectionRequest>,
) -> Result<Json<Correction>, AppError> {
    let category: Category = req
        .category
        .parse()
        .map_err(|_| AppError::bad_request(&format!("Unknown category: {}", req.category)))?;

    let correction = state
        .pipeline
        .submit_correction(&req.label, category, req.confidence)?;
    Ok(Json(correction))
}

/// Request body for a store correction
#[derive(Debug, Deserialize)]
pub struct CreateStoreCorrectionRequest {
    pub label: String,
    pub store_id: String,
    pub confidence: Option<f64>,
}

/// POST /api/corrections/stores - Teach the classifier a store alias
pub async fn create_store_correction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateStoreCorrectionRequest>,
) -> Result<Json<Correction>, AppError> {
    let correction =
        state
            .pipeline
            .submit_store_correction(&req.label, &req.store_id, req.confidence)?;
    Ok(Json(correction))
}
