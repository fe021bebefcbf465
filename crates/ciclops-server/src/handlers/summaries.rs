//! Financial summary handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState};
use ciclops_core::models::FinancialSummary;

/// Query parameters for listing summaries
#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub store: Option<String>,
    pub year: Option<i32>,
}

/// GET /api/summaries - Summaries ordered by period then store
pub async fn list_summaries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<Vec<FinancialSummary>>, AppError> {
    let summaries = state
        .pipeline
        .db()
        .list_summaries(params.store.as_deref(), params.year)?;
    Ok(Json(summaries))
}

/// GET /api/summaries/:store/:period - Summary for a store and period key (`2025-P4`)
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path((store, period)): Path<(String, String)>,
) -> Result<Json<FinancialSummary>, AppError> {
    let period = state
        .pipeline
        .calendar()
        .parse_period(&period)
        .map_err(|e| AppError::bad_request(&e.to_string()))?;

    let summary = state
        .pipeline
        .get_summary(&store, &period)?
        .ok_or_else(|| AppError::not_found("Summary not found"))?;
    Ok(Json(summary))
}
