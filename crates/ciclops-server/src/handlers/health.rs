//! Health check handler

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{AppError, AppState};
use ciclops_core::{AIBackend, BackendInfo};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub documents: BTreeMap<String, i64>,
    pub corrections: usize,
    pub ai: Option<AiHealth>,
}

#[derive(Debug, Serialize)]
pub struct AiHealth {
    #[serde(flatten)]
    pub backend: BackendInfo,
    pub healthy: bool,
}

/// GET /api/health - Liveness plus document counts and AI fallback status
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let documents = state
        .pipeline
        .db()
        .count_documents_by_status()?
        .into_iter()
        .map(|(status, count)| (status.to_string(), count))
        .collect();

    let ai = match &state.ai {
        Some(client) => Some(AiHealth {
            backend: client.info(),
            healthy: client.health_check().await,
        }),
        None => None,
    };

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        documents,
        corrections: state.pipeline.memory().len(),
        ai,
    }))
}
