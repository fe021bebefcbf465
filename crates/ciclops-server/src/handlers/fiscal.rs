//! Fiscal calendar and store registry handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{AppError, AppState};
use ciclops_core::models::Store;
use ciclops_core::FiscalPeriod;

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    /// Calendar date, YYYY-MM-DD
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct PeriodResponse {
    pub date: NaiveDate,
    pub key: String,
    pub period: FiscalPeriod,
    pub fiscal_year: i32,
    pub week: u32,
}

/// GET /api/fiscal/period?date= - Fiscal period and week containing a date
pub async fn fiscal_period(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PeriodQuery>,
) -> Result<Json<PeriodResponse>, AppError> {
    let date = NaiveDate::parse_from_str(&params.date, "%Y-%m-%d").map_err(|_| {
        AppError::bad_request(&format!(
            "Invalid date: {}. Expected YYYY-MM-DD",
            params.date
        ))
    })?;

    let calendar = state.pipeline.calendar();
    let period = calendar.period_for(date)?;
    let (fiscal_year, week) = calendar.week_of_year(date)?;

    Ok(Json(PeriodResponse {
        date,
        key: period.key(),
        period,
        fiscal_year,
        week,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PeriodsQuery {
    pub year: i32,
}

/// GET /api/fiscal/periods?year= - All thirteen periods of a fiscal year
pub async fn fiscal_periods(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PeriodsQuery>,
) -> Result<Json<Vec<FiscalPeriod>>, AppError> {
    Ok(Json(
        state.pipeline.calendar().periods_in_year(params.year)?,
    ))
}

/// GET /api/stores - Registered stores
pub async fn list_stores(State(state): State<Arc<AppState>>) -> Json<Vec<Store>> {
    Json(state.pipeline.registry().stores().to_vec())
}
