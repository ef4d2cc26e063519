use crate::core::prelude::*;
use crate::domain::prelude::*;
use crate::query::{SchemeStats, SeriesParams, SeriesPoint};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use std::collections::BTreeMap;

/// Routes for the dashboard's JSON endpoints.
///
/// Paths and query parameter names are the ones the existing front end
/// calls, so they must not change.
///
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/transactions", get(transactions))
        .route("/api/stats", get(stats))
        .route("/api/reject_codes", get(reject_codes))
        .with_state(state)
}

/// Per-minute transaction counts for the chart.
///
/// Accepts `start_time`, `end_time` (ISO-8601), `card_scheme` and
/// `reject_code`; `All` disables a categorical filter.
///
pub async fn transactions(
    State(state): State<AppState>,
    Query(params): Query<SeriesParams>,
) -> Result<Json<Vec<SeriesPoint>>, AppError> {
    Ok(Json(state.queries.get_series(&params)?))
}

/// Total and approved counts per card scheme for the stat cards.
pub async fn stats(State(state): State<AppState>) -> Result<Json<BTreeMap<String, SchemeStats>>, AppError> {
    Ok(Json(state.queries.get_stats()?))
}

/// Status codes seen so far, for the filter dropdown.
pub async fn reject_codes(State(state): State<AppState>) -> Result<Json<Vec<StatusEntry>>, AppError> {
    Ok(Json(state.queries.get_status_codes()?))
}
