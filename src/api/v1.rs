use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::{error::ApiError, response::ApiResponse},
    controller::{AppState, PlanReport},
    domain::{DateHour, HourlySummary, Strategy},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/planning", get(get_planning))
        .route("/planning/run", post(run_planning))
        .route("/hourly", get(get_hourly))
}

#[derive(Debug, Deserialize)]
pub struct HourQuery {
    /// "YYYY-MM-DD HH" in UTC; defaults to the current hour for reads and
    /// the next hour for runs
    pub from: Option<String>,
}

impl HourQuery {
    fn hour(&self) -> Result<Option<DateHour>, ApiError> {
        self.from
            .as_deref()
            .map(|s| s.parse().map_err(|e| ApiError::BadRequest(format!("{e}"))))
            .transpose()
    }
}

#[derive(Debug, Serialize)]
pub struct PlannedHour {
    pub hour: DateHour,
    pub iso: String,
    /// Same hour in the display timezone
    pub local: String,
    pub strategy: Strategy,
}

/// GET /api/v1/planning
pub async fn get_planning(
    State(state): State<AppState>,
    Query(query): Query<HourQuery>,
) -> Result<Json<ApiResponse<Vec<PlannedHour>>>, ApiError> {
    let from = query.hour()?.unwrap_or_else(DateHour::now);
    let tz = state.cfg.server.display_tz();
    let rows = state.repos.planning.planning_from(from).await?;

    let hours = rows
        .into_iter()
        .map(|row| PlannedHour {
            hour: row.hour,
            iso: row.hour.iso_string(),
            local: row.hour.localized(tz),
            strategy: row.strategy,
        })
        .collect();
    Ok(Json(ApiResponse::success(hours)))
}

/// GET /api/v1/hourly
///
/// Booked hours from `from`, defaulting to the last 24 hours.
pub async fn get_hourly(
    State(state): State<AppState>,
    Query(query): Query<HourQuery>,
) -> Result<Json<ApiResponse<Vec<HourlySummary>>>, ApiError> {
    let from = query.hour()?.unwrap_or_else(|| DateHour::now().sub(24));
    let summaries = state.repos.hourly.hourly_from(from).await?;
    Ok(Json(ApiResponse::success(summaries)))
}

/// POST /api/v1/planning/run
pub async fn run_planning(
    State(state): State<AppState>,
    Query(query): Query<HourQuery>,
) -> Result<Json<ApiResponse<PlanReport>>, ApiError> {
    let report = match query.hour()? {
        Some(start) => state.planner.run(start).await?,
        None => state.planner.run_next().await?,
    };
    Ok(Json(ApiResponse::success(report)))
}
