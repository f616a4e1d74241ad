use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    services::reporting::{ReportingService, StudentMealStatusQuery},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub hostel_id: Uuid,
    pub date: NaiveDate,
}

/// GET /reports/meal-analytics — per-slot display-status counts for a date.
pub async fn meal_analytics(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let today = Local::now().date_naive();
    ReportingService::meal_analytics(&state.db, params.hostel_id, params.date, today)
        .await
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// GET /reports/student-meal-status — warden listing with pagination,
/// filter and sort.
pub async fn student_meal_status(
    State(state): State<AppState>,
    Query(params): Query<StudentMealStatusQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let today = Local::now().date_naive();
    ReportingService::student_meal_status(&state.db, &params, today)
        .await
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}
