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
    models::booking::{BookingSubmission, BulkBookingRequest},
    services::{coordinator::BookingCoordinator, reporting::ReportingService},
    AppState,
};

/// POST /bookings/bulk — a student's batch of date/meal requests.
/// Per-slot rejections come back in `per_date_results`; a 500 means nothing
/// was persisted.
pub async fn submit_bulk(
    State(state): State<AppState>,
    Json(body): Json<BulkBookingRequest>,
) -> Result<Json<BookingSubmission>, (StatusCode, Json<Value>)> {
    let now = Local::now().naive_local();
    BookingCoordinator::submit_bookings(
        &state.db,
        &state.notifications,
        body.hostel_id,
        body.student_id,
        &body.requests,
        now,
    )
    .await
    .map(Json)
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub hostel_id: Uuid,
    pub student_id: Uuid,
    /// First day of the desired month (e.g. "2026-06-01").
    pub month_start: NaiveDate,
}

/// GET /bookings/calendar — one student's month with derived display statuses.
pub async fn monthly_calendar(
    State(state): State<AppState>,
    Query(params): Query<CalendarQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let today = Local::now().date_naive();
    ReportingService::monthly_calendar(
        &state.db,
        params.hostel_id,
        params.student_id,
        params.month_start,
        today,
    )
    .await
    .map(Json)
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })
}
