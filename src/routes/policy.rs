use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::policy::{SetCutoffsRequest, SetTimingsRequest},
    services::policy::PolicyService,
    AppState,
};

/// GET /hostels/{id}/meal-cutoffs — stored overrides plus resolved values.
pub async fn get_meal_cutoffs(
    State(state): State<AppState>,
    Path(hostel_id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    PolicyService::load_cutoffs(&state.db, hostel_id)
        .await
        .map(|policy| {
            Json(json!({
                "overrides": policy.cutoffs,
                "resolved": PolicyService::resolved_cutoffs(&policy),
            }))
        })
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// PUT /hostels/{id}/meal-cutoffs — wardens only (enforced upstream).
pub async fn set_meal_cutoffs(
    State(state): State<AppState>,
    Path(hostel_id): Path<Uuid>,
    Json(body): Json<SetCutoffsRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    PolicyService::set_cutoffs(&state.db, hostel_id, &body)
        .await
        .map(|_| Json(json!({ "ok": true })))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// GET /hostels/{id}/meal-timings
pub async fn get_meal_timings(
    State(state): State<AppState>,
    Path(hostel_id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    PolicyService::load_timings(&state.db, hostel_id)
        .await
        .map(|timing| {
            Json(json!({
                "overrides": timing.windows,
                "resolved": PolicyService::resolved_windows(&timing),
            }))
        })
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// PUT /hostels/{id}/meal-timings
pub async fn set_meal_timings(
    State(state): State<AppState>,
    Path(hostel_id): Path<Uuid>,
    Json(body): Json<SetTimingsRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    PolicyService::set_timings(&state.db, hostel_id, &body)
        .await
        .map(|_| Json(json!({ "ok": true })))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}
