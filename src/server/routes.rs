/// REST API routes for eco-anchor.
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::AppState;
use crate::error::AnchorError;
use crate::state::models::Reading;
use crate::workflow::{AnchorDispatch, Verdict};

/// Readings returned by `GET /measurements`.
const LIST_LIMIT: i64 = 100;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: AnchorError) -> ApiError {
    let status = match &e {
        AnchorError::NotFound(_) => StatusCode::NOT_FOUND,
        AnchorError::InvalidReading(_) => StatusCode::BAD_REQUEST,
        _ => {
            error!(error_kind = e.kind(), error = %e, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ─── Health ──────────────────────────────────────────────

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    anchoring: &'static str,
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    state.service.store().ping().await.map_err(api_error)?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        anchoring: if state.service.is_enabled() {
            "enabled"
        } else {
            "disabled"
        },
    }))
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ─── Measurements ────────────────────────────────────────

/// Body of `POST /measurements`.
#[derive(Debug, Deserialize)]
struct CreateMeasurementRequest {
    sensor_id: String,
    value: f64,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct CreateMeasurementResponse {
    sensor_id: String,
    anchoring: AnchorDispatch,
}

/// Body of `PUT /measurements/{sensor_id}`.
#[derive(Debug, Deserialize)]
struct UpdateMeasurementRequest {
    value: f64,
}

#[derive(Debug, Serialize)]
struct RowsResponse {
    sensor_id: String,
    rows: u64,
}

/// GET /measurements: latest readings, newest first.
async fn list_measurements(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let rows = state
        .service
        .store()
        .list_recent(LIST_LIMIT)
        .await
        .map_err(api_error)?;
    Ok(Json(rows))
}

/// POST /measurements: store a reading, then queue its anchor.
///
/// The response does not wait for the ledger; anchoring failures only
/// show up in the logs.
async fn create_measurement(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMeasurementRequest>,
) -> Result<(StatusCode, Json<CreateMeasurementResponse>), ApiError> {
    if req.sensor_id.trim().is_empty() {
        return Err(api_error(AnchorError::InvalidReading(
            "sensor_id is required".into(),
        )));
    }
    if !req.value.is_finite() {
        return Err(api_error(AnchorError::InvalidReading(
            "value must be finite".into(),
        )));
    }

    let reading = Reading {
        sensor_id: req.sensor_id,
        value: req.value,
        created_at: req.created_at.unwrap_or_else(Utc::now),
    };
    state
        .service
        .store()
        .insert(&reading)
        .await
        .map_err(api_error)?;

    let anchoring = state
        .service
        .on_write_committed(&reading.sensor_id, reading.value);

    Ok((
        StatusCode::CREATED,
        Json(CreateMeasurementResponse {
            sensor_id: reading.sensor_id,
            anchoring,
        }),
    ))
}

/// PUT /measurements/{sensor_id}: overwrite stored values.
///
/// Deliberately not re-anchored: the stored value no longer matches the
/// ledger and verification reports it.
async fn update_measurement(
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<String>,
    Json(req): Json<UpdateMeasurementRequest>,
) -> Result<Json<RowsResponse>, ApiError> {
    let rows = state
        .service
        .store()
        .update_value(&sensor_id, req.value)
        .await
        .map_err(api_error)?;
    if rows == 0 {
        return Err(api_error(AnchorError::NotFound(sensor_id)));
    }
    Ok(Json(RowsResponse { sensor_id, rows }))
}

/// DELETE /measurements/{sensor_id}
async fn delete_measurement(
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<String>,
) -> Result<Json<RowsResponse>, ApiError> {
    let rows = state
        .service
        .store()
        .delete(&sensor_id)
        .await
        .map_err(api_error)?;
    if rows == 0 {
        return Err(api_error(AnchorError::NotFound(sensor_id)));
    }
    Ok(Json(RowsResponse { sensor_id, rows }))
}

/// GET /measurements/{sensor_id}/verify
async fn verify_measurement(
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<String>,
) -> Result<Json<Verdict>, ApiError> {
    state
        .service
        .on_verify_requested(&sensor_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub fn measurement_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/measurements",
            get(list_measurements).post(create_measurement),
        )
        .route(
            "/measurements/{sensor_id}",
            put(update_measurement).delete(delete_measurement),
        )
        .route("/measurements/{sensor_id}/verify", get(verify_measurement))
}
