use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{api_key, authorize_device, AppState};
use crate::error::AdvisorError;
use crate::models::{Reading, TelemetryPayload};

// ---

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PER_PAGE: i64 = 10;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/esp32", post(ingest))
        .route("/api/sensor/{device_id}/latest", get(latest))
        .route("/api/sensor/{device_id}/history", get(history))
}

/// Pagination arrives as raw strings so a malformed value falls back to
/// the default instead of rejecting the request.
#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<String>,
    per_page: Option<String>,
}

async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TelemetryPayload>,
) -> Result<impl IntoResponse, AdvisorError> {
    // ---
    let reading = state.telemetry.ingest(api_key(&headers), &payload).await?;
    info!("POST /api/esp32 - reading stored for {}", reading.device_id);

    Ok(Json(json!({
        "status": "success",
        "message": "Sensor data received",
        "data": sensor_values(&reading),
    })))
}

async fn latest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, AdvisorError> {
    // ---
    authorize_device(&state, &headers, &device_id).await?;
    let reading = state.telemetry.latest(&device_id).await?;

    Ok(Json(json!({
        "data": sensor_values(&reading),
        "timestamp": reading.timestamp,
        "source": "esp32",
    })))
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AdvisorError> {
    // ---
    authorize_device(&state, &headers, &device_id).await?;
    let page = parse_or(params.page.as_deref(), DEFAULT_PAGE);
    let per_page = parse_or(params.per_page.as_deref(), DEFAULT_PER_PAGE);

    let page = state.telemetry.history(&device_id, page, per_page).await?;
    Ok(Json(page))
}

/// Measured values without the device id or timestamp.
fn sensor_values(reading: &Reading) -> Value {
    json!({
        "temperature": reading.temperature,
        "ph": reading.ph,
        "humidity": reading.humidity,
        "ec": reading.ec,
        "N": reading.n,
        "P": reading.p,
        "K": reading.k,
        "moisture": reading.moisture,
    })
}

/// Parse a positive integer query value; anything else yields `default`.
fn parse_or(raw: Option<&str>, default: i64) -> i64 {
    match raw.map(|s| s.trim().parse::<i64>()) {
        Some(Ok(v)) if v >= 1 => v,
        _ => default,
    }
}
