// src/routes/health.rs
//! API health check endpoint.
//!
//! Used by container orchestrators and CI pipelines to verify that the
//! service is up. It follows the Explicit Module Boundary Pattern (EMBP):
//! - Internal to this file: endpoint handler and response type
//! - Exports to the gateway (`mod.rs`): a subrouter containing `/health`
//!
//! Besides liveness it reports which store backend is active and whether the
//! startup artifacts loaded, since a missing model only shows up later as a
//! failed `/predict`.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: &'static str,
    crops: usize,
    crop_model: bool,
    fertilizer_model: bool,
}

/// Handle `GET /health`.
///
/// Lightweight: reads in-process state only and never touches the database.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.store.backend(),
        crops: state.dataset.len(),
        crop_model: state.models.crop_model.is_some(),
        fertilizer_model: state.models.fertilizer.is_some(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
