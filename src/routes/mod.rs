//! HTTP gateway.
//!
//! Each sibling module owns its handlers and exports a subrouter; this file
//! merges them, owns the shared [`AppState`] and maps [`AdvisorError`] to
//! status codes.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;

use crate::classifier::ModelArtifacts;
use crate::credentials::Credentials;
use crate::dataset::ReferenceDataset;
use crate::error::AdvisorError;
use crate::store::Store;
use crate::telemetry::Telemetry;

/// Header carrying the API key issued to a device at registration.
const API_KEY_HEADER: &str = "x-api-key";

mod auth;
mod health;
mod predict;
mod sensor;

// ---

/// Shared, read-mostly state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub credentials: Arc<Credentials>,
    pub telemetry: Arc<Telemetry>,
    pub dataset: Arc<ReferenceDataset>,
    pub models: Arc<ModelArtifacts>,
}

impl AppState {
    // ---
    pub fn new(store: Store, dataset: ReferenceDataset, models: ModelArtifacts) -> Self {
        let credentials = Arc::new(Credentials::new(store.clone()));
        let telemetry = Arc::new(Telemetry::new(store.clone(), credentials.clone()));
        Self {
            store,
            credentials,
            telemetry,
            dataset: Arc::new(dataset),
            models: Arc::new(models),
        }
    }
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(auth::router())
        .merge(sensor::router())
        .merge(predict::router())
        .merge(health::router())
        .with_state(state)
}

fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
}

/// Reject the request unless it carries the API key issued to `device_id`.
///
/// Readings are only served to the holder of the device's key.
async fn authorize_device(
    state: &AppState,
    headers: &HeaderMap,
    device_id: &str,
) -> Result<(), AdvisorError> {
    // ---
    if state
        .credentials
        .verify_device_key(device_id, api_key(headers))
        .await?
    {
        Ok(())
    } else {
        Err(AdvisorError::Unauthorized(
            "Invalid API key for device_id".to_string(),
        ))
    }
}

impl AdvisorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdvisorError::NotFound(_) | AdvisorError::CropNotFound(_) => StatusCode::NOT_FOUND,
            AdvisorError::InvalidInput(_)
            | AdvisorError::MissingFields(_)
            | AdvisorError::InvalidDevice(_)
            | AdvisorError::DuplicateAccount(_)
            | AdvisorError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            AdvisorError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AdvisorError::ModelUnavailable(_) | AdvisorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AdvisorError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
