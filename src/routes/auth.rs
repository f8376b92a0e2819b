//! Account registration, login and device lookup.
//!
//! These endpoints answer with `{success, message}` bodies rather than the
//! gateway's `{error}` shape, because the registration form renders the
//! message directly.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::error::AdvisorError;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/check_device_id", post(check_device_id))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CredentialsRequest {
    username: String,
    password: String,
    device_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeviceRequest {
    device_id: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    // ---
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

impl AuthResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            username: None,
            device_id: None,
            api_key: None,
        }
    }
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> impl IntoResponse {
    // ---
    let username = req.username.trim();
    let device_id = req.device_id.trim();

    match state
        .credentials
        .register(username, &req.password, device_id)
        .await
    {
        Ok(registered) => (
            StatusCode::OK,
            Json(AuthResponse {
                success: true,
                message: "Registration successful".to_string(),
                username: Some(username.to_string()),
                device_id: Some(registered.device_id),
                api_key: Some(registered.api_key),
            }),
        ),
        Err(AdvisorError::InvalidDevice(_)) => (
            StatusCode::BAD_REQUEST,
            Json(AuthResponse::failure("Invalid or already registered Device ID")),
        ),
        Err(e @ (AdvisorError::DuplicateAccount(_) | AdvisorError::InvalidInput(_))) => (
            StatusCode::BAD_REQUEST,
            Json(AuthResponse::failure(format!("Registration failed: {e}"))),
        ),
        Err(e) => {
            error!("Registration error for device {}: {}", device_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AuthResponse::failure(format!("Internal server error: {e}"))),
            )
        }
    }
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> impl IntoResponse {
    // ---
    let username = req.username.trim();
    let device_id = req.device_id.trim();

    match state
        .credentials
        .authenticate(username, &req.password, device_id)
        .await
    {
        Ok(true) => {
            info!("User '{}' logged in on device {}", username, device_id);
            (
                StatusCode::OK,
                Json(AuthResponse {
                    success: true,
                    message: "Login successful".to_string(),
                    username: Some(username.to_string()),
                    device_id: Some(device_id.to_string()),
                    api_key: None,
                }),
            )
        }
        Ok(false) => (
            StatusCode::UNAUTHORIZED,
            Json(AuthResponse::failure(
                "Invalid username, password, or device ID",
            )),
        ),
        Err(e) => {
            error!("Login error for device {}: {}", device_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AuthResponse::failure(format!("Internal server error: {e}"))),
            )
        }
    }
}

async fn check_device_id(
    State(state): State<AppState>,
    Json(req): Json<DeviceRequest>,
) -> Result<impl IntoResponse, AdvisorError> {
    // ---
    let registered = state.credentials.is_registered(req.device_id.trim()).await?;
    Ok(Json(json!({ "registered": registered })))
}
