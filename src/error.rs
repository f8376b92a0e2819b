//! Error taxonomy for the advisory core.
//!
//! Every core operation returns [`Result<T>`]; the HTTP layer in `routes`
//! is the only place these variants are turned into status codes.

use thiserror::Error;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Errors surfaced by the advisory core.
#[derive(Error, Debug)]
pub enum AdvisorError {
    /// Crop label absent from the reference dataset
    #[error("Crop not found in dataset: {0}")]
    CropNotFound(String),

    /// Device, account or reading absent
    #[error("{0}")]
    NotFound(String),

    /// Malformed request data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Required telemetry fields absent from an ingest payload
    #[error("Missing required sensor fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// Classifier or encoder artifacts were not loaded at startup
    #[error("{0} model not available")]
    ModelUnavailable(&'static str),

    /// Credential mismatch
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Device unknown or already registered
    #[error("Invalid or already registered Device ID: {0}")]
    InvalidDevice(String),

    /// Username or device already bound to an account
    #[error("Account already exists: {0}")]
    DuplicateAccount(String),

    /// Device already provisioned
    #[error("Device ID {0} already exists")]
    AlreadyExists(String),

    /// Unexpected failure (storage, hashing, poisoned state)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AdvisorError {
    fn from(e: sqlx::Error) -> Self {
        AdvisorError::Internal(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for AdvisorError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        AdvisorError::Internal("store lock poisoned".to_string())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_missing_fields_lists_every_field() {
        // ---
        let err = AdvisorError::MissingFields(vec!["temperature", "ph"]);
        assert_eq!(
            err.to_string(),
            "Missing required sensor fields: temperature, ph"
        );
    }

    #[test]
    fn test_model_unavailable_names_the_model() {
        // ---
        let err = AdvisorError::ModelUnavailable("Fertilizer recommendation");
        assert_eq!(err.to_string(), "Fertilizer recommendation model not available");
    }
}
