//! Soil telemetry and crop advisory backend.
//!
//! The advisory core (`dataset`, `suitability`, `fertilizer`, `advice`,
//! `classifier`) is pure and synchronous. Device lifecycle and telemetry
//! (`credentials`, `telemetry`) sit on top of the `store` gateway, and
//! `routes` exposes all of it over HTTP.

pub mod advice;
pub mod classifier;
pub mod config;
pub mod credentials;
pub mod dataset;
pub mod error;
pub mod fertilizer;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;
pub mod suitability;
pub mod telemetry;

pub use config::Config;
pub use error::{AdvisorError, Result};
