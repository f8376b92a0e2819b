//! Data models shared by the advisory core, the store and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdvisorError, Result};

// ---

/// Fields an ingest payload must carry.
pub const REQUIRED_SENSOR_FIELDS: [&str; 3] = ["temperature", "ph", "humidity"];

/// Raw telemetry as posted by a field device.
///
/// Every field is optional on the wire; numbers may also arrive as numeric
/// strings, as some firmware builds send them quoted.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TelemetryPayload {
    // ---
    pub device_id: Option<String>,
    pub temperature: Option<Value>,
    pub ph: Option<Value>,
    pub humidity: Option<Value>,
    pub ec: Option<Value>,
    #[serde(rename = "N")]
    pub n: Option<Value>,
    #[serde(rename = "P")]
    pub p: Option<Value>,
    #[serde(rename = "K")]
    pub k: Option<Value>,
    pub moisture: Option<Value>,
}

/// A stored telemetry reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reading {
    // ---
    pub device_id: String,
    pub temperature: f64,
    pub ph: f64,
    pub humidity: f64,
    pub ec: f64,
    #[serde(rename = "N")]
    pub n: f64,
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "K")]
    pub k: f64,
    pub moisture: f64,
    #[sqlx(rename = "recorded_at")]
    pub timestamp: DateTime<Utc>,
}

impl TelemetryPayload {
    // ---
    /// Validate the payload and build a [`Reading`] stamped with `timestamp`.
    ///
    /// Missing optional fields take their field defaults: `ec`, `N`, `P`, `K`
    /// default to 0 and `moisture` to 40.
    pub fn to_reading(&self, device_id: &str, timestamp: DateTime<Utc>) -> Result<Reading> {
        // ---
        let missing: Vec<&'static str> = REQUIRED_SENSOR_FIELDS
            .iter()
            .zip([&self.temperature, &self.ph, &self.humidity])
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(AdvisorError::MissingFields(missing));
        }

        Ok(Reading {
            device_id: device_id.to_string(),
            temperature: numeric("temperature", &self.temperature)?.unwrap_or_default(),
            ph: numeric("ph", &self.ph)?.unwrap_or_default(),
            humidity: numeric("humidity", &self.humidity)?.unwrap_or_default(),
            ec: numeric("ec", &self.ec)?.unwrap_or(0.0),
            n: numeric("N", &self.n)?.unwrap_or(0.0),
            p: numeric("P", &self.p)?.unwrap_or(0.0),
            k: numeric("K", &self.k)?.unwrap_or(0.0),
            moisture: numeric("moisture", &self.moisture)?.unwrap_or(40.0),
            timestamp,
        })
    }
}

/// Coerce a JSON number or numeric string into `f64`.
///
/// `null` is treated as absent.
pub fn numeric(field: &str, value: &Option<Value>) -> Result<Option<f64>> {
    // ---
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(AdvisorError::InvalidInput(format!(
            "{field} must be a number"
        ))),
    }
}

/// Soil and climate features handed to the fertilizer recommender.
///
/// Absent values fall back to the recommender's feature defaults.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SoilSample {
    // ---
    #[serde(rename = "N")]
    pub n: Option<f64>,
    #[serde(rename = "P")]
    pub p: Option<f64>,
    #[serde(rename = "K")]
    pub k: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub ph: Option<f64>,
    pub moisture: Option<f64>,
    pub ec: Option<f64>,
    pub soil_type: Option<String>,
    pub crop_name: Option<String>,
}

/// Registration state of a provisioned device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unregistered,
    Registered,
}

/// A provisioned field device.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Device {
    // ---
    pub device_id: String,
    pub registered: bool,
    pub api_key: Option<String>,
}

impl Device {
    // ---
    pub fn unregistered(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            registered: false,
            api_key: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        if self.registered {
            DeviceState::Registered
        } else {
            DeviceState::Unregistered
        }
    }
}

/// A user account bound to exactly one device.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Account {
    // ---
    pub username: String,
    pub password_hash: String,
    pub device_id: String,
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredDevice {
    pub device_id: String,
    pub api_key: String,
}

/// One page of a device's reading history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    // ---
    pub history: Vec<Reading>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}
