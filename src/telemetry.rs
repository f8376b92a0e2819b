//! Telemetry ingest, latest-reading cache and paginated history.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::credentials::Credentials;
use crate::error::{AdvisorError, Result};
use crate::models::{HistoryPage, Reading, TelemetryPayload};
use crate::store::Store;

// ---

pub struct Telemetry {
    store: Store,
    credentials: Arc<Credentials>,
    /// Most recent reading per device; last write wins.
    latest: RwLock<HashMap<String, Reading>>,
}

impl Telemetry {
    // ---
    pub fn new(store: Store, credentials: Arc<Credentials>) -> Self {
        Self {
            store,
            credentials,
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Validate, authorize and store one reading.
    ///
    /// The device must present the API key issued at registration. The
    /// reading is timestamped on arrival.
    pub async fn ingest(&self, api_key: Option<&str>, payload: &TelemetryPayload) -> Result<Reading> {
        // ---
        let device_id = payload
            .device_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AdvisorError::InvalidInput("Missing device_id".to_string()))?;

        if !self.credentials.verify_device_key(device_id, api_key).await? {
            warn!("Rejected telemetry for device {}: bad API key", device_id);
            return Err(AdvisorError::Unauthorized(
                "Invalid API key for device_id".to_string(),
            ));
        }

        let reading = payload.to_reading(device_id, Utc::now())?;
        self.store.insert_reading(&reading).await?;
        self.latest
            .write()?
            .insert(device_id.to_string(), reading.clone());

        debug!("Stored reading for device {}: {:?}", device_id, reading);
        Ok(reading)
    }

    /// Most recent reading for `device_id`.
    pub async fn latest(&self, device_id: &str) -> Result<Reading> {
        // ---
        let cached = self.latest.read()?.get(device_id).cloned();
        if let Some(reading) = cached {
            return Ok(reading);
        }

        let reading = self
            .store
            .latest_reading(device_id)
            .await?
            .ok_or_else(|| {
                AdvisorError::NotFound("No sensor data available for your device".to_string())
            })?;

        self.latest
            .write()?
            .entry(device_id.to_string())
            .or_insert_with(|| reading.clone());
        Ok(reading)
    }

    /// One page of history, newest first. `page` and `per_page` are clamped
    /// to at least 1.
    pub async fn history(&self, device_id: &str, page: i64, per_page: i64) -> Result<HistoryPage> {
        // ---
        let page = clamp_to_u32(page);
        let per_page = clamp_to_u32(per_page);
        let skip = u64::from(page - 1) * u64::from(per_page);

        let total = self.store.reading_count(device_id).await?;
        let history = self
            .store
            .readings_page(device_id, skip, u64::from(per_page))
            .await?;

        info!(
            "History for {}: page {} ({} of {} readings)",
            device_id,
            page,
            history.len(),
            total
        );
        Ok(HistoryPage {
            history,
            total,
            page,
            per_page,
        })
    }
}

fn clamp_to_u32(value: i64) -> u32 {
    u32::try_from(value.max(1)).unwrap_or(u32::MAX)
}
