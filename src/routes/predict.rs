//! `POST /predict`: crop recommendation, suitability scoring and fertilizer
//! recommendation behind one endpoint, selected by `mode`.

use axum::{
    extract::State, http::HeaderMap, response::IntoResponse, routing::post, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{authorize_device, AppState};
use crate::error::{AdvisorError, Result};
use crate::fertilizer::recommend_fertilizer;
use crate::models::{numeric, Reading, SoilSample};
use crate::suitability::{recommend_crop, score_suitability};

// ---

const DEFAULT_TEMPERATURE: f64 = 25.0;
const DEFAULT_HUMIDITY: f64 = 50.0;
const DEFAULT_PH: f64 = 7.0;
const DEFAULT_RAINFALL: f64 = 100.0;
const DEFAULT_MOISTURE: f64 = 40.0;
const DEFAULT_SOIL: &str = "Black";

pub fn router() -> Router<AppState> {
    Router::new().route("/predict", post(predict))
}

/// Request body. Numeric fields accept numbers or numeric strings.
#[derive(Debug, Deserialize)]
struct PredictRequest {
    // ---
    mode: Option<String>,
    #[serde(default)]
    use_sensor_data: bool,
    device_id: Option<String>,
    crop_name: Option<String>,
    soil: Option<String>,
    #[serde(rename = "N")]
    n: Option<Value>,
    #[serde(rename = "P")]
    p: Option<Value>,
    #[serde(rename = "K")]
    k: Option<Value>,
    temperature: Option<Value>,
    humidity: Option<Value>,
    ph: Option<Value>,
    rainfall: Option<Value>,
    ec: Option<Value>,
    moisture: Option<Value>,
}

/// Resolved model inputs.
#[derive(Debug, Clone, PartialEq)]
struct Inputs {
    /// N, P, K, temperature, humidity, pH, rainfall
    parameters: [f64; 7],
    ec: f64,
    moisture: f64,
}

async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PredictRequest>,
) -> Result<impl IntoResponse> {
    // ---
    let mode = req.mode.as_deref().unwrap_or("crop");
    info!("POST /predict - mode={} use_sensor_data={}", mode, req.use_sensor_data);

    let inputs = if req.use_sensor_data {
        let reading = sensor_reading(&state, &headers, req.device_id.as_deref()).await?;
        from_sensor(&req, reading.as_ref())?
    } else {
        from_request(&req)?
    };
    debug!("Resolved inputs: {:?}", inputs);

    let body = match mode {
        "crop" => {
            let recommendation = recommend_crop(&state.dataset, &state.models, &inputs.parameters)?;
            serde_json::to_value(recommendation)
        }
        "suitability" => {
            let crop_name = req
                .crop_name
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| AdvisorError::InvalidInput("Crop name is required".to_string()))?;
            let report = score_suitability(&state.dataset, &inputs.parameters, crop_name)?;
            Ok(json!({
                "crop": crop_name,
                "suitability": report.score,
                "recommendations": report.adjustments,
                "table_data": report.table,
            }))
        }
        "fertilizer" => {
            let [n, p, k, temperature, humidity, ph, _] = inputs.parameters;
            let sample = SoilSample {
                n: Some(n),
                p: Some(p),
                k: Some(k),
                temperature: Some(temperature),
                humidity: Some(humidity),
                ph: Some(ph),
                moisture: Some(inputs.moisture),
                ec: Some(inputs.ec),
                soil_type: Some(req.soil.clone().unwrap_or_else(|| DEFAULT_SOIL.to_string())),
                crop_name: req.crop_name.clone(),
            };
            serde_json::to_value(recommend_fertilizer(&state.models, &sample, None)?)
        }
        _ => {
            return Err(AdvisorError::InvalidInput(
                "Invalid mode specified".to_string(),
            ))
        }
    }
    .map_err(|e| AdvisorError::Internal(e.to_string()))?;

    Ok(Json(body))
}

/// Latest reading for `device_id`, or `None` when it has not reported yet.
/// The caller must present the device's API key.
async fn sensor_reading(
    state: &AppState,
    headers: &HeaderMap,
    device_id: Option<&str>,
) -> Result<Option<Reading>> {
    // ---
    let device_id = device_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AdvisorError::InvalidInput("device_id is required with use_sensor_data".to_string())
        })?;
    authorize_device(state, headers, device_id).await?;

    match state.telemetry.latest(device_id).await {
        Ok(reading) => Ok(Some(reading)),
        Err(AdvisorError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Inputs taken from the latest reading. Rainfall always comes from the
/// request and a humidity given in the request wins over the sensor's.
fn from_sensor(req: &PredictRequest, reading: Option<&Reading>) -> Result<Inputs> {
    // ---
    let field = |pick: fn(&Reading) -> f64, default: f64| reading.map_or(default, pick);

    let humidity = match numeric("humidity", &req.humidity)? {
        Some(v) => v,
        None => field(|r| r.humidity, DEFAULT_HUMIDITY),
    };

    Ok(Inputs {
        parameters: [
            field(|r| r.n, 0.0),
            field(|r| r.p, 0.0),
            field(|r| r.k, 0.0),
            field(|r| r.temperature, DEFAULT_TEMPERATURE),
            humidity,
            field(|r| r.ph, DEFAULT_PH),
            numeric("rainfall", &req.rainfall)?.unwrap_or(DEFAULT_RAINFALL),
        ],
        ec: field(|r| r.ec, 0.0),
        moisture: field(|r| r.moisture, DEFAULT_MOISTURE),
    })
}

fn from_request(req: &PredictRequest) -> Result<Inputs> {
    // ---
    let value = |name: &str, raw: &Option<Value>, default: f64| -> Result<f64> {
        Ok(numeric(name, raw)?.unwrap_or(default))
    };

    Ok(Inputs {
        parameters: [
            value("N", &req.n, 0.0)?,
            value("P", &req.p, 0.0)?,
            value("K", &req.k, 0.0)?,
            value("temperature", &req.temperature, DEFAULT_TEMPERATURE)?,
            value("humidity", &req.humidity, DEFAULT_HUMIDITY)?,
            value("ph", &req.ph, DEFAULT_PH)?,
            value("rainfall", &req.rainfall, DEFAULT_RAINFALL)?,
        ],
        ec: value("ec", &req.ec, 0.0)?,
        moisture: value("moisture", &req.moisture, DEFAULT_MOISTURE)?,
    })
}
