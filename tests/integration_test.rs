use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use terradetect::classifier::{FertilizerBundle, ModelArtifacts, RandomForest};
use terradetect::dataset::{CropProfile, IdealParameters, ReferenceDataset};
use terradetect::routes::{self, AppState};
use terradetect::store::Store;

// ---

fn dataset() -> ReferenceDataset {
    // ---
    let profile = |name: &str, ideal: [f64; 7]| CropProfile {
        name: name.to_string(),
        ideal: IdealParameters {
            n: ideal[0],
            p: ideal[1],
            k: ideal[2],
            temperature: ideal[3],
            humidity: ideal[4],
            ph: ideal[5],
            rainfall: ideal[6],
        },
    };

    ReferenceDataset::from_profiles(vec![
        profile("rice", [80.0, 40.0, 40.0, 24.0, 80.0, 6.5, 200.0]),
        profile("maize", [100.0, 50.0, 20.0, 22.0, 65.0, 6.2, 80.0]),
    ])
}

/// Crop stump on N (<= 90 → rice); fertilizer stump on Nitrogen (<= 30 → Urea).
fn models() -> ModelArtifacts {
    // ---
    let crop_model: RandomForest = serde_json::from_value(json!({
        "classes": ["maize", "rice"],
        "trees": [{
            "children_left":  [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature":        [0, -2, -2],
            "threshold":      [90.0, -2.0, -2.0],
            "value":          [[5, 5], [0, 5], [5, 0]]
        }]
    }))
    .unwrap();

    let fertilizer: FertilizerBundle = serde_json::from_value(json!({
        "model": {
            "classes": ["DAP", "Urea"],
            "trees": [{
                "children_left":  [1, -1, -1],
                "children_right": [2, -1, -1],
                "feature":        [5, -2, -2],
                "threshold":      [30.0, -2.0, -2.0],
                "value":          [[4, 4], [0, 4], [4, 0]]
            }]
        },
        "label_encoders": {
            "Soil": { "classes": ["Black", "Clayey", "Red"] },
            "Crop": { "classes": ["Maize", "Wheat"] }
        },
        "fertilizer_details": [
            { "name": "Urea", "composition": "46-0-0" }
        ]
    }))
    .unwrap();

    ModelArtifacts {
        crop_model: Some(crop_model),
        fertilizer: Some(fertilizer),
    }
}

/// Serve the full router on an ephemeral port with devices `ABC123` and
/// `DEF456` provisioned.
async fn spawn_app() -> Result<String> {
    // ---
    let state = AppState::new(Store::in_memory(), dataset(), models());
    state.credentials.provision("ABC123").await?;
    state.credentials.provision("DEF456").await?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, routes::router(state)).await.ok();
    });

    Ok(format!("http://{}", addr))
}

async fn post(client: &Client, url: String, body: Value) -> Result<(StatusCode, Value)> {
    let resp = client.post(url).json(&body).send().await?;
    Ok((resp.status(), resp.json().await?))
}

async fn register(client: &Client, base: &str, username: &str, device_id: &str) -> Result<String> {
    // ---
    let (status, body) = post(
        client,
        format!("{base}/api/register"),
        json!({ "username": username, "password": "s3cret", "device_id": device_id }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    Ok(body["api_key"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn health_reports_backend_and_artifacts() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let body: Value = Client::new()
        .get(format!("{base}/health"))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["crops"], 2);
    assert_eq!(body["crop_model"], true);
    Ok(())
}

#[tokio::test]
async fn registration_and_login_flow() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();

    let (_, body) = post(
        &client,
        format!("{base}/api/check_device_id"),
        json!({ "device_id": "ABC123" }),
    )
    .await?;
    assert_eq!(body["registered"], false);

    let api_key = register(&client, &base, "alice", "ABC123").await?;
    assert_eq!(api_key.len(), 32);

    let (_, body) = post(
        &client,
        format!("{base}/api/check_device_id"),
        json!({ "device_id": "ABC123" }),
    )
    .await?;
    assert_eq!(body["registered"], true);

    // Second registration on the same device is refused
    let (status, body) = post(
        &client,
        format!("{base}/api/register"),
        json!({ "username": "bob", "password": "pw", "device_id": "ABC123" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid or already registered Device ID");

    let (status, body) = post(
        &client,
        format!("{base}/api/login"),
        json!({ "username": "alice", "password": "s3cret", "device_id": "ABC123" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // Right credentials, wrong device
    let (status, _) = post(
        &client,
        format!("{base}/api/login"),
        json!({ "username": "alice", "password": "s3cret", "device_id": "DEF456" }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn telemetry_ingest_latest_and_history() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let api_key = register(&client, &base, "alice", "ABC123").await?;

    for temperature in [21.0, 22.5, 24.0] {
        let resp = client
            .post(format!("{base}/api/esp32"))
            .header("x-api-key", &api_key)
            .json(&json!({
                "device_id": "ABC123",
                "temperature": temperature,
                "ph": "6.8",
                "humidity": 71,
                "N": 40
            }))
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await?;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["moisture"], 40.0);
    }

    let body: Value = client
        .get(format!("{base}/api/sensor/ABC123/latest"))
        .header("x-api-key", &api_key)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["temperature"], 24.0);
    assert_eq!(body["data"]["ph"], 6.8);
    assert_eq!(body["source"], "esp32");

    let body: Value = client
        .get(format!("{base}/api/sensor/ABC123/history?page=2&per_page=2"))
        .header("x-api-key", &api_key)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 2);
    assert_eq!(body["history"].as_array().map(Vec::len), Some(1));

    // Malformed pagination falls back to page 1 of 10
    let body: Value = client
        .get(format!("{base}/api/sensor/ABC123/history?page=abc&per_page=-4"))
        .header("x-api-key", &api_key)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["page"], 1);
    assert_eq!(body["per_page"], 10);
    assert_eq!(body["history"].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[tokio::test]
async fn telemetry_rejections() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let api_key = register(&client, &base, "alice", "ABC123").await?;

    let reading = json!({ "device_id": "ABC123", "temperature": 25, "ph": 7, "humidity": 60 });

    let resp = client
        .post(format!("{base}/api/esp32"))
        .json(&reading)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(format!("{base}/api/esp32"))
        .header("x-api-key", &api_key)
        .json(&json!({ "device_id": "ABC123", "temperature": 25 }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // A registered device that has not reported yet
    let other_key = register(&client, &base, "bob", "DEF456").await?;
    let resp = client
        .get(format!("{base}/api/sensor/DEF456/latest"))
        .header("x-api-key", &other_key)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn sensor_reads_require_the_device_key() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let api_key = register(&client, &base, "alice", "ABC123").await?;
    let other_key = register(&client, &base, "bob", "DEF456").await?;

    client
        .post(format!("{base}/api/esp32"))
        .header("x-api-key", &api_key)
        .json(&json!({ "device_id": "ABC123", "temperature": 25, "ph": 7, "humidity": 60 }))
        .send()
        .await?
        .error_for_status()?;

    for path in ["latest", "history"] {
        let url = format!("{base}/api/sensor/ABC123/{path}");

        let resp = client.get(&url).send().await?;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "anonymous {path}");

        // Another device's key does not open this device
        let resp = client.get(&url).header("x-api-key", &other_key).send().await?;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "foreign key {path}");

        let resp = client.get(&url).header("x-api-key", &api_key).send().await?;
        assert_eq!(resp.status(), StatusCode::OK, "own key {path}");
    }

    let (status, _) = post(
        &client,
        format!("{base}/predict"),
        json!({ "mode": "crop", "use_sensor_data": true, "device_id": "ABC123" }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn predict_modes() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let url = format!("{base}/predict");
    let rice = json!({
        "N": 80, "P": 40, "K": 40, "temperature": 24, "humidity": 80, "ph": 6.5, "rainfall": 200
    });

    let mut request = rice.clone();
    request["mode"] = json!("crop");
    let (status, body) = post(&client, url.clone(), request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["crop"], "rice");
    assert_eq!(body["confidence"], 100.0);
    assert_eq!(body["crop-predicted"], "rice");
    assert_eq!(body["confidence-predicted"], 100.0);

    let mut request = rice.clone();
    request["mode"] = json!("suitability");
    request["crop_name"] = json!("rice");
    request["N"] = json!(40);
    let (status, body) = post(&client, url.clone(), request).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["suitability"].as_f64().unwrap_or(100.0) < 100.0);
    assert_eq!(body["table_data"][0]["parameter"], "Nitrogen (N)");
    assert!(body["table_data"][0]["remarks"]
        .as_str()
        .unwrap_or_default()
        .starts_with("Too low. Increase by 40.0."));
    assert_eq!(body["recommendations"].as_array().map(Vec::len), Some(1));

    let (status, body) = post(
        &client,
        url.clone(),
        json!({ "mode": "suitability", "crop_name": "mango" }),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap_or_default().contains("mango"));

    let (status, _) = post(&client, url.clone(), json!({ "mode": "suitability" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &client,
        url.clone(),
        json!({ "mode": "fertilizer", "N": 20, "P": 45, "K": 10, "crop_name": "Maize" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fertilizer"], "Urea");
    assert_eq!(body["composition"], "46-0-0");
    assert_eq!(body["deficiencies"]["N"], 30.0);
    assert_eq!(body["deficiencies"]["P"], 0.0);
    assert!(body.get("phosphorus_advice").is_none());

    let (status, body) = post(&client, url, json!({ "mode": "yield" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("Invalid mode specified"));
    Ok(())
}

#[tokio::test]
async fn predict_from_sensor_data() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let api_key = register(&client, &base, "alice", "ABC123").await?;

    client
        .post(format!("{base}/api/esp32"))
        .header("x-api-key", &api_key)
        .json(&json!({
            "device_id": "ABC123", "temperature": 24, "ph": 6.5, "humidity": 10, "N": 80, "P": 40, "K": 40
        }))
        .send()
        .await?
        .error_for_status()?;

    // Humidity and rainfall from the request complete the rice profile
    let resp = client
        .post(format!("{base}/predict"))
        .header("x-api-key", &api_key)
        .json(&json!({
            "mode": "suitability", "use_sensor_data": true, "device_id": "ABC123",
            "crop_name": "rice", "humidity": 80, "rainfall": 200
        }))
        .send()
        .await?;
    let status = resp.status();
    let body: Value = resp.json().await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suitability"], 100.0);
    assert_eq!(body["recommendations"].as_array().map(Vec::len), Some(0));
    Ok(())
}
