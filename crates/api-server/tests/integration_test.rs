//! Integration tests for API server
//!
//! These tests start the API server on a loopback port with a stub model and a
//! local mock of the Gemini API, send real HTTP requests, and verify responses.

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use dermai_api_server::{start_server, ApiState};
use dermai_classifier::{
    ClassLabels, InferenceError, InferenceService, InputTensor, LabelMap, PredictionVector, Scorer,
};
use dermai_common::{GeminiConfig, NormalizationScheme};
use dermai_explain::GeminiClient;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Scores independent of the input, over four classes
struct StubScorer;

impl Scorer for StubScorer {
    fn num_classes(&self) -> Option<usize> {
        Some(4)
    }

    fn score(&self, input: &InputTensor) -> Result<PredictionVector, InferenceError> {
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        Ok(PredictionVector::new(vec![0.05, 0.15, 0.6, 0.2]))
    }
}

fn classifier() -> Arc<InferenceService> {
    let labels = ClassLabels::new(
        ["Acne And Rosacea Photos", "Benign", "Eczema Photos", "Keloid"]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
    );
    Arc::new(InferenceService::with_scorer(
        labels,
        LabelMap::builtin(),
        NormalizationScheme::EfficientNetV2,
        Arc::new(StubScorer),
    ))
}

/// Start a mock `generateContent` endpoint answering with `status` and `reply` text
async fn spawn_mock_gemini(status: StatusCode, reply: &'static str) -> String {
    let app = Router::new().route(
        "/v1beta/models/{model}",
        post(move |Json(_body): Json<Value>| async move {
            (
                status,
                Json(json!({
                    "candidates": [{"content": {"parts": [{"text": reply}], "role": "model"}}]
                })),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Start a mock endpoint that answers only after `delay`
async fn spawn_slow_mock_gemini(delay: Duration) -> String {
    let app = Router::new().route(
        "/v1beta/models/{model}",
        post(move || async move {
            sleep(delay).await;
            Json(json!({"candidates": []}))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn explainer_with_timeout(base_url: &str, timeout_secs: u64) -> Arc<GeminiClient> {
    let config = GeminiConfig {
        api_key: "test-key".to_string(),
        base_url: base_url.to_string(),
        timeout_secs,
        ..GeminiConfig::default()
    };
    Arc::new(GeminiClient::new(&config).unwrap())
}

fn explainer(base_url: &str) -> Arc<GeminiClient> {
    explainer_with_timeout(base_url, 5)
}

/// Start the server in the background and return its base URL
async fn spawn_server(port: u16, state: ApiState) -> (String, tokio::task::JoinHandle<()>) {
    let addr = format!("127.0.0.1:{port}");
    let bind = addr.clone();
    let handle = tokio::spawn(async move {
        start_server(&bind, state)
            .await
            .expect("Failed to start server");
    });

    // Give server time to start
    sleep(Duration::from_millis(500)).await;
    (format!("http://{addr}"), handle)
}

fn grayscale_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([140])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn image_form(bytes: Vec<u8>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name("lesion.png")
        .mime_str("image/png")
        .unwrap();
    reqwest::multipart::Form::new().part("image", part)
}

#[tokio::test]
async fn test_home_and_health() {
    let classifier = classifier();
    let state = ApiState::new(Arc::clone(&classifier), explainer("http://127.0.0.1:9"), 1 << 20);
    let (base, server) = spawn_server(18180, state).await;
    let client = reqwest::Client::new();

    let home: Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(home["message"], "DermAI backend running");

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "loading");
    assert_eq!(health["model_loaded"], false);
    assert!(health["version"].is_string());

    classifier.load().unwrap();
    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["model_loaded"], true);

    server.abort();
}

#[tokio::test]
async fn test_predict_grayscale_upload() {
    let state = ApiState::new(classifier(), explainer("http://127.0.0.1:9"), 16 << 20);
    let (base, server) = spawn_server(18181, state).await;
    let client = reqwest::Client::new();

    for path in ["/api/predict/", "/api/predict"] {
        let response = client
            .post(format!("{base}{path}"))
            .multipart(image_form(grayscale_png(500, 500)))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "{path}");

        let body: Value = response.json().await.unwrap();
        let top3 = body["top3"].as_array().unwrap();
        assert_eq!(top3.len(), 3);
        assert_eq!(body["disease"], top3[0]["disease"]);
        assert_eq!(body["disease"], "Eczema");

        let scores: Vec<f64> = top3
            .iter()
            .map(|entry| entry["confidence"].as_f64().unwrap())
            .collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(top3[1]["disease"], "Keloid");
        assert_eq!(top3[2]["disease"], "Benign Skin Lesions");
    }

    server.abort();
}

#[tokio::test]
async fn test_predict_without_image() {
    let state = ApiState::new(classifier(), explainer("http://127.0.0.1:9"), 16 << 20);
    let (base, server) = spawn_server(18182, state).await;
    let client = reqwest::Client::new();

    // Multipart form without an image field
    let form = reqwest::multipart::Form::new().text("note", "forgot the picture");
    let response = client
        .post(format!("{base}/api/predict/"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "No image provided"}));

    // Not a multipart request at all
    let response = client
        .post(format!("{base}/api/predict/"))
        .json(&json!({"image": "abc"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No image provided");

    server.abort();
}

#[tokio::test]
async fn test_predict_undecodable_image() {
    let state = ApiState::new(classifier(), explainer("http://127.0.0.1:9"), 16 << 20);
    let (base, server) = spawn_server(18183, state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/predict/"))
        .multipart(image_form(b"not really a png".to_vec()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("cannot identify image file"));

    server.abort();
}

#[tokio::test]
async fn test_gemini_fenced_json() {
    let reply = "```json\n{\"description\": \"A common skin condition.\", \"treatment\": \"Topical retinoids.\", \"references\": [\"https://www.aad.org/acne\"]}\n```";
    let mock = spawn_mock_gemini(StatusCode::OK, reply).await;
    let state = ApiState::new(classifier(), explainer(&mock), 16 << 20);
    let (base, server) = spawn_server(18184, state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/gemini/"))
        .json(&json!({"disease": "Acne"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["disease"], "Acne");
    assert_eq!(body["description"], "A common skin condition.");
    assert_eq!(body["treatment"], "Topical retinoids.");
    assert_eq!(body["references"], json!(["https://www.aad.org/acne"]));

    // A non-string condition is used as its JSON text
    let response = reqwest::Client::new()
        .post(format!("{base}/api/gemini"))
        .json(&json!({"disease": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["disease"], "5");

    server.abort();
}

#[tokio::test]
async fn test_gemini_prose_degrades_to_fallback() {
    let mock = spawn_mock_gemini(StatusCode::OK, "Acne is a skin condition. See a doctor.").await;
    let state = ApiState::new(classifier(), explainer(&mock), 16 << 20);
    let (base, server) = spawn_server(18185, state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/gemini"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["disease"], "Unknown");
    assert_eq!(body["description"], "Acne is a skin condition. See a doctor.");
    assert_eq!(body["treatment"], "Consult a dermatologist.");
    assert_eq!(body["references"], json!([]));

    server.abort();
}

#[tokio::test]
async fn test_gemini_service_failure() {
    let mock = spawn_mock_gemini(StatusCode::INTERNAL_SERVER_ERROR, "").await;
    let state = ApiState::new(classifier(), explainer(&mock), 16 << 20);
    let (base, server) = spawn_server(18186, state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/gemini/"))
        .json(&json!({"disease": "Acne"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["disease"], "Acne");
    assert_eq!(body["description"], "Error fetching info");
    assert!(body["treatment"].as_str().unwrap().contains("500"));
    assert_eq!(body["references"], json!([]));

    server.abort();
}

#[tokio::test]
async fn test_gemini_timeout_is_fetch_failure() {
    let mock = spawn_slow_mock_gemini(Duration::from_secs(3)).await;
    let state = ApiState::new(classifier(), explainer_with_timeout(&mock, 1), 16 << 20);
    let (base, server) = spawn_server(18189, state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/gemini/"))
        .json(&json!({"disease": "Keloid"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["disease"], "Keloid");
    assert_eq!(body["description"], "Error fetching info");
    assert!(body["treatment"].as_str().unwrap().contains("timed out"));
    assert_eq!(body["references"], json!([]));

    server.abort();
}

#[tokio::test]
async fn test_predict_rejects_oversized_upload() {
    let state = ApiState::new(classifier(), explainer("http://127.0.0.1:9"), 1024);
    let (base, server) = spawn_server(18190, state).await;

    // Larger than the limit; rejected before any decoding
    let response = reqwest::Client::new()
        .post(format!("{base}/api/predict/"))
        .multipart(image_form(vec![0x5a; 8 * 1024]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Upload too large"));

    server.abort();
}

#[tokio::test]
async fn test_report_without_references() {
    let state = ApiState::new(classifier(), explainer("http://127.0.0.1:9"), 16 << 20);
    let (base, server) = spawn_server(18187, state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/report/"))
        .json(&json!({
            "image_name": "arm.png",
            "predicted_class": "Eczema",
            "confidence": 60,
            "description": "Dry, itchy skin.",
            "treatment": "Emollients.",
            "references": []
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"DermAI_Report.pdf\""
    );

    let pdf = response.bytes().await.unwrap();
    assert!(pdf.starts_with(b"%PDF-"));
    let needle = b"No references available.";
    assert!(pdf.windows(needle.len()).any(|w| w == needle));

    server.abort();
}

#[tokio::test]
async fn test_report_defaults_for_empty_body() {
    let state = ApiState::new(classifier(), explainer("http://127.0.0.1:9"), 16 << 20);
    let (base, server) = spawn_server(18188, state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/report"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let pdf = response.bytes().await.unwrap();
    let needle = b"(uploaded_image)";
    assert!(pdf.windows(needle.len()).any(|w| w == needle));

    server.abort();
}
