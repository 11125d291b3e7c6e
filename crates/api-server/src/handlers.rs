//! HTTP request handlers for API endpoints

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use dermai_common::DermError;
use dermai_report::{ReportRecord, REPORT_FILENAME};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::{
    types::{GeminiRequest, GeminiResponse, HealthResponse, HomeResponse},
    ApiError, ApiState,
};

/// Multipart field carrying the uploaded image
const IMAGE_FIELD: &str = "image";
const NO_IMAGE: &str = "No image provided";

/// Liveness message
pub async fn home() -> impl IntoResponse {
    Json(HomeResponse {
        message: "DermAI backend running".to_string(),
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let model_loaded = state.classifier.is_ready();
    Json(HealthResponse {
        status: if model_loaded { "ok" } else { "loading" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded,
    })
}

/// Read the `image` field of a multipart upload
async fn read_image_field(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ApiError::bad_request(NO_IMAGE)),
            Err(e) => return Err(multipart_error(&e.to_string(), e.status())),
        };

        if field.name() == Some(IMAGE_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|e| multipart_error(&e.to_string(), e.status()));
        }
    }
}

fn multipart_error(message: &str, status: StatusCode) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(status, format!("Upload too large: {message}"))
    } else {
        warn!("Rejected upload: {}", message);
        ApiError::bad_request(NO_IMAGE)
    }
}

/// Classify an uploaded skin image
///
/// Expects a multipart form with an `image` field. Decoding and inference
/// run on the blocking pool.
pub async fn predict(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let multipart = multipart.map_err(|e| {
        warn!("Rejected predict request: {}", e);
        ApiError::bad_request(NO_IMAGE)
    })?;
    let image = read_image_field(multipart).await?;

    let start = Instant::now();
    let size = image.len();
    let classifier = Arc::clone(&state.classifier);
    let result = tokio::task::spawn_blocking(move || classifier.predict(&image))
        .await
        .map_err(|e| DermError::Other(format!("Prediction task failed: {e}")))?
        .map_err(DermError::from)?;

    info!(
        "Predicted {} ({:.3}) for {} byte upload in {:.1}ms",
        result.disease,
        result.confidence,
        size,
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(Json(result))
}

/// Explain a condition using Gemini
///
/// Malformed model output degrades to a fallback explanation with status 200;
/// only a failed service call returns 500.
pub async fn gemini_info(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: GeminiRequest = if body.is_empty() {
        GeminiRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?
    };
    let disease = request.disease();
    let disease = disease.as_ref();

    let response = match state.explainer.explain(disease).await {
        Ok(explanation) => (
            StatusCode::OK,
            Json(GeminiResponse::from_explanation(disease, explanation)),
        ),
        Err(e) => {
            error!("Explanation fetch for '{}' failed: {}", disease, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GeminiResponse::fetch_failed(disease, &e.to_string())),
            )
        }
    };

    Ok(response)
}

/// Render a PDF report from the posted fields
pub async fn generate_report(body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let record: ReportRecord = if body.is_empty() {
        ReportRecord::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?
    };

    let pdf = dermai_report::render(&record).map_err(DermError::from)?;
    info!(
        "Rendered report for '{}' ({} bytes)",
        record.predicted_class,
        pdf.len()
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{REPORT_FILENAME}\""),
            ),
        ],
        pdf,
    ))
}
