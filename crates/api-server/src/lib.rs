//! REST API server for DermAI
//!
//! Classifies uploaded skin images, explains predicted conditions through
//! Gemini, and renders PDF reports.

mod error;
mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use dermai_classifier::InferenceService;
use dermai_common::{DermError, ServiceConfig};
use dermai_explain::GeminiClient;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Skin classifier; the model inside is loaded at most once
    pub classifier: Arc<InferenceService>,
    /// Gemini client for condition explanations
    pub explainer: Arc<GeminiClient>,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
}

impl ApiState {
    #[must_use]
    pub fn new(
        classifier: Arc<InferenceService>,
        explainer: Arc<GeminiClient>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            classifier,
            explainer,
            max_upload_bytes,
        }
    }

    /// Build state from service configuration
    ///
    /// Reads class labels and prepares the Gemini client; the model is not loaded here.
    ///
    /// # Errors
    /// Returns error if the label files cannot be read or the HTTP client cannot be built
    pub fn from_config(config: &ServiceConfig) -> Result<Self, DermError> {
        let classifier = InferenceService::from_config(config)
            .map_err(|e| DermError::ModelLoad(e.to_string()))?;
        let explainer = GeminiClient::new(&config.gemini)?;

        Ok(Self::new(
            Arc::new(classifier),
            Arc::new(explainer),
            config.max_upload_bytes(),
        ))
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        // Liveness and health
        .route("/", get(home))
        .route("/health", get(health_check))
        // Classification
        .route("/api/predict", post(predict))
        .route("/api/predict/", post(predict))
        // Explanations
        .route("/api/gemini", post(gemini_info))
        .route("/api/gemini/", post(gemini_info))
        // Reports
        .route("/api/report", post(generate_report))
        .route("/api/report/", post(generate_report))
        // Middleware
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
