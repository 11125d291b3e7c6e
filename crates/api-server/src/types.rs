//! API request and response types

use dermai_explain::Explanation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Liveness message for `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` once the model is loaded, `loading` before
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
}

/// Error body used by every endpoint except `/api/gemini`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Explanation request
///
/// `disease` may be any JSON value; non-strings are used as their JSON text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiRequest {
    #[serde(default)]
    pub disease: Value,
}

impl GeminiRequest {
    /// Requested condition, `Unknown` when absent or null
    #[must_use]
    pub fn disease(&self) -> Cow<'_, str> {
        match &self.disease {
            Value::Null => Cow::Borrowed("Unknown"),
            Value::String(s) => Cow::Borrowed(s),
            other => Cow::Owned(other.to_string()),
        }
    }
}

/// Explanation response; also used with status 500 when the service call fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiResponse {
    pub disease: String,
    pub description: String,
    pub treatment: String,
    pub references: Vec<String>,
}

impl GeminiResponse {
    #[must_use]
    pub fn from_explanation(disease: &str, explanation: Explanation) -> Self {
        Self {
            disease: disease.to_string(),
            description: explanation.description,
            treatment: explanation.treatment,
            references: explanation.references,
        }
    }

    /// Body returned when the generation service could not be reached
    #[must_use]
    pub fn fetch_failed(disease: &str, error: &str) -> Self {
        Self {
            disease: disease.to_string(),
            description: "Error fetching info".to_string(),
            treatment: error.to_string(),
            references: Vec::new(),
        }
    }
}
