//! Gemini `generateContent` REST client

use crate::parse::{parse_explanation, Explanation};
use crate::ExplainError;
use dermai_common::GeminiConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Delay before the first retry; doubles on each further attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Prompt asking the model for a JSON explanation of `disease`
#[must_use]
pub fn build_prompt(disease: &str) -> String {
    format!(
        r#"Provide a medical explanation for the skin condition: {disease}.
Respond in **valid JSON only** with exactly this structure:

{{
  "description": "Plain-text explanation of the condition.",
  "treatment": "Plain-text summary of common treatments.",
  "references": ["https://reliable-medical-source.org/example1",
                 "https://reliable-medical-source.org/example2"]
}}
Only return JSON, no extra text or markdown."#
    )
}

/// HTTP client for the Gemini generative language API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl GeminiClient {
    /// Create a client with the configured timeout
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be built
    pub fn new(config: &GeminiConfig) -> Result<Self, ExplainError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExplainError::Fetch(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.trim_start_matches("models/").to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Full `generateContent` URL for the configured model
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// Send `prompt` and return the model's text, retrying transient failures
    ///
    /// # Errors
    /// Returns the last error once retries are exhausted or a non-transient error occurs
    pub async fn generate(&self, prompt: &str) -> Result<String, ExplainError> {
        let mut attempt = 0u32;
        loop {
            match self.generate_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    attempt += 1;
                    warn!(
                        "Gemini request failed ({}), retry {}/{} in {:?}",
                        e, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, ExplainError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExplainError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ExplainError::Fetch(format!("Failed to parse Gemini response: {e}")))?;

        parsed.into_text().ok_or(ExplainError::EmptyResponse)
    }

    fn transport_error(&self, e: &reqwest::Error) -> ExplainError {
        if e.is_timeout() {
            ExplainError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            ExplainError::Connect(e.to_string())
        } else {
            ExplainError::Fetch(format!("Failed to send request to Gemini: {e}"))
        }
    }

    /// Fetch and parse an explanation of `disease`
    ///
    /// # Errors
    /// Returns error only when the service call fails; unparseable output
    /// still yields a fallback explanation.
    pub async fn explain(&self, disease: &str) -> Result<Explanation, ExplainError> {
        let start = Instant::now();
        let text = self.generate(&build_prompt(disease)).await?;
        debug!("Gemini raw output: {}", text);

        let explanation = parse_explanation(&text);
        info!(
            "Explanation for '{}' fetched in {}ms ({:?})",
            disease,
            start.elapsed().as_millis(),
            explanation.source
        );
        Ok(explanation)
    }
}
