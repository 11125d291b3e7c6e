//! Plain-language explanations of predicted skin conditions
//!
//! A [`GeminiClient`] asks the Gemini `generateContent` endpoint for a JSON
//! description of a condition. The model output is only loosely structured, so
//! [`parse_explanation`] works through an ordered list of [`ParseStrategy`]
//! values and always produces a populated [`Explanation`]. Only transport
//! failures are reported as errors.
//!
//! ```no_run
//! use dermai_common::GeminiConfig;
//! use dermai_explain::GeminiClient;
//!
//! # async fn example() -> Result<(), dermai_explain::ExplainError> {
//! let config = GeminiConfig {
//!     api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
//!     ..GeminiConfig::default()
//! };
//! let client = GeminiClient::new(&config)?;
//! let explanation = client.explain("Eczema").await?;
//! println!("{}", explanation.description);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod parse;

use dermai_common::DermError;
use thiserror::Error;

pub use client::{build_prompt, GeminiClient};
pub use parse::{
    parse_explanation, Explanation, ExplanationSource, ParseStrategy, DEFAULT_DESCRIPTION,
    DEFAULT_TREATMENT, PARSE_ORDER,
};

/// Failures talking to the generation service
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("Gemini request timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to reach Gemini: {0}")]
    Connect(String),

    #[error("Gemini API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Gemini response contained no text")]
    EmptyResponse,

    #[error("{0}")]
    Fetch(String),
}

impl ExplainError {
    /// Whether a retry could reasonably succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ExplainError::Timeout(_) | ExplainError::Connect(_) => true,
            ExplainError::Status { status, .. } => *status == 429 || *status >= 500,
            ExplainError::EmptyResponse | ExplainError::Fetch(_) => false,
        }
    }
}

impl From<ExplainError> for DermError {
    fn from(err: ExplainError) -> Self {
        DermError::ExplanationFetch(err.to_string())
    }
}
