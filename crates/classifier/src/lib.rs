//! Skin condition classification
//!
//! Turns uploaded image bytes into a ranked prediction using a pretrained
//! convolutional model exported to ONNX format.
//!
//! # Pipeline
//! 1. [`preprocess::normalize`] decodes the upload and produces a `(1, 224, 224, 3)` tensor
//! 2. [`InferenceService`] lazily loads the model once and scores the tensor
//! 3. [`ranking::rank`] picks the top-1 and top-3 classes and maps them to display names
//!
//! # Example
//! ```no_run
//! use dermai_classifier::InferenceService;
//! use dermai_common::ServiceConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::default();
//! let service = InferenceService::from_config(&config)?;
//! service.load()?;
//!
//! let bytes = std::fs::read("lesion.jpg")?;
//! let prediction = service.predict(&bytes)?;
//! println!("{} ({:.1}%)", prediction.disease, prediction.confidence * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod labels;
pub mod onnx_utils;
pub mod preprocess;
pub mod ranking;

use dermai_common::DermError;
use thiserror::Error;

pub use engine::{InferenceService, OnnxScorer, PredictionVector, Scorer};
pub use labels::{ClassLabels, LabelMap};
pub use preprocess::{normalize, normalize_image, InputTensor, INPUT_HEIGHT, INPUT_WIDTH};
pub use ranking::{rank, top_k, PredictionResult, RankedClass};

/// Errors raised while loading the model or its label list
///
/// Load failures are fatal for the process, so the error is cloneable and
/// cached by [`InferenceService`] once observed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelLoadError {
    #[error("Model file not found: {0}")]
    NotFound(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    Session { path: String, error: String },

    #[error("Failed to load class labels from {path}: {error}")]
    Labels { path: String, error: String },

    #[error("Model produces {model} classes but {labels} class labels are configured")]
    LabelCountMismatch { model: usize, labels: usize },
}

/// Errors raised while scoring a tensor
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Input shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<i64>,
        actual: Vec<usize>,
    },

    #[error("Model returned {actual} scores, expected {expected}")]
    OutputLength { expected: usize, actual: usize },

    #[error("Model returned an empty prediction")]
    EmptyPrediction,

    #[error("ONNX Runtime error: {0}")]
    Runtime(String),
}

impl From<ort::Error> for InferenceError {
    fn from(err: ort::Error) -> Self {
        InferenceError::Runtime(err.to_string())
    }
}

/// Errors that can occur anywhere in the classification pipeline
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("cannot identify image file: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl From<ClassifierError> for DermError {
    fn from(err: ClassifierError) -> Self {
        let message = err.to_string();
        match err {
            ClassifierError::InvalidImage(_) => DermError::InvalidImage(message),
            ClassifierError::ModelLoad(_) => DermError::ModelLoad(message),
            ClassifierError::Inference(_) => DermError::Inference(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelLoadError::NotFound("models/skin_cnn.onnx".to_string());
        assert_eq!(err.to_string(), "Model file not found: models/skin_cnn.onnx");

        let err = ModelLoadError::LabelCountMismatch {
            model: 34,
            labels: 35,
        };
        assert_eq!(
            err.to_string(),
            "Model produces 34 classes but 35 class labels are configured"
        );
    }

    #[test]
    fn test_into_service_error() {
        let err: DermError = ClassifierError::InvalidImage("bad header".to_string()).into();
        assert!(matches!(err, DermError::InvalidImage(_)));
        assert_eq!(err.to_string(), "cannot identify image file: bad header");

        let err: DermError = ClassifierError::Inference(InferenceError::EmptyPrediction).into();
        assert!(matches!(err, DermError::Inference(_)));
        assert!(!err.is_client_error());
    }
}
