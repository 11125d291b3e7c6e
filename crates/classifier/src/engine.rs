//! Inference engine
//!
//! [`InferenceService`] owns the class labels, the display-name map and a
//! single-initialization slot for the model. It is constructed once at startup
//! and shared through application state.
//!
//! # Lifecycle
//! - `new`/`from_config` builds the service without touching the model file
//! - the first `load()` (explicit at startup, or implicit on the first
//!   prediction) runs the loader exactly once, even under concurrent callers
//! - the outcome is cached: a loaded model is reused for the life of the
//!   process, and a failed load keeps returning the same `ModelLoadError`
//! - `is_ready()` reports whether a model is loaded

use crate::labels::{ClassLabels, LabelMap};
use crate::onnx_utils::create_optimized_session;
use crate::preprocess::{normalize, InputTensor, INPUT_CHANNELS, INPUT_HEIGHT, INPUT_WIDTH};
use crate::ranking::{rank, PredictionResult};
use crate::{ClassifierError, InferenceError, ModelLoadError};
use dermai_common::{NormalizationScheme, ServiceConfig};
use once_cell::sync::OnceCell;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info};

/// Expected input tensor shape
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_HEIGHT, INPUT_WIDTH, INPUT_CHANNELS];

/// Per-class scores in model output order
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionVector(Vec<f32>);

impl PredictionVector {
    #[must_use]
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for PredictionVector {
    fn from(scores: Vec<f32>) -> Self {
        Self(scores)
    }
}

/// A loaded classifier that turns an input tensor into class scores
///
/// Implementations must be deterministic for a fixed input.
pub trait Scorer: Send + Sync {
    /// Declared input dimensions; negative entries are dynamic
    fn input_dims(&self) -> Vec<i64> {
        INPUT_SHAPE.iter().map(|&d| d as i64).collect()
    }

    /// Number of classes, if the model declares it statically
    fn num_classes(&self) -> Option<usize>;

    /// Score a single-image batch
    fn score(&self, input: &InputTensor) -> Result<PredictionVector, InferenceError>;
}

/// ONNX Runtime backed scorer
pub struct OnnxScorer {
    /// `Session::run` requires `&mut self`; the lock covers execution only
    session: Mutex<Session>,
    input_name: String,
    input_dims: Vec<i64>,
    num_classes: Option<usize>,
}

impl OnnxScorer {
    /// Load an ONNX model from disk
    ///
    /// # Errors
    /// Returns error if the file is missing, corrupt, or declares no inputs/outputs
    pub fn load(model_path: &Path) -> Result<Self, ModelLoadError> {
        let session = create_optimized_session(model_path)?;
        let invalid = |error: &str| ModelLoadError::Session {
            path: model_path.display().to_string(),
            error: error.to_string(),
        };

        let input = session
            .inputs
            .first()
            .ok_or_else(|| invalid("model has no inputs"))?;
        let input_name = input.name.clone();
        let input_dims = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
            _ => return Err(invalid("model input is not a tensor")),
        };

        let output = session
            .outputs
            .first()
            .ok_or_else(|| invalid("model has no outputs"))?;
        let num_classes = match &output.output_type {
            ValueType::Tensor { shape, .. } => shape
                .iter()
                .last()
                .copied()
                .filter(|&d| d > 0)
                .map(|d| d as usize),
            _ => return Err(invalid("model output is not a tensor")),
        };

        debug!(
            "Model input '{}' dims {:?}, classes {:?}",
            input_name, input_dims, num_classes
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_dims,
            num_classes,
        })
    }
}

impl Scorer for OnnxScorer {
    fn input_dims(&self) -> Vec<i64> {
        self.input_dims.clone()
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    fn score(&self, input: &InputTensor) -> Result<PredictionVector, InferenceError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Runtime(format!("Failed to lock session mutex: {e}")))?;

        let input_tensor = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs![&*self.input_name => input_tensor])?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        Ok(PredictionVector::new(data.to_vec()))
    }
}

type ScorerLoader = Box<dyn Fn() -> Result<Arc<dyn Scorer>, ModelLoadError> + Send + Sync>;

/// Classification service holding the lazily loaded model
pub struct InferenceService {
    labels: ClassLabels,
    label_map: LabelMap,
    normalization: NormalizationScheme,
    loader: ScorerLoader,
    model: OnceCell<Result<Arc<dyn Scorer>, ModelLoadError>>,
}

impl InferenceService {
    /// Create a service that loads its model with `loader` on first use
    pub fn new<F>(
        labels: ClassLabels,
        label_map: LabelMap,
        normalization: NormalizationScheme,
        loader: F,
    ) -> Self
    where
        F: Fn() -> Result<Arc<dyn Scorer>, ModelLoadError> + Send + Sync + 'static,
    {
        Self {
            labels,
            label_map,
            normalization,
            loader: Box::new(loader),
            model: OnceCell::new(),
        }
    }

    /// Create a service around an already loaded scorer
    pub fn with_scorer(
        labels: ClassLabels,
        label_map: LabelMap,
        normalization: NormalizationScheme,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        let slot = Arc::clone(&scorer);
        Self::new(labels, label_map, normalization, move || {
            Ok(Arc::clone(&slot))
        })
    }

    /// Create a service backed by the ONNX model named in `config`
    ///
    /// Reads the label files immediately; the model itself is loaded by `load()`.
    ///
    /// # Errors
    /// Returns error if the label list or display-name overrides cannot be read
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ModelLoadError> {
        let labels = ClassLabels::from_json_file(&config.labels_path)?;
        let mut label_map = LabelMap::builtin();
        if let Some(path) = &config.display_names_path {
            label_map = label_map.with_overrides_file(path)?;
        }
        info!(
            "Loaded {} class labels from {}",
            labels.len(),
            config.labels_path.display()
        );

        let model_path: PathBuf = config.model_path.clone();
        Ok(Self::new(labels, label_map, config.normalization, move || {
            let scorer = OnnxScorer::load(&model_path)?;
            Ok(Arc::new(scorer) as Arc<dyn Scorer>)
        }))
    }

    /// Load the model if it has not been loaded yet
    ///
    /// # Errors
    /// Returns the (cached) `ModelLoadError` if loading failed
    pub fn load(&self) -> Result<Arc<dyn Scorer>, ModelLoadError> {
        self.model
            .get_or_init(|| {
                let start = Instant::now();
                info!("Loading skin classification model (first use only)");
                let result = (self.loader)().and_then(|scorer| {
                    match scorer.num_classes() {
                        Some(n) if n != self.labels.len() => {
                            Err(ModelLoadError::LabelCountMismatch {
                                model: n,
                                labels: self.labels.len(),
                            })
                        }
                        _ => Ok(scorer),
                    }
                });
                match &result {
                    Ok(_) => info!(
                        "Model loaded successfully in {:.3}s",
                        start.elapsed().as_secs_f64()
                    ),
                    Err(e) => error!("Model load failed: {}", e),
                }
                result
            })
            .clone()
    }

    /// Whether a model is loaded and ready to serve
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.model.get(), Some(Ok(_)))
    }

    /// Score a normalized tensor
    ///
    /// # Errors
    /// Returns error if the model cannot be loaded, the tensor shape does not
    /// match the model input, or the output length differs from the label count
    pub fn score(&self, input: &InputTensor) -> Result<PredictionVector, ClassifierError> {
        let scorer = self.load()?;

        let expected = scorer.input_dims();
        if !shape_matches(&expected, input.shape()) {
            return Err(InferenceError::ShapeMismatch {
                expected,
                actual: input.shape().to_vec(),
            }
            .into());
        }

        let vector = scorer.score(input)?;
        if vector.len() != self.labels.len() {
            return Err(InferenceError::OutputLength {
                expected: self.labels.len(),
                actual: vector.len(),
            }
            .into());
        }

        Ok(vector)
    }

    /// Full pipeline: decode, normalize, score and rank
    ///
    /// # Errors
    /// Returns `InvalidImage` for undecodable bytes, otherwise model load or inference errors
    pub fn predict(&self, image_bytes: &[u8]) -> Result<PredictionResult, ClassifierError> {
        let start = Instant::now();
        let input = normalize(image_bytes, self.normalization)?;
        let vector = self.score(&input)?;
        let result = rank(&vector, &self.labels, &self.label_map)?;

        debug!(
            "Prediction: {} ({:.3}) in {:.1}ms",
            result.disease,
            result.confidence,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    #[must_use]
    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    #[must_use]
    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }
}

fn shape_matches(expected: &[i64], actual: &[usize]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(&e, &a)| e < 0 || e as usize == a)
}
