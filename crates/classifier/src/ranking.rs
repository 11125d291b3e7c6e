//! Top-k ranking and response building

use crate::engine::PredictionVector;
use crate::labels::{ClassLabels, LabelMap};
use crate::InferenceError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Number of ranked alternatives returned with each prediction
pub const TOP_K: usize = 3;

/// A ranked class with its display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedClass {
    pub disease: String,
    pub confidence: f32,
}

/// Prediction payload returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Display name of the highest-scoring class
    pub disease: String,
    /// Raw model score of that class
    pub confidence: f32,
    /// Three highest-scoring classes, best first
    pub top3: Vec<RankedClass>,
}

/// NaN never outranks a real score
fn sort_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

/// Indices of the `k` highest scores, descending; equal scores keep index order
#[must_use]
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| {
        sort_key(scores[b])
            .partial_cmp(&sort_key(scores[a]))
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    indices.truncate(k);
    indices
}

/// Build the prediction payload from a score vector
///
/// Scores are reported as produced by the model, without renormalization.
/// Two raw classes sharing a display name may both appear in `top3`.
///
/// # Errors
/// Returns error if the vector is empty or its length differs from the label count
pub fn rank(
    vector: &PredictionVector,
    labels: &ClassLabels,
    label_map: &LabelMap,
) -> Result<PredictionResult, InferenceError> {
    if vector.is_empty() {
        return Err(InferenceError::EmptyPrediction);
    }
    if vector.len() != labels.len() {
        return Err(InferenceError::OutputLength {
            expected: labels.len(),
            actual: vector.len(),
        });
    }

    let scores = vector.as_slice();
    let ranked: Vec<RankedClass> = top_k(scores, TOP_K)
        .into_iter()
        .filter_map(|idx| {
            labels.get(idx).map(|raw| RankedClass {
                disease: label_map.display_name(raw).to_string(),
                confidence: scores[idx],
            })
        })
        .collect();

    let best = ranked.first().cloned().ok_or(InferenceError::EmptyPrediction)?;

    Ok(PredictionResult {
        disease: best.disease,
        confidence: best.confidence,
        top3: ranked,
    })
}
