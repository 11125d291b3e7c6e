//! ONNX Runtime session creation
//!
//! Sessions are created with full graph optimizations, physical-core intra-op
//! parallelism and the CUDA execution provider when available, falling back to CPU.

use crate::ModelLoadError;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Number of intra-op threads
///
/// `DERMAI_THREADS` overrides the physical core count (useful in tests to avoid
/// thread contention).
fn intra_threads() -> usize {
    std::env::var("DERMAI_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(num_cpus::get_physical)
}

fn session_error(model_path: &Path, error: impl std::fmt::Display) -> ModelLoadError {
    ModelLoadError::Session {
        path: model_path.display().to_string(),
        error: error.to_string(),
    }
}

/// Create an optimized ONNX Runtime session
///
/// Tries CUDA then CPU. If session creation fails with a CUDA-specific error
/// the model is loaded again with the CPU provider only.
///
/// # Errors
/// Returns `ModelLoadError::NotFound` if the file does not exist and
/// `ModelLoadError::Session` if ONNX Runtime rejects the model.
pub fn create_optimized_session(model_path: &Path) -> Result<Session, ModelLoadError> {
    if !model_path.exists() {
        return Err(ModelLoadError::NotFound(model_path.display().to_string()));
    }

    let num_threads = intra_threads();
    let start = Instant::now();

    let session = Session::builder()
        .map_err(|e| session_error(model_path, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| session_error(model_path, e))?
        .with_intra_threads(num_threads)
        .map_err(|e| session_error(model_path, e))?
        .with_memory_pattern(true)
        .map_err(|e| session_error(model_path, e))?
        .with_execution_providers([
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| session_error(model_path, e))?
        .commit_from_file(model_path);

    match session {
        Ok(s) => {
            debug!(
                "Session created for {} in {:.3}s ({} intra-op threads)",
                model_path.display(),
                start.elapsed().as_secs_f64(),
                num_threads
            );
            Ok(s)
        }
        Err(e) => {
            let error_msg = e.to_string();
            if error_msg.contains("CUDA") {
                warn!(
                    "CUDA session creation failed for {}, retrying on CPU: {}",
                    model_path.display(),
                    error_msg
                );
                create_cpu_only_session(model_path)
            } else {
                Err(session_error(model_path, error_msg))
            }
        }
    }
}

/// Create an ONNX Runtime session with CPU-only execution
///
/// # Errors
/// Same as [`create_optimized_session`]
pub fn create_cpu_only_session(model_path: &Path) -> Result<Session, ModelLoadError> {
    if !model_path.exists() {
        return Err(ModelLoadError::NotFound(model_path.display().to_string()));
    }

    Session::builder()
        .map_err(|e| session_error(model_path, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| session_error(model_path, e))?
        .with_intra_threads(intra_threads())
        .map_err(|e| session_error(model_path, e))?
        .with_memory_pattern(true)
        .map_err(|e| session_error(model_path, e))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|e| session_error(model_path, e))?
        .commit_from_file(model_path)
        .map_err(|e| session_error(model_path, e))
}
