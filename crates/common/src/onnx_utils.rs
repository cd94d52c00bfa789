//! ONNX Runtime utilities for model loading
//!
//! Both the face detector and the face embedder load their models through
//! [`create_optimized_session`], so thread count and execution-provider
//! fallback behave the same for every model in a run.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable overriding the intra-op thread count
pub const THREADS_ENV: &str = "VIDEO_FACES_THREADS";

/// Error type for ONNX operations
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}

/// Intra-op thread count: `VIDEO_FACES_THREADS` when set, physical cores otherwise
#[must_use]
pub fn intra_threads() -> usize {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(num_cpus::get_physical)
}

/// Create an ONNX Runtime session with graph optimizations enabled
///
/// Execution providers are tried in order CoreML, CUDA, CPU. If CoreML rejects
/// the model the session is rebuilt with CUDA/CPU only.
///
/// # Errors
///
/// Returns [`OnnxError::ModelNotFound`] when the file does not exist and
/// [`OnnxError::ModelLoadError`] when no execution provider can load it.
pub fn create_optimized_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let threads = intra_threads();
    debug!(
        "Creating ONNX session for {} with {} intra-op threads",
        model_path.display(),
        threads
    );

    let session = match build_session(model_path, threads, true) {
        Ok(session) => session,
        Err(SessionFailure::Builder(reason)) => return Err(OnnxError::SessionBuilderError(reason)),
        Err(SessionFailure::Load(reason)) if is_coreml_failure(&reason) => {
            warn!(
                "CoreML rejected {}: {}; retrying with CUDA/CPU only",
                model_path.display(),
                reason
            );
            build_session(model_path, threads, false).map_err(|failure| match failure {
                SessionFailure::Builder(reason) => OnnxError::SessionBuilderError(reason),
                SessionFailure::Load(reason) => OnnxError::ModelLoadError {
                    path: model_path.display().to_string(),
                    error: format!("CoreML failed, CPU/CUDA also failed: {reason}"),
                },
            })?
        }
        Err(SessionFailure::Load(reason)) => {
            return Err(OnnxError::ModelLoadError {
                path: model_path.display().to_string(),
                error: reason,
            })
        }
    };

    info!("Loaded ONNX model {}", model_path.display());
    Ok(session)
}

enum SessionFailure {
    Builder(String),
    Load(String),
}

fn is_coreml_failure(reason: &str) -> bool {
    reason.contains("CoreML") || reason.contains("MLModel")
}

fn build_session(model_path: &Path, threads: usize, coreml: bool) -> Result<Session, SessionFailure> {
    fn builder_err<E: std::fmt::Display>(e: E) -> SessionFailure {
        SessionFailure::Builder(e.to_string())
    }

    let mut providers = Vec::with_capacity(3);
    if coreml {
        providers.push(CoreMLExecutionProvider::default().build());
    }
    providers.push(CUDAExecutionProvider::default().build());
    providers.push(CPUExecutionProvider::default().build());

    Session::builder()
        .map_err(builder_err)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(builder_err)?
        .with_intra_threads(threads)
        .map_err(builder_err)?
        .with_execution_providers(providers)
        .map_err(builder_err)?
        .commit_from_file(model_path)
        .map_err(|e| SessionFailure::Load(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found() {
        let result = create_optimized_session(Path::new("nonexistent_model.onnx"));
        assert!(matches!(result, Err(OnnxError::ModelNotFound(_))));
    }

    #[test]
    fn test_error_display() {
        let err = OnnxError::ModelNotFound("arcface.onnx".to_string());
        assert_eq!(err.to_string(), "Model file not found: arcface.onnx");

        let err = OnnxError::ModelLoadError {
            path: "arcface.onnx".to_string(),
            error: "invalid format".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load ONNX model from arcface.onnx: invalid format"
        );
    }

    #[test]
    fn test_coreml_failure_detection() {
        assert!(is_coreml_failure("CoreML EP failed to compile model"));
        assert!(is_coreml_failure("Error compiling MLModel"));
        assert!(!is_coreml_failure("Protobuf parsing failed"));
    }

    #[test]
    fn test_intra_threads_positive() {
        assert!(intra_threads() > 0);
    }
}
