//! ONNX model loading for the default detector/embedder pair

use crate::PipelineError;
use std::path::Path;
use video_faces_detection::{FaceDetectionConfig, FaceDetector};
use video_faces_recognition::{EmbedderConfig, OnnxEmbedder};

/// Load the detection and embedding models
///
/// # Errors
///
/// Returns [`PipelineError::ModelLoad`] naming the model that failed.
pub fn load_models(
    detector_path: &Path,
    detection: FaceDetectionConfig,
    embedder_path: &Path,
    embedder: EmbedderConfig,
) -> Result<(FaceDetector, OnnxEmbedder), PipelineError> {
    if detection.patch_size != embedder.patch_size {
        return Err(PipelineError::InvalidConfig(format!(
            "detector patch size {} does not match embedder input {}",
            detection.patch_size, embedder.patch_size
        )));
    }

    let detector =
        FaceDetector::new(detector_path, detection).map_err(|e| PipelineError::ModelLoad {
            stage: "detection",
            reason: e.to_string(),
        })?;
    let embedder =
        OnnxEmbedder::new(embedder_path, embedder).map_err(|e| PipelineError::ModelLoad {
            stage: "embedding",
            reason: e.to_string(),
        })?;

    Ok((detector, embedder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_size_mismatch() {
        let result = load_models(
            Path::new("det.onnx"),
            FaceDetectionConfig::default(),
            Path::new("emb.onnx"),
            EmbedderConfig {
                patch_size: 96,
                ..EmbedderConfig::default()
            },
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_detector_model() {
        let result = load_models(
            Path::new("/nonexistent/det.onnx"),
            FaceDetectionConfig::default(),
            Path::new("/nonexistent/emb.onnx"),
            EmbedderConfig::default(),
        );
        assert!(matches!(
            result,
            Err(PipelineError::ModelLoad {
                stage: "detection",
                ..
            })
        ));
    }
}
