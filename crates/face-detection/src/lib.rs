//! Face detection using an UltraFace/RetinaFace-style model via ONNX Runtime
//!
//! The [`Detector`] trait is what the pipeline driver talks to: given a frame
//! and a cap, it returns at most `max_count` [`FaceCandidate`]s ordered by
//! descending confidence, each carrying the aligned patch the embedder needs.
//! [`FaceDetector`] implements it on top of an ONNX session and never lets an
//! inference failure escape: a frame it cannot process yields no faces.
//!
//! # Example
//! ```no_run
//! use video_faces_detection::{Detector, FaceDetectionConfig, FaceDetector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut detector = FaceDetector::new("version-RFB-320.onnx", FaceDetectionConfig::default())?;
//!
//! let img = image::open("frame.jpg")?.to_rgb8();
//! for face in detector.detect(&img, 10)? {
//!     println!("{:.2} at ({:.0}, {:.0})", face.confidence, face.region.x1, face.region.y1);
//! }
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod anchors;

use image::RgbImage;
use ndarray::Array4;
use ort::{
    session::{Session, SessionOutputs},
    value::TensorRef,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};
use video_faces_common::onnx_utils::{create_optimized_session, OnnxError};
use video_faces_common::{FaceCandidate, PixelRegion};

/// UltraFace variance parameters (from reference implementation)
const CENTER_VARIANCE: f32 = 0.1;
const SIZE_VARIANCE: f32 = 0.2;

/// Configuration for face detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectionConfig {
    /// Minimum confidence threshold for face detections (0.0-1.0)
    pub confidence_threshold: f32,
    /// `IoU` threshold for non-maximum suppression (0.0-1.0)
    pub nms_threshold: f32,
    /// Model input size (width, height)
    pub input_size: (u32, u32),
    /// Faces whose shorter side is below this many source pixels are discarded
    pub min_face_size: f32,
    /// Side length of the aligned patch handed to the embedder
    pub patch_size: u32,
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            nms_threshold: 0.3,
            input_size: (320, 240), // UltraFace RFB-320 model size
            min_face_size: 16.0,
            patch_size: 112, // ArcFace input size
        }
    }
}

/// Bounding box in model-normalized coordinates (0.0-1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl NormalizedBox {
    #[must_use]
    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[must_use]
    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[must_use]
    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Calculate `IoU` (Intersection over Union) with another box
    #[must_use]
    pub fn iou(&self, other: &NormalizedBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 < x1 || y2 < y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }

        intersection / union
    }

    /// Scale to source-frame pixel coordinates
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRegion {
        let w = width as f32;
        let h = height as f32;
        PixelRegion {
            x1: self.x1 * w,
            y1: self.y1 * h,
            x2: self.x2 * w,
            y2: self.y2 * h,
        }
    }
}

/// Raw model detection before alignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    /// Detection confidence score (0.0-1.0)
    pub confidence: f32,
    /// Face bounding box (normalized coordinates)
    pub bbox: NormalizedBox,
}

/// Errors that can occur during face detection
#[derive(Error, Debug)]
pub enum FaceDetectionError {
    #[error("Failed to load ONNX model: {0}")]
    ModelLoadError(#[from] OnnxError),

    #[error("Failed to run inference: {0}")]
    InferenceError(String),

    #[error("Invalid image dimensions: {0}")]
    InvalidImageDimensions(String),

    #[error("Postprocessing failed: {0}")]
    PostprocessingError(String),
}

/// Source of face candidates for one frame
pub trait Detector {
    /// Detect at most `max_count` faces in `image`, highest confidence first.
    ///
    /// Implementations should report frames they cannot process as empty
    /// rather than failing; callers still treat `Err` as "no faces".
    fn detect(
        &mut self,
        image: &RgbImage,
        max_count: usize,
    ) -> Result<Vec<FaceCandidate>, FaceDetectionError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(
        &mut self,
        image: &RgbImage,
        max_count: usize,
    ) -> Result<Vec<FaceCandidate>, FaceDetectionError> {
        (**self).detect(image, max_count)
    }
}

/// Face detector backed by an ONNX session
pub struct FaceDetector {
    session: Session,
    config: FaceDetectionConfig,
    priors: Vec<anchors::PriorBox>,
}

impl FaceDetector {
    /// Create a new face detector from an ONNX model file
    ///
    /// # Errors
    ///
    /// Returns [`FaceDetectionError::ModelLoadError`] if the model cannot be loaded.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        config: FaceDetectionConfig,
    ) -> Result<Self, FaceDetectionError> {
        let model_path = model_path.as_ref();
        info!("Loading face detection model from {}", model_path.display());

        let session = create_optimized_session(model_path)?;

        let (input_width, input_height) = config.input_size;
        let priors = anchors::generate_priors(input_width, input_height);

        info!(
            "Face detection model loaded (input size: {}x{}, priors: {})",
            input_width,
            input_height,
            priors.len()
        );

        Ok(Self {
            session,
            config,
            priors,
        })
    }

    #[must_use]
    pub fn config(&self) -> &FaceDetectionConfig {
        &self.config
    }

    /// Run the model on `image` and return NMS-filtered faces, highest confidence first
    ///
    /// # Errors
    ///
    /// Returns an error if preprocessing, inference or output decoding fails.
    pub fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<Face>, FaceDetectionError> {
        let (orig_width, orig_height) = image.dimensions();
        if orig_width == 0 || orig_height == 0 {
            return Err(FaceDetectionError::InvalidImageDimensions(format!(
                "{orig_width}x{orig_height}"
            )));
        }

        debug!("Detecting faces in {}x{} image", orig_width, orig_height);

        let (input_width, input_height) = self.config.input_size;
        let input_array = preprocess_image(image, input_width, input_height);

        let outputs = run_inference(&mut self.session, &input_array)?;
        let faces = postprocess_outputs(&outputs, &self.config, &self.priors)?;
        let faces = non_maximum_suppression(faces, self.config.nms_threshold);

        debug!("Detected {} faces after NMS", faces.len());
        Ok(faces)
    }
}

impl Detector for FaceDetector {
    fn detect(
        &mut self,
        image: &RgbImage,
        max_count: usize,
    ) -> Result<Vec<FaceCandidate>, FaceDetectionError> {
        let faces = match self.detect_faces(image) {
            Ok(faces) => faces,
            Err(e) => {
                warn!("Face detection failed, reporting no faces: {}", e);
                return Ok(Vec::new());
            }
        };

        Ok(select_candidates(image, &faces, max_count, &self.config))
    }
}

/// Convert detector output into at most `max_count` aligned candidates
///
/// Faces are ordered by descending confidence before truncation; faces below
/// `min_face_size` or without a usable crop are dropped.
#[must_use]
pub fn select_candidates(
    image: &RgbImage,
    faces: &[Face],
    max_count: usize,
    config: &FaceDetectionConfig,
) -> Vec<FaceCandidate> {
    let (width, height) = image.dimensions();

    let mut ordered: Vec<&Face> = faces.iter().collect();
    ordered.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    ordered
        .into_iter()
        .filter_map(|face| {
            let region = face.bbox.to_pixels(width, height);
            if region.width().min(region.height()) < config.min_face_size {
                return None;
            }
            let patch = align::align_face(image, &region, config.patch_size)?;
            Some(FaceCandidate {
                confidence: face.confidence,
                region,
                patch,
            })
        })
        .take(max_count)
        .collect()
}

/// Resize to model input and convert to normalized NCHW: (pixel - 127) / 128
fn preprocess_image(image: &RgbImage, input_width: u32, input_height: u32) -> Array4<f32> {
    let resized = image::imageops::resize(
        image,
        input_width,
        input_height,
        image::imageops::FilterType::Triangle,
    );

    let mut input = Array4::<f32>::zeros((1, 3, input_height as usize, input_width as usize));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        input[[0, 0, y, x]] = (f32::from(pixel[0]) - 127.0) / 128.0;
        input[[0, 1, y, x]] = (f32::from(pixel[1]) - 127.0) / 128.0;
        input[[0, 2, y, x]] = (f32::from(pixel[2]) - 127.0) / 128.0;
    }

    input
}

fn run_inference<'a>(
    session: &'a mut Session,
    input: &Array4<f32>,
) -> Result<SessionOutputs<'a>, FaceDetectionError> {
    let input_tensor = TensorRef::from_array_view(input.view())
        .map_err(|e| FaceDetectionError::InferenceError(e.to_string()))?;

    session
        .run(ort::inputs![input_tensor])
        .map_err(|e| FaceDetectionError::InferenceError(e.to_string()))
}

/// Decode model outputs into faces above the confidence threshold
///
/// Model outputs:
/// - scores: [1, N, 2] - N anchors with [`background_logit`, `face_logit`]
/// - boxes: [1, N, 4] - N location regressions relative to the priors
fn postprocess_outputs(
    outputs: &SessionOutputs,
    config: &FaceDetectionConfig,
    priors: &[anchors::PriorBox],
) -> Result<Vec<Face>, FaceDetectionError> {
    let scores_value = outputs
        .get("confidences")
        .or_else(|| outputs.get("scores"))
        .ok_or_else(|| {
            FaceDetectionError::PostprocessingError("confidences/scores output not found".into())
        })?;

    let (scores_shape, scores_data) = scores_value.try_extract_tensor::<f32>().map_err(|e| {
        FaceDetectionError::PostprocessingError(format!("Failed to extract scores: {e}"))
    })?;

    let boxes_value = outputs
        .get("boxes")
        .ok_or_else(|| FaceDetectionError::PostprocessingError("boxes output not found".into()))?;

    let (boxes_shape, boxes_data) = boxes_value.try_extract_tensor::<f32>().map_err(|e| {
        FaceDetectionError::PostprocessingError(format!("Failed to extract boxes: {e}"))
    })?;

    if scores_shape.len() != 3 || boxes_shape.len() != 3 {
        return Err(FaceDetectionError::PostprocessingError(format!(
            "Invalid output shapes: scores={scores_shape:?}, boxes={boxes_shape:?}"
        )));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_boxes = scores_shape[1] as usize;

    if boxes_shape[1] != scores_shape[1]
        || priors.len() != num_boxes
        || scores_data.len() < num_boxes * 2
        || boxes_data.len() < num_boxes * 4
    {
        return Err(FaceDetectionError::PostprocessingError(format!(
            "Output/prior mismatch: scores={scores_shape:?}, boxes={boxes_shape:?}, priors={}",
            priors.len()
        )));
    }

    Ok(decode_faces(scores_data, boxes_data, priors, config))
}

/// Softmax the face logits, decode boxes against priors and keep confident, valid boxes
fn decode_faces(
    scores: &[f32],
    locations: &[f32],
    priors: &[anchors::PriorBox],
    config: &FaceDetectionConfig,
) -> Vec<Face> {
    let decoded = anchors::decode_boxes(locations, priors, CENTER_VARIANCE, SIZE_VARIANCE);

    decoded
        .iter()
        .zip(scores.chunks_exact(2))
        .filter_map(|(bbox, logits)| {
            // Layout per anchor: [background, face]
            let exp_bg = logits[0].exp();
            let exp_face = logits[1].exp();
            let confidence = exp_face / (exp_bg + exp_face);

            if !(confidence >= config.confidence_threshold) {
                return None;
            }

            let bbox = NormalizedBox {
                x1: bbox[0].clamp(0.0, 1.0),
                y1: bbox[1].clamp(0.0, 1.0),
                x2: bbox[2].clamp(0.0, 1.0),
                y2: bbox[3].clamp(0.0, 1.0),
            };

            if bbox.x2 <= bbox.x1 || bbox.y2 <= bbox.y1 {
                return None;
            }

            Some(Face { confidence, bbox })
        })
        .collect()
}

/// Greedy NMS; output is sorted by descending confidence
fn non_maximum_suppression(mut faces: Vec<Face>, nms_threshold: f32) -> Vec<Face> {
    if faces.is_empty() {
        return faces;
    }

    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Face> = Vec::with_capacity(faces.len().min(32));
    for face in faces {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&face.bbox) <= nms_threshold)
        {
            keep.push(face);
        }
    }

    keep
}
