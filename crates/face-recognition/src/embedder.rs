//! Face embedding
//!
//! [`OnnxEmbedder`] runs an ArcFace-style model: 112x112 RGB patches,
//! normalized to `(p - 127.5) / 127.5`, producing one L2-normalized vector
//! per patch. With test-time augmentation enabled each patch is also
//! embedded mirrored; both vectors are normalized, summed and normalized again.

use crate::RecognitionError;
use image::{imageops, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::TensorRef};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use video_faces_common::onnx_utils::create_optimized_session;

const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5;

/// Produces one embedding per face patch, in input order
pub trait Embedder {
    /// # Errors
    ///
    /// Returns an error if inference fails or produces malformed output.
    fn embed(&mut self, patches: &[RgbImage]) -> Result<Vec<Vec<f32>>, RecognitionError>;

    /// Length of the vectors [`embed`](Self::embed) returns, when known up front
    fn embedding_dim(&self) -> Option<usize> {
        None
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed(&mut self, patches: &[RgbImage]) -> Result<Vec<Vec<f32>>, RecognitionError> {
        (**self).embed(patches)
    }

    fn embedding_dim(&self) -> Option<usize> {
        (**self).embedding_dim()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Square input size expected by the model
    pub patch_size: u32,
    /// Length of the output vector
    pub embedding_dim: usize,
    /// Embed mirrored patches too and combine
    pub tta: bool,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            patch_size: 112,
            embedding_dim: 512,
            tta: false,
        }
    }
}

pub struct OnnxEmbedder {
    session: Session,
    config: EmbedderConfig,
}

impl OnnxEmbedder {
    /// Load an embedding model
    ///
    /// # Errors
    ///
    /// Returns [`RecognitionError::ModelLoad`] if the session cannot be created.
    pub fn new<P: AsRef<Path>>(model_path: P, config: EmbedderConfig) -> Result<Self, RecognitionError> {
        let model_path = model_path.as_ref();
        info!("Loading face embedding model from {}", model_path.display());

        let session = create_optimized_session(model_path)?;

        info!(
            "Face embedding model loaded (patch {}x{}, dim {}, tta {})",
            config.patch_size, config.patch_size, config.embedding_dim, config.tta
        );

        Ok(Self { session, config })
    }

    #[must_use]
    pub fn config(&self) -> &EmbedderConfig {
        &self.config
    }

    fn infer(&mut self, input: &Array4<f32>, batch: usize) -> Result<Vec<Vec<f32>>, RecognitionError> {
        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| RecognitionError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| RecognitionError::Inference(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognitionError::InvalidOutput(format!("Failed to extract embeddings: {e}")))?;

        let dim = self.config.embedding_dim;
        if dim == 0 || data.len() != batch * dim {
            return Err(RecognitionError::InvalidOutput(format!(
                "Expected {batch}x{dim} embeddings, got shape {shape:?}"
            )));
        }

        Ok(data.chunks_exact(dim).map(<[f32]>::to_vec).collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&mut self, patches: &[RgbImage]) -> Result<Vec<Vec<f32>>, RecognitionError> {
        if patches.is_empty() {
            return Ok(Vec::new());
        }

        let size = self.config.patch_size;
        let mut batch: Vec<RgbImage> = patches.iter().map(|p| fit_patch(p, size)).collect();
        if self.config.tta {
            let mirrored: Vec<RgbImage> = batch.iter().map(imageops::flip_horizontal).collect();
            batch.extend(mirrored);
        }

        debug!("Embedding {} face patches ({} inputs)", patches.len(), batch.len());

        let input = preprocess_patches(&batch, size);
        let raw = self.infer(&input, batch.len())?;

        let embeddings = combine_embeddings(raw, patches.len(), self.config.tta);

        Ok(embeddings)
    }

    fn embedding_dim(&self) -> Option<usize> {
        Some(self.config.embedding_dim)
    }
}

/// Normalize raw model outputs into one embedding per patch
///
/// With `tta`, `raw` holds the `n` original outputs followed by the `n`
/// mirrored ones. Each half is normalized before summing so neither view
/// dominates by magnitude.
fn combine_embeddings(raw: Vec<Vec<f32>>, n: usize, tta: bool) -> Vec<Vec<f32>> {
    let mut raw: Vec<Vec<f32>> = raw
        .into_iter()
        .map(|mut v| {
            l2_normalize(&mut v);
            v
        })
        .collect();
    if !tta {
        return raw;
    }

    let mirrored = raw.split_off(n);
    raw.into_iter()
        .zip(mirrored)
        .map(|(a, b)| {
            let mut sum: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
            l2_normalize(&mut sum);
            sum
        })
        .collect()
}

fn fit_patch(patch: &RgbImage, size: u32) -> RgbImage {
    if patch.dimensions() == (size, size) {
        patch.clone()
    } else {
        imageops::resize(patch, size, size, imageops::FilterType::Triangle)
    }
}

/// Stack patches into an NCHW tensor normalized to [-1, 1]
fn preprocess_patches(patches: &[RgbImage], size: u32) -> Array4<f32> {
    let side = size as usize;
    let mut input = Array4::<f32>::zeros((patches.len(), 3, side, side));

    for (n, patch) in patches.iter().enumerate() {
        for (x, y, pixel) in patch.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                input[[n, c, y, x]] = (f32::from(pixel[c]) - PIXEL_MEAN) / PIXEL_STD;
            }
        }
    }

    input
}

/// Scale `v` to unit length in place; zero vectors are left untouched
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
