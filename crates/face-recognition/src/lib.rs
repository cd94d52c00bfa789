//! Face recognition: embedding, facebank and nearest-identity matching
//!
//! [`FaceRecognizer`] composes an [`Embedder`] with a [`Matcher`]: a batch of
//! aligned patches goes in, one [`IdentityMatch`] per patch comes out, in the
//! same order and tagged with its input position.

pub mod embedder;
pub mod facebank;
pub mod matcher;

pub use embedder::{l2_normalize, Embedder, EmbedderConfig, OnnxEmbedder};
pub use facebank::{Facebank, FacebankEntry, FacebankError, IdentityRecord, IdentitySummary};
pub use matcher::{squared_distance, IdentityMatch, Matcher};

use image::RgbImage;
use thiserror::Error;
use tracing::debug;
use video_faces_common::onnx_utils::OnnxError;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Failed to load embedding model: {0}")]
    ModelLoad(#[from] OnnxError),

    #[error("Embedding inference failed: {0}")]
    Inference(String),

    #[error("Invalid embedding output: {0}")]
    InvalidOutput(String),

    #[error("Embedder returned {actual} embeddings for {expected} patches")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Embedding dimension {actual} does not match facebank dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Embeds face patches and resolves them against a facebank
pub struct FaceRecognizer<E> {
    embedder: E,
    matcher: Matcher,
}

impl<E: Embedder> FaceRecognizer<E> {
    pub fn new(embedder: E, matcher: Matcher) -> Self {
        Self { embedder, matcher }
    }

    #[must_use]
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Identify every patch; the result is parallel to `patches`
    ///
    /// # Errors
    ///
    /// Returns [`RecognitionError::CountMismatch`] if the embedder does not
    /// return exactly one vector per patch, or any embedder/matcher error.
    pub fn identify(&mut self, patches: &[RgbImage]) -> Result<Vec<IdentityMatch>, RecognitionError> {
        if patches.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.embedder.embed(patches)?;
        if embeddings.len() != patches.len() {
            return Err(RecognitionError::CountMismatch {
                expected: patches.len(),
                actual: embeddings.len(),
            });
        }

        let matches = self.matcher.match_all(&embeddings)?;
        debug!(
            "Identified {} faces ({} known)",
            matches.len(),
            matches.iter().filter(|m| m.identity.is_known()).count()
        );
        Ok(matches)
    }
}
