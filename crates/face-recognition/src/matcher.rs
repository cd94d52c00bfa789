//! Nearest-identity matching against a [`Facebank`]

use crate::{Facebank, RecognitionError};
use serde::Serialize;
use std::sync::Arc;
use video_faces_common::Identity;

/// Match result for the face at `position` in the input batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityMatch {
    pub position: usize,
    pub identity: Identity,
    /// Squared L2 distance to the nearest facebank embedding
    /// (`f32::INFINITY` when the facebank is empty)
    pub distance: f32,
}

/// Squared Euclidean distance between two equal-length vectors
#[must_use]
#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Resolves embeddings to identities
///
/// A face whose nearest distance is at or above `threshold` is
/// [`Identity::Unknown`].
#[derive(Debug, Clone)]
pub struct Matcher {
    facebank: Arc<Facebank>,
    threshold: f32,
}

impl Matcher {
    #[must_use]
    pub fn new(facebank: Arc<Facebank>, threshold: f32) -> Self {
        Self {
            facebank,
            threshold,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[must_use]
    pub fn facebank(&self) -> &Facebank {
        &self.facebank
    }

    /// Match a single embedding
    ///
    /// # Errors
    ///
    /// Returns [`RecognitionError::DimensionMismatch`] if the embedding length
    /// differs from the facebank's.
    pub fn match_one(&self, embedding: &[f32]) -> Result<(Identity, f32), RecognitionError> {
        if let Some(dim) = self.facebank.dim() {
            if embedding.len() != dim {
                return Err(RecognitionError::DimensionMismatch {
                    expected: dim,
                    actual: embedding.len(),
                });
            }
        }

        let nearest = self
            .facebank
            .entries()
            .iter()
            .map(|entry| (entry, squared_distance(embedding, &entry.embedding)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        Ok(match nearest {
            Some((entry, distance)) if distance < self.threshold => {
                (Identity::Known(entry.label.clone()), distance)
            }
            Some((_, distance)) => (Identity::Unknown, distance),
            None => (Identity::Unknown, f32::INFINITY),
        })
    }

    /// Match a batch; output has the same length and order as `embeddings`
    ///
    /// # Errors
    ///
    /// Fails on the first embedding with the wrong dimension.
    pub fn match_all(&self, embeddings: &[Vec<f32>]) -> Result<Vec<IdentityMatch>, RecognitionError> {
        embeddings
            .iter()
            .enumerate()
            .map(|(position, embedding)| {
                let (identity, distance) = self.match_one(embedding)?;
                Ok(IdentityMatch {
                    position,
                    identity,
                    distance,
                })
            })
            .collect()
    }
}
