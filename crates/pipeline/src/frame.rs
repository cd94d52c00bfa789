//! Per-frame results: detections joined with their identity matches

use thiserror::Error;
use video_faces_common::{BoundingBox, FaceCandidate, Identity};
use video_faces_recognition::IdentityMatch;

/// Detector and matcher output that cannot be joined position by position
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PairingError {
    #[error("{candidates} detections but {matches} identity matches")]
    Length { candidates: usize, matches: usize },

    #[error("match at slot {slot} belongs to position {position}")]
    Position { slot: usize, position: usize },
}

/// A detected face resolved to an identity
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedFace {
    pub identity: Identity,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub distance: f32,
}

impl RecognizedFace {
    /// Join detections with their matches, applying `box_adjustment` to each region
    ///
    /// # Errors
    ///
    /// Fails if the two sequences differ in length or a match is out of place.
    pub fn pair(
        candidates: &[FaceCandidate],
        matches: Vec<IdentityMatch>,
        box_adjustment: i32,
    ) -> Result<Vec<Self>, PairingError> {
        if candidates.len() != matches.len() {
            return Err(PairingError::Length {
                candidates: candidates.len(),
                matches: matches.len(),
            });
        }

        candidates
            .iter()
            .zip(matches)
            .enumerate()
            .map(|(slot, (candidate, matched))| {
                if matched.position != slot {
                    return Err(PairingError::Position {
                        slot,
                        position: matched.position,
                    });
                }
                Ok(Self {
                    identity: matched.identity,
                    bbox: candidate.region.to_bounding_box(box_adjustment),
                    confidence: candidate.confidence,
                    distance: matched.distance,
                })
            })
            .collect()
    }
}

/// Faces found on one sampled frame, in detection order
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub index: u64,
    pub faces: Vec<RecognizedFace>,
}
