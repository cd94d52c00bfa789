//! Final output record

use crate::{AggregateError, FrameResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use video_faces_common::{BoundingBox, VideoInfo};

/// `(label, [x1, y1, x2, y2])`, serialized as a two-element array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledBox(pub String, pub [i32; 4]);

impl LabeledBox {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from(self.1)
    }
}

/// Everything a run produces for one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub app_name: String,
    pub video_name: String,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    /// Index of the last sampled frame (0 if nothing was sampled)
    pub last_frame: u64,
    /// Only frames with at least one face appear, in ascending order
    pub bounding_boxes_per_frame_index: BTreeMap<u64, Vec<LabeledBox>>,
}

impl PipelineOutput {
    /// Number of faces across all frames
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.bounding_boxes_per_frame_index.values().map(Vec::len).sum()
    }
}

/// Assemble frame results and stream metadata into a [`PipelineOutput`]
///
/// Frames without faces are dropped. Indices must be strictly increasing and
/// not exceed `last_frame`.
///
/// # Errors
///
/// Returns an [`AggregateError`] describing the first offending index.
pub fn aggregate(
    app_name: &str,
    video_name: &str,
    info: &VideoInfo,
    last_frame: u64,
    frames: Vec<FrameResult>,
) -> Result<PipelineOutput, AggregateError> {
    let mut previous: Option<u64> = None;
    let mut map = BTreeMap::new();

    for frame in frames {
        if let Some(previous) = previous {
            if frame.index <= previous {
                return Err(AggregateError::NonIncreasingIndex {
                    previous,
                    index: frame.index,
                });
            }
        }
        if frame.index > last_frame {
            return Err(AggregateError::BeyondLastFrame {
                index: frame.index,
                last_frame,
            });
        }
        previous = Some(frame.index);

        if frame.faces.is_empty() {
            continue;
        }

        let boxes = frame
            .faces
            .into_iter()
            .map(|face| LabeledBox(face.identity.into(), face.bbox.to_array()))
            .collect();
        map.insert(frame.index, boxes);
    }

    Ok(PipelineOutput {
        app_name: app_name.to_string(),
        video_name: video_name.to_string(),
        fps: info.fps,
        width: info.width,
        height: info.height,
        frame_count: info.frame_count,
        last_frame,
        bounding_boxes_per_frame_index: map,
    })
}
