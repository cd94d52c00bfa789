//! Common types shared by the decode, detection, recognition and pipeline crates

pub mod onnx_utils;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used for faces that do not match any facebank identity
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Stream metadata as reported by the decode backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Average frame rate (frames/second)
    pub fps: f64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Total frame count reported by the container (best-effort, 0 when unknown)
    pub frame_count: u64,
}

impl VideoInfo {
    /// Frame rate rounded to the nearest whole frame, the unit of the sampling cadence
    ///
    /// Halves round to even: 12.5 fps samples every 12 frames, 13.5 every 14.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rounded_fps(&self) -> u64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps.round_ties_even() as u64
        } else {
            0
        }
    }
}

/// Decoded RGB frame with its zero-based position in the stream
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

/// Face region in source-frame pixel coordinates, as produced by a detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl PixelRegion {
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

    /// True when all coordinates are finite and the region has positive extent
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }

    /// Truncate to integer pixels, then grow the box by `adjustment` on every side.
    ///
    /// The adjusted box may fall one pixel outside the frame; it is reported as-is.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bounding_box(&self, adjustment: i32) -> BoundingBox {
        BoundingBox {
            x1: self.x1 as i32 - adjustment,
            y1: self.y1 as i32 - adjustment,
            x2: self.x2 as i32 + adjustment,
            y2: self.y2 as i32 + adjustment,
        }
    }
}

/// Integer face box in source-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    #[must_use]
    pub fn to_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Corners in top-left, top-right, bottom-left, bottom-right order
    #[must_use]
    pub fn corners(&self) -> [[i32; 2]; 4] {
        [
            [self.x1, self.y1],
            [self.x2, self.y1],
            [self.x1, self.y2],
            [self.x2, self.y2],
        ]
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self {
            x1: v[0],
            y1: v[1],
            x2: v[2],
            y2: v[3],
        }
    }
}

/// Detected face: source region, detection confidence and the aligned patch fed to the embedder
#[derive(Debug, Clone)]
pub struct FaceCandidate {
    pub confidence: f32,
    pub region: PixelRegion,
    pub patch: RgbImage,
}

/// Resolved identity of a face
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Identity::Known(name) => name,
            Identity::Unknown => UNKNOWN_LABEL,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for Identity {
    fn from(label: String) -> Self {
        if label == UNKNOWN_LABEL {
            Identity::Unknown
        } else {
            Identity::Known(label)
        }
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        match identity {
            Identity::Known(name) => name,
            Identity::Unknown => UNKNOWN_LABEL.to_string(),
        }
    }
}
