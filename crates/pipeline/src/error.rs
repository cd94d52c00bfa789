//! Error types for a pipeline run

use std::path::PathBuf;
use thiserror::Error;
use video_faces_decoder::DecodeError;
use video_faces_recognition::{FacebankError, RecognitionError};

/// Fatal errors; any of these aborts the whole video
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to open video {path}: {source}")]
    VideoOpen {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("Video {path} reports unusable frame rate {fps}")]
    InvalidFrameRate { path: PathBuf, fps: f64 },

    #[error("Detector/matcher disagreement in {path} at frame {frame}: {detail}")]
    Consistency {
        path: PathBuf,
        frame: u64,
        detail: String,
    },

    #[error("Recognition failed in {path} at frame {frame}: {source}")]
    Recognition {
        path: PathBuf,
        frame: u64,
        #[source]
        source: RecognitionError,
    },

    #[error("Facebank error: {0}")]
    Facebank(#[from] FacebankError),

    #[error("Failed to load {stage} model: {reason}")]
    ModelLoad { stage: &'static str, reason: String },

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to assemble output for {path}: {source}")]
    Aggregate {
        path: PathBuf,
        #[source]
        source: AggregateError,
    },
}

/// Frame results that cannot form a valid output record
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AggregateError {
    #[error("Frame index {index} does not follow {previous}")]
    NonIncreasingIndex { previous: u64, index: u64 },

    #[error("Frame index {index} is beyond last frame {last_frame}")]
    BeyondLastFrame { index: u64, last_frame: u64 },
}
