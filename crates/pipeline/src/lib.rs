//! Video face identification pipeline
//!
//! Decodes a video, samples one frame per interval, detects faces, resolves
//! them against a facebank and collects a sparse map of frame index to
//! `(label, box)` pairs alongside the stream metadata.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use video_faces_pipeline::{load_models, FacePipeline, PipelineConfig};
//! use video_faces_recognition::Facebank;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (detector, embedder) = load_models(
//!     Path::new("models/version-RFB-320.onnx"),
//!     Default::default(),
//!     Path::new("models/arcface.onnx"),
//!     Default::default(),
//! )?;
//! let facebank = Arc::new(Facebank::load(Path::new("facebank.json"))?);
//!
//! let mut pipeline = FacePipeline::new(detector, embedder, facebank, PipelineConfig::default())?;
//! let output = pipeline.run_path(Path::new("interview.mp4"))?;
//! println!("{} frames with faces", output.bounding_boxes_per_frame_index.len());
//! # Ok(())
//! # }
//! ```

mod aggregate;
mod config;
mod driver;
mod error;
mod frame;
mod models;

pub use aggregate::{aggregate, LabeledBox, PipelineOutput};
pub use config::{PipelineConfig, DEFAULT_APP_NAME};
pub use driver::FacePipeline;
pub use error::{AggregateError, PipelineError};
pub use frame::{FrameResult, PairingError, RecognizedFace};
pub use models::load_models;
