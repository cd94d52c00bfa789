//! Configuration file and command-line overrides

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use video_faces_detection::FaceDetectionConfig;
use video_faces_pipeline::PipelineConfig;
use video_faces_recognition::EmbedderConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub embedder: PathBuf,
    pub facebank: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            detector: PathBuf::from("models/face-detection/version-RFB-320.onnx"),
            embedder: PathBuf::from("models/face-recognition/arcface.onnx"),
            facebank: PathBuf::from("facebank/facebank.json"),
        }
    }
}

/// Everything configurable from the YAML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub models: ModelPaths,
    pub pipeline: PipelineConfig,
    pub detection: FaceDetectionConfig,
    pub embedder: EmbedderConfig,
}

/// Read settings from `path`, or use defaults when no file is given
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };

    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let settings: Settings = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    info!("Loaded configuration from {}", path.display());
    Ok(settings)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pipeline output records
    Records,
    /// Annotation views (one metadata + one box annotation per face)
    Annotations,
}

/// Flags shared by `run` and `batch`; each one overrides the config file
#[derive(Args, Debug, Default)]
pub struct PipelineArgs {
    /// Face detection ONNX model
    #[arg(long, value_name = "FILE")]
    pub detector_model: Option<PathBuf>,

    /// Face embedding ONNX model
    #[arg(long, value_name = "FILE")]
    pub embedder_model: Option<PathBuf>,

    /// Facebank JSON file
    #[arg(long, value_name = "FILE")]
    pub facebank: Option<PathBuf>,

    /// Distance at or above which a face is reported as Unknown
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Seconds between sampled frames
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Stop after this many seconds of footage (0 = whole video)
    #[arg(long, value_name = "SECONDS")]
    pub max_duration: Option<u64>,

    /// Maximum faces per frame
    #[arg(long)]
    pub face_limit: Option<usize>,

    /// Start reading at this offset (best-effort seek)
    #[arg(long, value_name = "SECONDS")]
    pub start: Option<f64>,

    /// Pixels to grow each output box by on every side
    #[arg(long, value_name = "PIXELS")]
    pub box_adjustment: Option<i32>,

    /// Embed mirrored faces too (test-time augmentation)
    #[arg(long)]
    pub tta: bool,
}

impl PipelineArgs {
    pub fn apply(&self, settings: &mut Settings, verbose: bool) {
        if let Some(path) = &self.detector_model {
            settings.models.detector.clone_from(path);
        }
        if let Some(path) = &self.embedder_model {
            settings.models.embedder.clone_from(path);
        }
        if let Some(path) = &self.facebank {
            settings.models.facebank.clone_from(path);
        }

        let pipeline = &mut settings.pipeline;
        if let Some(threshold) = self.threshold {
            pipeline.threshold = threshold;
        }
        if let Some(interval) = self.interval {
            pipeline.sampling_interval_secs = interval;
        }
        if let Some(max_duration) = self.max_duration {
            pipeline.max_duration_secs = max_duration;
        }
        if let Some(face_limit) = self.face_limit {
            pipeline.face_limit = face_limit;
        }
        if let Some(start) = self.start {
            pipeline.start_offset_secs = start;
        }
        if let Some(adjustment) = self.box_adjustment {
            pipeline.box_adjustment = adjustment;
        }
        pipeline.verbose |= verbose;

        settings.embedder.tta |= self.tta;
    }
}
