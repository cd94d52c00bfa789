pub mod batch;
pub mod identities;
pub mod run;

use crate::settings::Settings;
use anyhow::{Context as _, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use video_faces_detection::FaceDetector;
use video_faces_pipeline::{load_models, FacePipeline};
use video_faces_recognition::{Facebank, OnnxEmbedder};

pub type OnnxPipeline = FacePipeline<FaceDetector, OnnxEmbedder>;

pub fn load_facebank(settings: &Settings) -> Result<Arc<Facebank>> {
    let facebank = Facebank::load(&settings.models.facebank)
        .context("Failed to load facebank")?;
    Ok(Arc::new(facebank))
}

/// Load both models and assemble a pipeline around a shared facebank
pub fn build_pipeline(settings: &Settings, facebank: Arc<Facebank>) -> Result<OnnxPipeline> {
    let (detector, embedder) = load_models(
        &settings.models.detector,
        settings.detection.clone(),
        &settings.models.embedder,
        settings.embedder.clone(),
    )?;
    Ok(FacePipeline::new(
        detector,
        embedder,
        facebank,
        settings.pipeline.clone(),
    )?)
}

/// Write `value` as JSON to `output`, or to stdout when `None`
pub fn write_json<T: Serialize>(value: &T, output: Option<&Path>, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };

    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}
