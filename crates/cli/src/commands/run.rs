//! `run`: one video, one output document

use super::{build_pipeline, load_facebank, write_json};
use crate::settings::{OutputFormat, PipelineArgs, Settings};
use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use video_faces_annotation::emit_documents;

#[derive(Args)]
pub struct RunCommand {
    /// Input video file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "records")]
    format: OutputFormat,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

impl RunCommand {
    pub fn execute(self, mut settings: Settings, verbose: bool) -> Result<()> {
        self.pipeline.apply(&mut settings, verbose);

        let facebank = load_facebank(&settings)?;
        let mut pipeline = build_pipeline(&settings, facebank)?;

        let start = Instant::now();
        let output = pipeline
            .run_path(&self.input)
            .with_context(|| format!("Failed to process {}", self.input.display()))?;
        info!(
            "Processed {} in {:.2}s",
            self.input.display(),
            start.elapsed().as_secs_f64()
        );

        match self.format {
            OutputFormat::Records => write_json(&output, self.output.as_deref(), self.pretty),
            OutputFormat::Annotations => {
                let views = emit_documents([("d1", &output)]);
                write_json(&views, self.output.as_deref(), self.pretty)
            }
        }
    }
}
