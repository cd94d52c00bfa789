//! `batch`: many videos, processed in parallel as isolated runs

use super::{build_pipeline, load_facebank, write_json, OnnxPipeline};
use crate::settings::{OutputFormat, PipelineArgs, Settings};
use anyhow::{Context as _, Result};
use clap::Args;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};
use video_faces_annotation::emit_documents;
use video_faces_pipeline::PipelineOutput;

#[derive(Args)]
pub struct BatchCommand {
    /// Input video files
    #[arg(value_name = "FILES", required = true)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Worker threads, each with its own models (default: one per core)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Write one `<name>.faces.json` per video here instead of JSON lines on stdout
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "records")]
    format: OutputFormat,
}

impl BatchCommand {
    pub fn execute(self, mut settings: Settings, verbose: bool) -> Result<()> {
        self.pipeline.apply(&mut settings, verbose);

        // Positions refer to the command line, so ids stay stable when inputs are skipped
        let inputs: Vec<(usize, PathBuf)> = self
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, path)| {
                if path.exists() {
                    true
                } else {
                    warn!("Skipping non-existent file: {}", path.display());
                    false
                }
            })
            .map(|(position, path)| (position, path.clone()))
            .collect();

        if inputs.is_empty() {
            anyhow::bail!("No valid input files found");
        }

        let facebank = load_facebank(&settings)?;

        let mut pool = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = self.jobs {
            pool = pool.num_threads(jobs);
        }
        let pool = pool.build().context("Failed to build worker pool")?;

        info!(
            "Processing {} videos on {} workers",
            inputs.len(),
            pool.current_num_threads()
        );
        let start = Instant::now();

        let results: Vec<Result<PipelineOutput>> = pool.install(|| {
            inputs
                .par_iter()
                .map_init(
                    || build_pipeline(&settings, facebank.clone()),
                    |pipeline, (_, path)| process(pipeline, path),
                )
                .collect()
        });

        let items = batch_items(&inputs, results);
        let failed = items.iter().filter(|item| item.result.is_err()).count();
        for item in &items {
            if let Err(e) = &item.result {
                error!("{}: {:#}", item.path.display(), e);
            }
        }

        info!(
            "Batch finished in {:.2}s: {} succeeded, {} failed",
            start.elapsed().as_secs_f64(),
            items.len() - failed,
            failed
        );

        self.write_outputs(&items)?;

        if failed > 0 {
            anyhow::bail!("{failed} of {} videos failed", items.len());
        }
        Ok(())
    }

    fn write_outputs(&self, items: &[BatchItem]) -> Result<()> {
        if let Some(dir) = &self.output_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        match self.format {
            OutputFormat::Records => {
                for item in items {
                    let Ok(output) = &item.result else {
                        continue;
                    };
                    let target = self
                        .output_dir
                        .as_deref()
                        .map(|dir| dir.join(&item.file_name));
                    write_json(output, target.as_deref(), target.is_some())?;
                }
            }
            OutputFormat::Annotations => {
                let views = emit_documents(successful_documents(items));
                let target = self.output_dir.as_deref().map(|dir| dir.join("annotations.json"));
                write_json(&views, target.as_deref(), target.is_some())?;
            }
        }
        Ok(())
    }
}

/// One input video and what became of it
struct BatchItem {
    path: PathBuf,
    /// `d<n>`, `n` being the 1-based position on the command line
    document_id: String,
    /// File written under `--output-dir`, unique within the batch
    file_name: String,
    result: Result<PipelineOutput>,
}

fn batch_items(inputs: &[(usize, PathBuf)], results: Vec<Result<PipelineOutput>>) -> Vec<BatchItem> {
    let paths: Vec<&Path> = inputs.iter().map(|(_, path)| path.as_path()).collect();
    let names = output_file_names(&paths);

    inputs
        .iter()
        .zip(names)
        .zip(results)
        .map(|(((position, path), file_name), result)| BatchItem {
            path: path.clone(),
            document_id: format!("d{}", position + 1),
            file_name,
            result,
        })
        .collect()
}

/// `(document id, output)` for every video that succeeded, in input order
fn successful_documents(items: &[BatchItem]) -> impl Iterator<Item = (&str, &PipelineOutput)> {
    items.iter().filter_map(|item| {
        item.result
            .as_ref()
            .ok()
            .map(|output| (item.document_id.as_str(), output))
    })
}

fn process(pipeline: &mut Result<OnnxPipeline>, path: &Path) -> Result<PipelineOutput> {
    let pipeline = pipeline
        .as_mut()
        .map_err(|e| anyhow::anyhow!("worker could not start: {e:#}"))?;
    Ok(pipeline.run_path(path)?)
}

/// `clips/interview.mp4` -> `interview.faces.json`
fn output_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map_or_else(|| "video".into(), |s| s.to_string_lossy());
    format!("{stem}.faces.json")
}

/// Output names for a batch; inputs sharing a stem get their 1-based batch
/// position appended (`clip-1.faces.json`, `clip-2.faces.json`)
fn output_file_names(paths: &[&Path]) -> Vec<String> {
    let plain: Vec<String> = paths.iter().map(|path| output_file_name(path)).collect();
    let mut taken = HashSet::new();

    plain
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let shared = plain.iter().filter(|other| *other == name).count() > 1;
            let mut stem = name.trim_end_matches(".faces.json").to_string();
            if shared {
                stem = format!("{stem}-{}", i + 1);
            }
            // A suffixed name can still clash with another input's own stem
            while !taken.insert(format!("{stem}.faces.json")) {
                stem = format!("{stem}-{}", i + 1);
            }
            format!("{stem}.faces.json")
        })
        .collect()
}
