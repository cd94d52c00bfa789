//! video-faces - find and identify faces in videos
//!
//! Command-line front end for the face identification pipeline.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod settings;

use commands::batch::BatchCommand;
use commands::identities::IdentitiesCommand;
use commands::run::RunCommand;

#[derive(Parser)]
#[command(
    name = "video-faces",
    version,
    about = "Detect and identify faces in video files",
    long_about = "Samples frames from a video, detects faces and matches them against a facebank\n\
                  of known identities. Output is a per-frame map of (label, box) pairs plus\n\
                  stream metadata, or the equivalent annotation views.",
    after_help = "EXAMPLES:\n  \
                  # One video, one sample per second\n  \
                  video-faces run --facebank bank.json interview.mp4\n\n  \
                  # Every 5 seconds, first two minutes only, as annotations\n  \
                  video-faces run --interval 5 --max-duration 120 --format annotations interview.mp4\n\n  \
                  # Several videos in parallel, one JSON file each\n  \
                  video-faces batch --jobs 4 --output-dir results/ *.mp4\n\n  \
                  # List identities in a facebank\n  \
                  video-faces identities --facebank bank.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging and per-minute progress reports
    #[arg(short, long, global = true)]
    verbose: bool,

    /// YAML configuration file (command-line flags take precedence)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a single video
    Run(RunCommand),

    /// Process several videos in parallel, each as an isolated run
    Batch(BatchCommand),

    /// List the identities stored in a facebank
    Identities(IdentitiesCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let settings = settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(cmd) => cmd.execute(settings, cli.verbose),
        Commands::Batch(cmd) => cmd.execute(settings, cli.verbose),
        Commands::Identities(cmd) => cmd.execute(&settings),
    }
}
