//! Sampling loop: decode -> detect -> recognize -> accumulate

use crate::{aggregate, FrameResult, PipelineConfig, PipelineError, PipelineOutput, RecognizedFace};
use image::RgbImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use video_faces_common::FaceCandidate;
use video_faces_decoder::{FrameSource, VideoStream};
use video_faces_detection::Detector;
use video_faces_recognition::{Embedder, FaceRecognizer, Facebank, Matcher, RecognitionError};

/// Frames between progress reports, in multiples of the rounded frame rate
const PROGRESS_EVERY_SECS: u64 = 60;

/// One detector, one embedder and a shared facebank, processing videos one at a time
pub struct FacePipeline<D, E> {
    detector: D,
    recognizer: FaceRecognizer<E>,
    config: PipelineConfig,
}

impl<D: Detector, E: Embedder> FacePipeline<D, E> {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails validation or
    /// the embedder's vector length differs from the facebank's.
    pub fn new(
        detector: D,
        embedder: E,
        facebank: Arc<Facebank>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        if let (Some(model), Some(bank)) = (embedder.embedding_dim(), facebank.dim()) {
            if model != bank {
                return Err(PipelineError::InvalidConfig(format!(
                    "embedder produces {model}-d vectors but the facebank holds {bank}-d embeddings"
                )));
            }
        }
        let matcher = Matcher::new(facebank, config.threshold);
        Ok(Self {
            detector,
            recognizer: FaceRecognizer::new(embedder, matcher),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Open `path` with the ffmpeg backend and process it
    ///
    /// The decode handle is released when this returns, on every path.
    ///
    /// # Errors
    ///
    /// [`PipelineError::VideoOpen`] if the file cannot be decoded, otherwise as [`Self::run`].
    pub fn run_path(&mut self, path: &Path) -> Result<PipelineOutput, PipelineError> {
        let mut stream = VideoStream::open(path).map_err(|source| PipelineError::VideoOpen {
            path: path.to_path_buf(),
            source,
        })?;
        self.run(&mut stream, &path.display().to_string())
    }

    /// Process every sampled frame of `source`
    ///
    /// Frames are keyed by their position counted from the first frame read
    /// (after the start offset). Detection failures, corrupt frames and a
    /// decoder that gives up mid-stream never fail the run.
    ///
    /// # Errors
    ///
    /// Fails on an unusable frame rate, a sampling window too large to count
    /// in frames, a detector/matcher disagreement or an embedding failure.
    pub fn run<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        video_name: &str,
    ) -> Result<PipelineOutput, PipelineError> {
        let info = source.info();
        let fps = info.rounded_fps();
        if fps == 0 {
            return Err(PipelineError::InvalidFrameRate {
                path: PathBuf::from(video_name),
                fps: info.fps,
            });
        }

        let step = fps.checked_mul(self.config.sampling_interval_secs).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "sampling interval of {}s overflows at {fps} fps",
                self.config.sampling_interval_secs
            ))
        })?;
        let frame_limit = match self.config.max_duration_secs {
            0 => None,
            secs => Some(fps.checked_mul(secs).ok_or_else(|| {
                PipelineError::InvalidConfig(format!("max duration of {secs}s overflows at {fps} fps"))
            })?),
        };
        let progress_every = PROGRESS_EVERY_SECS.saturating_mul(fps);

        info!(
            "Processing {} ({:.3} fps, {}x{}, {} frames, sampling every {} frames)",
            video_name, info.fps, info.width, info.height, info.frame_count, step
        );

        if self.config.start_offset_secs > 0.0 {
            if let Err(e) = source.seek(self.config.start_offset_secs) {
                warn!(
                    "Seek to {:.3}s in {} failed, reading from the start: {}",
                    self.config.start_offset_secs, video_name, e
                );
            }
        }

        let mut frames: Vec<FrameResult> = Vec::new();
        let mut last_sampled: u64 = 0;
        let mut sampled: u64 = 0;
        let mut index: u64 = 0;

        loop {
            if index % step == 0 {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        sampled += 1;
                        last_sampled = index;
                        let faces = self.process_frame(&frame.image, index, video_name)?;
                        if !faces.is_empty() {
                            frames.push(FrameResult { index, faces });
                        }
                    }
                    Ok(None) => break,
                    Err(e) if e.is_recoverable() => {
                        warn!("Skipping frame {} of {}: {}", index, video_name, e);
                    }
                    Err(e) => {
                        warn!("Decoding {} stopped at frame {}: {}", video_name, index, e);
                        break;
                    }
                }
            } else {
                match source.skip_frame() {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        warn!("Decoding {} stopped at frame {}: {}", video_name, index, e);
                        break;
                    }
                }
            }

            index += 1;

            if index % progress_every == 0 {
                let minutes = index / progress_every;
                if self.config.verbose {
                    info!("{}: {} minute(s) processed, {} frames sampled", video_name, minutes, sampled);
                } else {
                    debug!("{}: {} minute(s) processed, {} frames sampled", video_name, minutes, sampled);
                }
            }

            if frame_limit.is_some_and(|limit| index > limit) {
                debug!("{}: duration cap reached at frame {}", video_name, index);
                break;
            }
        }

        let output = aggregate(&self.config.app_name, video_name, &info, last_sampled, frames)
            .map_err(|source| PipelineError::Aggregate {
                path: PathBuf::from(video_name),
                source,
            })?;

        info!(
            "Finished {}: {} frames sampled, {} with faces, {} faces",
            video_name,
            sampled,
            output.bounding_boxes_per_frame_index.len(),
            output.face_count()
        );

        Ok(output)
    }

    fn process_frame(
        &mut self,
        image: &RgbImage,
        index: u64,
        video_name: &str,
    ) -> Result<Vec<RecognizedFace>, PipelineError> {
        let Some(candidates) = self.detect_guarded(image, index, video_name) else {
            return Ok(Vec::new());
        };
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let patches: Vec<RgbImage> = candidates.iter().map(|c| c.patch.clone()).collect();
        let matches = self.recognizer.identify(&patches).map_err(|e| match e {
            RecognitionError::CountMismatch { .. } => PipelineError::Consistency {
                path: PathBuf::from(video_name),
                frame: index,
                detail: e.to_string(),
            },
            source => PipelineError::Recognition {
                path: PathBuf::from(video_name),
                frame: index,
                source,
            },
        })?;

        RecognizedFace::pair(&candidates, matches, self.config.box_adjustment).map_err(|e| {
            PipelineError::Consistency {
                path: PathBuf::from(video_name),
                frame: index,
                detail: e.to_string(),
            }
        })
    }

    /// Run the detector, treating errors, panics and malformed output as "no faces"
    fn detect_guarded(
        &mut self,
        image: &RgbImage,
        index: u64,
        video_name: &str,
    ) -> Option<Vec<FaceCandidate>> {
        let limit = self.config.face_limit;
        let detector = &mut self.detector;

        let mut candidates = match catch_unwind(AssertUnwindSafe(|| detector.detect(image, limit))) {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                warn!("Detection failed on frame {} of {}: {}", index, video_name, e);
                return None;
            }
            Err(_) => {
                warn!("Detector panicked on frame {} of {}", index, video_name);
                return None;
            }
        };

        if let Some(bad) = candidates
            .iter()
            .position(|c| !c.region.is_well_formed() || !c.confidence.is_finite())
        {
            warn!(
                "Detector returned a malformed face (#{}) on frame {} of {}, ignoring frame",
                bad, index, video_name
            );
            return None;
        }

        if candidates
            .windows(2)
            .any(|pair| pair[0].confidence < pair[1].confidence)
        {
            debug!("Reordering detections on frame {} by confidence", index);
            candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        }
        candidates.truncate(limit);

        Some(candidates)
    }
}
