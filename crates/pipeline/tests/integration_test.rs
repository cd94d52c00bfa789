//! End-to-end pipeline runs over synthetic videos
//!
//! The synthetic source paints a red square ("face") on chosen seconds of an
//! otherwise grey video. The marker detector finds that square; the color
//! embedder maps it to a unit vector that the facebank knows as "alice".

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use video_faces_common::{FaceCandidate, Frame, PixelRegion, VideoInfo};
use video_faces_decoder::{DecodeError, FrameSource};
use video_faces_detection::{align::align_face, Detector, FaceDetectionError};
use video_faces_pipeline::{FacePipeline, PipelineConfig, PipelineError, PipelineOutput};
use video_faces_recognition::{
    l2_normalize, Embedder, Facebank, IdentityRecord, RecognitionError,
};

const FACE: Rgb<u8> = Rgb([255, 0, 0]);
const BACKGROUND: Rgb<u8> = Rgb([90, 90, 90]);
const FACE_RECT: (i32, i32, u32, u32) = (40, 30, 48, 56);

struct SyntheticVideo {
    info: VideoInfo,
    face_seconds: BTreeSet<u64>,
    corrupt: BTreeSet<u64>,
    fail_at: Option<u64>,
    next: u64,
    seek_fails: bool,
}

impl SyntheticVideo {
    fn new(seconds: u64, fps: f64) -> Self {
        let mut info = VideoInfo {
            fps,
            width: 160,
            height: 120,
            frame_count: 0,
        };
        info.frame_count = seconds * info.rounded_fps();
        Self {
            info,
            face_seconds: BTreeSet::new(),
            corrupt: BTreeSet::new(),
            fail_at: None,
            next: 0,
            seek_fails: false,
        }
    }

    fn with_faces(mut self, seconds: impl IntoIterator<Item = u64>) -> Self {
        self.face_seconds.extend(seconds);
        self
    }

    fn with_corrupt(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.corrupt.extend(frames);
        self
    }

    fn render(&self, index: u64) -> RgbImage {
        let mut image = RgbImage::from_pixel(self.info.width, self.info.height, BACKGROUND);
        let second = index / self.info.rounded_fps();
        if self.face_seconds.contains(&second) {
            let (x, y, w, h) = FACE_RECT;
            draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(w, h), FACE);
        }
        image
    }
}

impl FrameSource for SyntheticVideo {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn seek(&mut self, seconds: f64) -> Result<(), DecodeError> {
        if self.seek_fails {
            return Err(DecodeError::Seek {
                seconds,
                reason: "not seekable".into(),
            });
        }
        self.next = (seconds * self.info.fps) as u64;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        let index = self.next;
        if index >= self.info.frame_count {
            return Ok(None);
        }
        if self.fail_at == Some(index) {
            return Err(DecodeError::FFmpegError("bitstream ended abruptly".into()));
        }
        self.next += 1;
        if self.corrupt.contains(&index) {
            return Err(DecodeError::CorruptFrame { index });
        }
        Ok(Some(Frame {
            index,
            image: self.render(index),
        }))
    }
}

/// Finds the bounding box of pure-red pixels
struct MarkerDetector;

impl Detector for MarkerDetector {
    fn detect(
        &mut self,
        image: &RgbImage,
        max_count: usize,
    ) -> Result<Vec<FaceCandidate>, FaceDetectionError> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in image.enumerate_pixels() {
            if *pixel == FACE {
                let b = bounds.get_or_insert((x, y, x, y));
                b.0 = b.0.min(x);
                b.1 = b.1.min(y);
                b.2 = b.2.max(x);
                b.3 = b.3.max(y);
            }
        }

        let Some((x1, y1, x2, y2)) = bounds else {
            return Ok(Vec::new());
        };
        let region = PixelRegion {
            x1: x1 as f32,
            y1: y1 as f32,
            x2: (x2 + 1) as f32,
            y2: (y2 + 1) as f32,
        };
        let patch = align_face(image, &region, 112).expect("marker inside frame");
        let candidate = FaceCandidate {
            confidence: 0.99,
            region,
            patch,
        };
        Ok(std::iter::once(candidate).take(max_count).collect())
    }
}

/// Fails or panics on chosen frames, otherwise behaves like [`MarkerDetector`]
struct FlakyDetector {
    calls: u64,
    panic_on_call: u64,
    error_on_call: u64,
}

impl Detector for FlakyDetector {
    fn detect(
        &mut self,
        image: &RgbImage,
        max_count: usize,
    ) -> Result<Vec<FaceCandidate>, FaceDetectionError> {
        let call = self.calls;
        self.calls += 1;
        if call == self.panic_on_call {
            panic!("model runtime blew up");
        }
        if call == self.error_on_call {
            return Err(FaceDetectionError::InferenceError("bad tensor".into()));
        }
        MarkerDetector.detect(image, max_count)
    }
}

/// Returns a degenerate region
struct MalformedDetector;

impl Detector for MalformedDetector {
    fn detect(
        &mut self,
        _image: &RgbImage,
        _max_count: usize,
    ) -> Result<Vec<FaceCandidate>, FaceDetectionError> {
        Ok(vec![FaceCandidate {
            confidence: 0.9,
            region: PixelRegion {
                x1: 50.0,
                y1: 50.0,
                x2: 10.0,
                y2: 10.0,
            },
            patch: RgbImage::new(112, 112),
        }])
    }
}

/// Mean color of the patch as a unit vector
struct ColorEmbedder;

impl Embedder for ColorEmbedder {
    fn embed(&mut self, patches: &[RgbImage]) -> Result<Vec<Vec<f32>>, RecognitionError> {
        Ok(patches
            .iter()
            .map(|patch| {
                let mut sum = [0.0f32; 3];
                for pixel in patch.pixels() {
                    for c in 0..3 {
                        sum[c] += f32::from(pixel[c]);
                    }
                }
                let mut v = sum.to_vec();
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

/// Loses every embedding
struct LossyEmbedder;

impl Embedder for LossyEmbedder {
    fn embed(&mut self, _patches: &[RgbImage]) -> Result<Vec<Vec<f32>>, RecognitionError> {
        Ok(Vec::new())
    }
}

/// Reports a fixed vector length up front
struct WideEmbedder(usize);

impl Embedder for WideEmbedder {
    fn embed(&mut self, patches: &[RgbImage]) -> Result<Vec<Vec<f32>>, RecognitionError> {
        Ok(vec![vec![0.0; self.0]; patches.len()])
    }

    fn embedding_dim(&self) -> Option<usize> {
        Some(self.0)
    }
}

fn facebank() -> Arc<Facebank> {
    Arc::new(
        Facebank::from_records(vec![
            IdentityRecord {
                name: "alice".into(),
                embeddings: vec![vec![1.0, 0.0, 0.0]],
            },
            IdentityRecord {
                name: "bob".into(),
                embeddings: vec![vec![0.0, 0.0, 1.0]],
            },
        ])
        .unwrap(),
    )
}

fn pipeline<D: Detector, E: Embedder>(
    detector: D,
    embedder: E,
    config: PipelineConfig,
) -> FacePipeline<D, E> {
    FacePipeline::new(detector, embedder, facebank(), config).unwrap()
}

fn run(video: &mut SyntheticVideo, config: PipelineConfig) -> PipelineOutput {
    pipeline(MarkerDetector, ColorEmbedder, config)
        .run(video, "synthetic.mp4")
        .unwrap()
}

fn keys(output: &PipelineOutput) -> Vec<u64> {
    output.bounding_boxes_per_frame_index.keys().copied().collect()
}

#[test]
fn test_single_face_at_second_three() {
    let mut video = SyntheticVideo::new(10, 30.0).with_faces([3]);
    let output = run(&mut video, PipelineConfig::default());

    assert_eq!(keys(&output), vec![90]);
    let boxes = &output.bounding_boxes_per_frame_index[&90];
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].label(), "alice");

    // Marker spans [40, 88) x [30, 86); adjusted by one pixel each way
    assert_eq!(boxes[0].1, [39, 29, 89, 87]);
    assert_eq!(output.last_frame, 270);
}

#[test]
fn test_metadata_matches_source() {
    let mut video = SyntheticVideo::new(4, 29.97).with_faces([1]);
    let info = video.info();
    let output = run(&mut video, PipelineConfig::default());

    assert_eq!(output.fps, info.fps);
    assert_eq!(output.width, info.width);
    assert_eq!(output.height, info.height);
    assert_eq!(output.frame_count, info.frame_count);
    assert_eq!(output.video_name, "synthetic.mp4");
    assert_eq!(output.app_name, "video-faces");
}

#[test]
fn test_keys_are_increasing_multiples_of_rounded_fps() {
    let mut video = SyntheticVideo::new(10, 24.0).with_faces(0..10);
    let output = run(&mut video, PipelineConfig::default());

    let keys = keys(&output);
    assert_eq!(keys.len(), 10);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    assert!(keys.iter().all(|k| k % 24 == 0 && *k <= output.last_frame));
    assert!(output.bounding_boxes_per_frame_index.values().all(|v| !v.is_empty()));
}

#[test]
fn test_half_frame_rate_rounds_to_even() {
    // 12.5 fps samples every 12 frames
    let mut video = SyntheticVideo::new(10, 12.5).with_faces(0..10);
    assert_eq!(video.info.frame_count, 120);
    let output = run(&mut video, PipelineConfig::default());

    assert_eq!(keys(&output), (0..10).map(|s| s * 12).collect::<Vec<_>>());
    assert_eq!(output.last_frame, 108);

    let mut video = SyntheticVideo::new(10, 12.5).with_faces(0..10);
    let config = PipelineConfig {
        max_duration_secs: 2,
        ..PipelineConfig::default()
    };
    assert_eq!(keys(&run(&mut video, config)), vec![0, 12, 24]);
}

#[test]
fn test_duration_cap() {
    let mut video = SyntheticVideo::new(10, 30.0).with_faces(0..10);
    let config = PipelineConfig {
        max_duration_secs: 2,
        ..PipelineConfig::default()
    };
    let output = run(&mut video, config);

    let keys = keys(&output);
    assert!(keys.iter().all(|k| *k <= 60), "keys beyond cap: {keys:?}");
    assert_eq!(keys, vec![0, 30, 60]);
}

#[test]
fn test_sampling_interval() {
    let mut video = SyntheticVideo::new(10, 30.0).with_faces(0..10);
    let config = PipelineConfig {
        sampling_interval_secs: 2,
        ..PipelineConfig::default()
    };
    let output = run(&mut video, config);

    assert_eq!(keys(&output), vec![0, 60, 120, 180, 240]);
}

#[test]
fn test_corrupt_frames_do_not_abort() {
    // 45 is skipped between samples, 60 is a sampled frame
    let mut video = SyntheticVideo::new(5, 30.0)
        .with_faces(0..5)
        .with_corrupt([45, 60]);
    let output = run(&mut video, PipelineConfig::default());

    assert_eq!(keys(&output), vec![0, 30, 90, 120]);
}

#[test]
fn test_decoder_failure_keeps_partial_output() {
    let mut video = SyntheticVideo::new(10, 30.0).with_faces(0..10);
    video.fail_at = Some(100);
    let output = run(&mut video, PipelineConfig::default());

    assert_eq!(keys(&output), vec![0, 30, 60, 90]);
    assert_eq!(output.last_frame, 90);
}

#[test]
fn test_no_faces_yields_empty_map() {
    let mut video = SyntheticVideo::new(3, 30.0);
    let output = run(&mut video, PipelineConfig::default());

    assert!(output.bounding_boxes_per_frame_index.is_empty());
    assert_eq!(output.last_frame, 60);
}

#[test]
fn test_detector_failures_are_isolated() {
    let mut video = SyntheticVideo::new(4, 30.0).with_faces(0..4);
    let detector = FlakyDetector {
        calls: 0,
        panic_on_call: 1,
        error_on_call: 2,
    };
    let output = pipeline(detector, ColorEmbedder, PipelineConfig::default())
        .run(&mut video, "flaky.mp4")
        .unwrap();

    assert_eq!(keys(&output), vec![0, 90]);
}

#[test]
fn test_malformed_detection_is_ignored() {
    let mut video = SyntheticVideo::new(2, 30.0);
    let output = pipeline(MalformedDetector, ColorEmbedder, PipelineConfig::default())
        .run(&mut video, "malformed.mp4")
        .unwrap();

    assert!(output.bounding_boxes_per_frame_index.is_empty());
}

#[test]
fn test_embedder_count_mismatch_is_fatal() {
    let mut video = SyntheticVideo::new(3, 30.0).with_faces([1]);
    let err = pipeline(MarkerDetector, LossyEmbedder, PipelineConfig::default())
        .run(&mut video, "lossy.mp4")
        .unwrap_err();

    match err {
        PipelineError::Consistency { path, frame, .. } => {
            assert_eq!(path, Path::new("lossy.mp4"));
            assert_eq!(frame, 30);
        }
        other => panic!("expected consistency error, got {other:?}"),
    }
}

#[test]
fn test_threshold_turns_matches_unknown() {
    let mut video = SyntheticVideo::new(2, 30.0).with_faces([1]);
    let config = PipelineConfig {
        threshold: 0.0,
        ..PipelineConfig::default()
    };
    let output = run(&mut video, config);

    assert_eq!(output.bounding_boxes_per_frame_index[&30][0].label(), "Unknown");
}

#[test]
fn test_start_offset_counts_from_first_read_frame() {
    let mut video = SyntheticVideo::new(10, 30.0).with_faces([5]);
    let config = PipelineConfig {
        start_offset_secs: 4.0,
        ..PipelineConfig::default()
    };
    let output = run(&mut video, config);

    // Second 5 of the video is one second after the seek point
    assert_eq!(keys(&output), vec![30]);
}

#[test]
fn test_failed_seek_reads_from_start() {
    let mut video = SyntheticVideo::new(5, 30.0).with_faces([2]);
    video.seek_fails = true;
    let config = PipelineConfig {
        start_offset_secs: 1.0,
        ..PipelineConfig::default()
    };
    let output = run(&mut video, config);

    assert_eq!(keys(&output), vec![60]);
}

#[test]
fn test_reruns_are_byte_identical() {
    let config = PipelineConfig::default();
    let mut first = SyntheticVideo::new(6, 25.0).with_faces([1, 4]);
    let mut second = SyntheticVideo::new(6, 25.0).with_faces([1, 4]);

    let a = serde_json::to_string(&run(&mut first, config.clone())).unwrap();
    let b = serde_json::to_string(&run(&mut second, config)).unwrap();

    assert_eq!(a, b);
}

#[test]
fn test_zero_fps_is_rejected() {
    let mut video = SyntheticVideo::new(1, 30.0);
    video.info.fps = 0.0;
    let err = pipeline(MarkerDetector, ColorEmbedder, PipelineConfig::default())
        .run(&mut video, "still.mp4")
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidFrameRate { .. }));
}

#[test]
fn test_unreadable_path_is_video_open_error() {
    let mut pipeline = pipeline(MarkerDetector, ColorEmbedder, PipelineConfig::default());
    let err = pipeline
        .run_path(Path::new("/nonexistent/clip.mp4"))
        .unwrap_err();

    assert!(matches!(err, PipelineError::VideoOpen { .. }));
    assert!(err.to_string().contains("/nonexistent/clip.mp4"));
}

#[test]
fn test_embedder_dimension_must_match_facebank() {
    let mismatched = FacePipeline::new(
        MarkerDetector,
        WideEmbedder(128),
        facebank(),
        PipelineConfig::default(),
    );
    assert!(matches!(mismatched, Err(PipelineError::InvalidConfig(_))));

    let matching = FacePipeline::new(
        MarkerDetector,
        WideEmbedder(3),
        facebank(),
        PipelineConfig::default(),
    );
    assert!(matching.is_ok());
}

#[test]
fn test_oversized_sampling_window_is_rejected() {
    let huge_interval = PipelineConfig {
        sampling_interval_secs: u64::MAX,
        ..PipelineConfig::default()
    };
    let err = pipeline(MarkerDetector, ColorEmbedder, huge_interval)
        .run(&mut SyntheticVideo::new(2, 30.0), "long.mp4")
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));

    let huge_cap = PipelineConfig {
        max_duration_secs: u64::MAX / 2,
        ..PipelineConfig::default()
    };
    let err = pipeline(MarkerDetector, ColorEmbedder, huge_cap)
        .run(&mut SyntheticVideo::new(2, 30.0), "long.mp4")
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}
