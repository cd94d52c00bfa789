//! Integration tests for the detection crate's public surface

use image::{Rgb, RgbImage};
use video_faces_common::FaceCandidate;
use video_faces_detection::{
    select_candidates, Detector, Face, FaceDetectionConfig, FaceDetectionError, FaceDetector,
    NormalizedBox,
};

/// Detector that always reports the same normalized boxes
struct FixedDetector {
    faces: Vec<Face>,
    config: FaceDetectionConfig,
}

impl Detector for FixedDetector {
    fn detect(
        &mut self,
        image: &RgbImage,
        max_count: usize,
    ) -> Result<Vec<FaceCandidate>, FaceDetectionError> {
        Ok(select_candidates(image, &self.faces, max_count, &self.config))
    }
}

#[test]
fn test_missing_model_is_load_error() {
    let result = FaceDetector::new(
        "/nonexistent/version-RFB-320.onnx",
        FaceDetectionConfig::default(),
    );
    assert!(matches!(result, Err(FaceDetectionError::ModelLoadError(_))));
}

#[test]
fn test_boxed_detector_respects_cap() {
    let faces = (0..5)
        .map(|i| {
            let offset = i as f32 * 0.18;
            Face {
                confidence: 0.5 + i as f32 * 0.1,
                bbox: NormalizedBox {
                    x1: offset,
                    y1: 0.1,
                    x2: offset + 0.15,
                    y2: 0.6,
                },
            }
        })
        .collect();

    let mut detector: Box<dyn Detector> = Box::new(FixedDetector {
        faces,
        config: FaceDetectionConfig::default(),
    });

    let frame = RgbImage::from_pixel(640, 360, Rgb([40, 120, 200]));
    let candidates = detector.detect(&frame, 3).unwrap();

    assert_eq!(candidates.len(), 3);
    assert!(candidates
        .windows(2)
        .all(|pair| pair[0].confidence >= pair[1].confidence));
    assert!(candidates.iter().all(|c| c.patch.dimensions() == (112, 112)));
}

#[test]
fn test_zero_cap_returns_nothing() {
    let mut detector = FixedDetector {
        faces: vec![Face {
            confidence: 0.9,
            bbox: NormalizedBox {
                x1: 0.2,
                y1: 0.2,
                x2: 0.6,
                y2: 0.6,
            },
        }],
        config: FaceDetectionConfig::default(),
    };

    let frame = RgbImage::new(100, 100);
    assert!(detector.detect(&frame, 0).unwrap().is_empty());
}
