// UltraFace prior/anchor box generation
//
// Reference: https://github.com/Linzaer/Ultra-Light-Fast-Generic-Face-Detector-1MB
//            vision/utils/box_utils.py::generate_priors()

/// Feature-map strides of the four UltraFace detection heads
const STRIDES: [f32; 4] = [8.0, 16.0, 32.0, 64.0];

/// Min box sizes (input pixels) per detection head
const MIN_BOXES: [&[f32]; 4] = [
    &[10.0, 16.0, 24.0],    // small faces
    &[32.0, 48.0],          // medium faces
    &[64.0, 96.0],          // large faces
    &[128.0, 192.0, 256.0], // very large faces
];

/// Prior box in center form [center_x, center_y, width, height]
/// All values are normalized to [0, 1] range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

impl PriorBox {
    pub fn new(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
        Self {
            center_x,
            center_y,
            width,
            height,
        }
    }
}

/// Generate UltraFace prior boxes for an arbitrary model input size
///
/// Feature map size per head is `ceil(input / stride)`; the effective
/// shrinkage is `input / feature_map`, which differs from the stride when the
/// input is not a multiple of it (240 / 8 = 30 cells, shrinkage 30 on the
/// third head). For 320x240 this yields 4420 priors, for 640x480 17640.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn generate_priors(input_width: u32, input_height: u32) -> Vec<PriorBox> {
    let image_w = input_width as f32;
    let image_h = input_height as f32;

    let mut priors = Vec::new();

    for (level, &stride) in STRIDES.iter().enumerate() {
        let feature_w = (image_w / stride).ceil() as usize;
        let feature_h = (image_h / stride).ceil() as usize;
        let shrink_w = image_w / feature_w as f32;
        let shrink_h = image_h / feature_h as f32;

        for j in 0..feature_h {
            for i in 0..feature_w {
                let center_x = ((i as f32 + 0.5) * shrink_w / image_w).clamp(0.0, 1.0);
                let center_y = ((j as f32 + 0.5) * shrink_h / image_h).clamp(0.0, 1.0);

                for &min_size in MIN_BOXES[level] {
                    let width = (min_size / image_w).clamp(0.0, 1.0);
                    let height = (min_size / image_h).clamp(0.0, 1.0);
                    priors.push(PriorBox::new(center_x, center_y, width, height));
                }
            }
        }
    }

    priors
}

/// Decode location regression outputs to corner-form boxes [x1, y1, x2, y2]
///
/// ```text
/// center_x = prior_center_x + dx * center_variance * prior_width
/// center_y = prior_center_y + dy * center_variance * prior_height
/// width    = prior_width  * exp(dw * size_variance)
/// height   = prior_height * exp(dh * size_variance)
/// ```
///
/// Callers must check `locations.len() == priors.len() * 4`; extra values are ignored.
pub fn decode_boxes(
    locations: &[f32],
    priors: &[PriorBox],
    center_variance: f32,
    size_variance: f32,
) -> Vec<[f32; 4]> {
    locations
        .chunks_exact(4)
        .zip(priors)
        .map(|(loc, prior)| {
            let center_x = prior.center_x + loc[0] * center_variance * prior.width;
            let center_y = prior.center_y + loc[1] * center_variance * prior.height;
            let width = prior.width * (loc[2] * size_variance).exp();
            let height = prior.height * (loc[3] * size_variance).exp();

            [
                center_x - width / 2.0,
                center_y - height / 2.0,
                center_x + width / 2.0,
                center_y + height / 2.0,
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prior_generation_count() {
        assert_eq!(generate_priors(320, 240).len(), 4420);
        assert_eq!(generate_priors(640, 480).len(), 17640);
    }

    #[test]
    fn test_prior_bounds() {
        let priors = generate_priors(320, 240);

        for (i, prior) in priors.iter().enumerate() {
            assert!(
                (0.0..=1.0).contains(&prior.center_x),
                "Prior {} center_x out of range: {}",
                i,
                prior.center_x
            );
            assert!(
                (0.0..=1.0).contains(&prior.center_y),
                "Prior {} center_y out of range: {}",
                i,
                prior.center_y
            );
            assert!((0.0..=1.0).contains(&prior.width));
            assert!((0.0..=1.0).contains(&prior.height));
        }
    }

    #[test]
    fn test_first_prior_matches_reference_layout() {
        let priors = generate_priors(320, 240);
        // Head 0, cell (0, 0), min size 10: center (4/320, 4/240)
        let first = priors[0];
        assert!((first.center_x - 4.0 / 320.0).abs() < 1e-6);
        assert!((first.center_y - 4.0 / 240.0).abs() < 1e-6);
        assert!((first.width - 10.0 / 320.0).abs() < 1e-6);
        assert!((first.height - 10.0 / 240.0).abs() < 1e-6);
    }

    #[test]
    fn test_box_decoding() {
        let priors = vec![PriorBox::new(0.5, 0.5, 0.2, 0.2)];

        // Zero offsets should return box at prior location
        let decoded = decode_boxes(&[0.0, 0.0, 0.0, 0.0], &priors, 0.1, 0.2);

        assert_eq!(decoded.len(), 1);
        let bbox = decoded[0];
        assert!((bbox[0] - 0.4).abs() < 0.001, "x1 should be ~0.4");
        assert!((bbox[1] - 0.4).abs() < 0.001, "y1 should be ~0.4");
        assert!((bbox[2] - 0.6).abs() < 0.001, "x2 should be ~0.6");
        assert!((bbox[3] - 0.6).abs() < 0.001, "y2 should be ~0.6");
    }

    #[test]
    fn test_decoding_ignores_trailing_values() {
        let priors = vec![PriorBox::new(0.5, 0.5, 0.2, 0.2)];
        let decoded = decode_boxes(&[0.0, 0.0, 0.0, 0.0, 9.0, 9.0], &priors, 0.1, 0.2);
        assert_eq!(decoded.len(), 1);
    }
}
