//! Face patch alignment
//!
//! The detector has no landmark head, so alignment is a geometric
//! normalization only: the detected region is clamped to the frame, cropped
//! and resized to the square patch the embedder expects.

use image::{imageops, RgbImage};
use video_faces_common::PixelRegion;

/// Crop `region` out of `image` and resize it to `patch_size` x `patch_size`.
///
/// Returns `None` when the region does not overlap the image.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn align_face(image: &RgbImage, region: &PixelRegion, patch_size: u32) -> Option<RgbImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || patch_size == 0 || !region.is_well_formed() {
        return None;
    }

    let x1 = region.x1.floor().clamp(0.0, width as f32) as u32;
    let y1 = region.y1.floor().clamp(0.0, height as f32) as u32;
    let x2 = region.x2.ceil().clamp(0.0, width as f32) as u32;
    let y2 = region.y2.ceil().clamp(0.0, height as f32) as u32;

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let crop = imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
    Some(imageops::resize(
        &crop,
        patch_size,
        patch_size,
        imageops::FilterType::Triangle,
    ))
}
