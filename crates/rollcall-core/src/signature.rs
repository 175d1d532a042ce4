//! Intensity-histogram face signatures.
//!
//! A face crop is reduced to grayscale, resized to a canonical 100x100 patch
//! and summarized as a 256-bin histogram normalized to unit mass, so crops of
//! different sizes and exposures stay comparable.

use crate::types::{BoundingBox, Signature};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage};
use thiserror::Error;

// --- Named constants ---
pub const SIGNATURE_INPUT_SIZE: u32 = 100;
pub const SIGNATURE_BINS: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid region: {width}x{height} has zero area")]
    InvalidRegion { width: u32, height: u32 },
}

/// Extract a signature from a face region (color or grayscale).
pub fn extract(region: &DynamicImage) -> Result<Signature, SignatureError> {
    let (width, height) = region.dimensions();
    if width == 0 || height == 0 {
        return Err(SignatureError::InvalidRegion { width, height });
    }
    extract_luma(&region.to_luma8())
}

/// Extract a signature from an already single-channel region.
pub fn extract_luma(gray: &GrayImage) -> Result<Signature, SignatureError> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(SignatureError::InvalidRegion { width, height });
    }

    let canonical = imageops::resize(
        gray,
        SIGNATURE_INPUT_SIZE,
        SIGNATURE_INPUT_SIZE,
        FilterType::Triangle,
    );

    let mut hist = [0u32; SIGNATURE_BINS];
    for &pixel in canonical.as_raw() {
        hist[pixel as usize * SIGNATURE_BINS / 256] += 1;
    }

    let total: u32 = hist.iter().sum();
    let values = if total > 0 {
        hist.iter().map(|&count| count as f32 / total as f32).collect()
    } else {
        vec![0.0; SIGNATURE_BINS]
    };

    Ok(Signature::from_values(values))
}

/// Crop a detected face out of a frame, clamping the box to the frame bounds.
///
/// Fails with [`SignatureError::InvalidRegion`] when nothing of the box lies
/// inside the frame.
pub fn crop_region(
    frame: &DynamicImage,
    face: &BoundingBox,
) -> Result<DynamicImage, SignatureError> {
    let (frame_w, frame_h) = frame.dimensions();

    let clamp_x = |v: f32| v.round().clamp(0.0, frame_w as f32) as u32;
    let clamp_y = |v: f32| v.round().clamp(0.0, frame_h as f32) as u32;

    let x0 = clamp_x(face.x);
    let y0 = clamp_y(face.y);
    let x1 = clamp_x(face.x + face.width);
    let y1 = clamp_y(face.y + face.height);

    if x1 <= x0 || y1 <= y0 {
        return Err(SignatureError::InvalidRegion {
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        });
    }

    Ok(frame.crop_imm(x0, y0, x1 - x0, y1 - y0))
}
