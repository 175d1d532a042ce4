//! Face detection seam.
//!
//! Localization is supplied from outside the core; anything that can turn a
//! grayscale frame into bounding boxes plugs in through [`FaceDetector`].

use crate::types::BoundingBox;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; place det_10g.onnx in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[cfg(feature = "scrfd")]
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Pluggable face localization backend.
pub trait FaceDetector {
    /// Detect faces in a row-major grayscale buffer of `width` × `height` bytes.
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError>;

    /// Convenience wrapper: convert any image to grayscale and detect.
    fn detect_image(&mut self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let gray = image.to_luma8();
        self.detect(gray.as_raw(), gray.width(), gray.height())
    }
}

impl<D: FaceDetector + ?Sized> FaceDetector for &mut D {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        (**self).detect(gray, width, height)
    }
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        (**self).detect(gray, width, height)
    }
}

/// Treats the whole frame as a single face.
///
/// For reference photos and probes that are already tight face crops.
#[derive(Debug, Default, Clone, Copy)]
pub struct WholeFrameDetector;

impl FaceDetector for WholeFrameDetector {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let expected = width as usize * height as usize;
        if gray.len() < expected {
            return Err(DetectorError::InvalidFrame {
                expected,
                actual: gray.len(),
            });
        }
        if expected == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![BoundingBox::new(0.0, 0.0, width as f32, height as f32)])
    }
}

/// Pick the face with the largest area. Ties go to the earliest detection.
pub fn largest_face(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    faces.iter().fold(None, |best: Option<&BoundingBox>, face| match best {
        Some(b) if face.area() <= b.area() => Some(b),
        _ => Some(face),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_largest_face_picks_max_area() {
        let faces = vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(5.0, 5.0, 20.0, 20.0),
            BoundingBox::new(50.0, 50.0, 15.0, 15.0),
        ];
        let best = largest_face(&faces).unwrap();
        assert_eq!(best.area(), 400.0);
        assert_eq!(best.x, 5.0);
    }

    #[test]
    fn test_largest_face_tie_keeps_first() {
        let faces = vec![
            BoundingBox::new(0.0, 0.0, 10.0, 40.0),
            BoundingBox::new(90.0, 0.0, 20.0, 20.0),
        ];
        assert_eq!(largest_face(&faces).unwrap().x, 0.0);
    }

    #[test]
    fn test_largest_face_empty() {
        assert!(largest_face(&[]).is_none());
    }

    #[test]
    fn test_whole_frame_detector() {
        let gray = vec![0u8; 6];
        let faces = WholeFrameDetector.detect(&gray, 3, 2).unwrap();
        assert_eq!(faces, vec![BoundingBox::new(0.0, 0.0, 3.0, 2.0)]);
    }

    #[test]
    fn test_whole_frame_detector_empty_frame() {
        assert!(WholeFrameDetector.detect(&[], 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_whole_frame_detector_short_buffer() {
        let result = WholeFrameDetector.detect(&[0u8; 4], 3, 2);
        assert!(matches!(
            result,
            Err(DetectorError::InvalidFrame { expected: 6, actual: 4 })
        ));
    }
}
