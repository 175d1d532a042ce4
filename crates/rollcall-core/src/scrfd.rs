//! SCRFD face detector via ONNX Runtime.
//!
//! Optional [`FaceDetector`] backend for full camera frames (feature `scrfd`).
//! Decodes the three anchor-free stride heads and applies NMS; landmarks are
//! not needed for histogram signatures and are ignored.

use crate::detector::{DetectorError, FaceDetector};
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

// --- Named constants ---
const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
/// Model file name expected inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// Scale and padding applied when fitting a frame into the square input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let input = SCRFD_INPUT_SIZE as f32;
        let scale = (input / width as f32).min(input / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((SCRFD_INPUT_SIZE as f32 - new_w) / 2.0).floor(),
            pad_y: ((SCRFD_INPUT_SIZE as f32 - new_h) / 2.0).floor(),
        }
    }

    /// Map a point from model input space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub struct ScrfdDetector {
    session: Session,
    /// Score and bbox output indices per stride.
    heads: [(usize, usize); 3],
}

impl ScrfdDetector {
    /// Load the SCRFD model from a file.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                names.len()
            )));
        }

        let heads = output_heads(&names);
        tracing::info!(
            path = %model_path.display(),
            outputs = ?names,
            ?heads,
            "loaded SCRFD model"
        );

        Ok(Self { session, heads })
    }

    /// Letterbox a grayscale frame into a normalized NCHW tensor.
    fn preprocess(gray: &GrayImage, letterbox: &Letterbox) -> Array4<f32> {
        let size = SCRFD_INPUT_SIZE as usize;
        let new_w = (gray.width() as f32 * letterbox.scale).round() as u32;
        let new_h = (gray.height() as f32 * letterbox.scale).round() as u32;
        let resized = imageops::resize(gray, new_w.max(1), new_h.max(1), FilterType::Triangle);

        let (pad_x, pad_y) = (letterbox.pad_x as u32, letterbox.pad_y as u32);
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, Luma([value])) in resized.enumerate_pixels() {
            let (tx, ty) = ((x + pad_x) as usize, (y + pad_y) as usize);
            if tx >= size || ty >= size {
                continue;
            }
            let normalized = (*value as f32 - SCRFD_MEAN) / SCRFD_STD;
            for channel in 0..3 {
                tensor[[0, channel, ty, tx]] = normalized;
            }
        }
        tensor
    }
}

impl FaceDetector for ScrfdDetector {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let expected = width as usize * height as usize;
        let pixels = gray.get(..expected).unwrap_or(gray).to_vec();
        let frame: GrayImage =
            ImageBuffer::from_raw(width, height, pixels).ok_or(DetectorError::InvalidFrame {
                expected,
                actual: gray.len(),
            })?;
        if expected == 0 {
            return Ok(Vec::new());
        }

        let letterbox = Letterbox::fit(width, height);
        let input = Self::preprocess(&frame, &letterbox);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        for (&stride, &(score_idx, bbox_idx)) in SCRFD_STRIDES.iter().zip(self.heads.iter()) {
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
                })?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
                })?;
            detections.extend(decode_stride(scores, bboxes, stride, &letterbox));
        }

        Ok(nms(detections, SCRFD_NMS_THRESHOLD))
    }
}

/// Find score/bbox outputs by name (`score_8`, `bbox_8`, ...), falling back to
/// the standard positional layout `[scores 8/16/32, bboxes 8/16/32, ...]`.
fn output_heads(names: &[String]) -> [(usize, usize); 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let mut heads = [(0, 3), (1, 4), (2, 5)];
    for (slot, &stride) in heads.iter_mut().zip(SCRFD_STRIDES.iter()) {
        match (find("score", stride), find("bbox", stride)) {
            (Some(score), Some(bbox)) => *slot = (score, bbox),
            _ => return [(0, 3), (1, 4), (2, 5)],
        }
    }
    heads
}

/// Decode the detections of one stride head above the confidence threshold.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE as usize / stride;
    let step = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score > SCRFD_CONFIDENCE_THRESHOLD)
        .filter_map(|(idx, &score)| {
            let offsets = bboxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid_w) as f32 * step;
            let cy = (cell / grid_w) as f32 * step;

            let (x1, y1) = letterbox.unmap(cx - offsets[0] * step, cy - offsets[1] * step);
            let (x2, y2) = letterbox.unmap(cx + offsets[2] * step, cy + offsets[3] * step);
            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Non-maximum suppression; output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
