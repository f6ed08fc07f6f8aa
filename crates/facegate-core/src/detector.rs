//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the image to 640×640, decodes the three anchor-free stride
//! heads (scores, boxes, five keypoints), and merges them with NMS.

use crate::frame::{self, Frame};
use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download det_10g.onnx from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Tunables for SCRFD post-processing.
#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    /// Minimum anchor score for a detection to be kept.
    pub confidence_threshold: f32,
    /// IoU above which the weaker of two boxes is suppressed.
    pub nms_threshold: f32,
    /// Faces whose shorter side is below this (in source pixels) are dropped.
    pub min_face_size: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
            min_face_size: 0.0,
        }
    }
}

/// Anything that can find faces in a frame.
///
/// Implementations return faces sorted by descending confidence.
pub trait Detect {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    options: DetectorOptions,
    /// Per-stride output indices for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path, options: DetectorOptions) -> Result<Self, DetectorError> {
        if !model_path.is_file() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            ?options,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            options,
            stride_indices,
        })
    }

    /// Resize into the 640×640 letterbox and normalize to a NCHW tensor.
    fn preprocess(frame: &Frame) -> (Array4<f32>, LetterboxInfo) {
        let width = frame.width as usize;
        let height = frame.height as usize;
        let scale = (SCRFD_INPUT_SIZE as f32 / width as f32).min(SCRFD_INPUT_SIZE as f32 / height as f32);

        let new_w = ((width as f32 * scale).round() as usize).clamp(1, SCRFD_INPUT_SIZE);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, SCRFD_INPUT_SIZE);
        let pad_x = (SCRFD_INPUT_SIZE - new_w) as f32 / 2.0;
        let pad_y = (SCRFD_INPUT_SIZE - new_h) as f32 / 2.0;

        let resized = frame::resize_bilinear(&frame.data, width, height, new_w, new_h);

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));

        for y in 0..SCRFD_INPUT_SIZE {
            for x in 0..SCRFD_INPUT_SIZE {
                let inside = (pad_y_start..pad_y_start + new_h).contains(&y)
                    && (pad_x_start..pad_x_start + new_w).contains(&x);
                let pixel = if inside {
                    resized[(y - pad_y_start) * new_w + (x - pad_x_start)] as f32
                } else {
                    SCRFD_MEAN // padding normalizes to 0.0
                };

                let normalized = (pixel - SCRFD_MEAN) / SCRFD_STD;
                // Grayscale replicated into R, G, B
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

impl Detect for FaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError> {
        if frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = Self::preprocess(frame);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            all_detections.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                &letterbox,
                self.options.confidence_threshold,
            ));
        }

        let faces = finalize(all_detections, &self.options);

        tracing::debug!(
            source = ?frame.source,
            count = faces.len(),
            best = faces.first().map(|f| f.confidence),
            "detection finished"
        );

        Ok(faces)
    }
}

/// Map SCRFD output tensors to stride slots.
///
/// Exports named "score_8", "bbox_16", "kps_32", ... are matched by name.
/// Anything else uses the standard positional ordering:
///   [0-2] = scores, [3-5] = bboxes, [6-8] = kps (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named.as_deref() {
        Some(&[s8, s16, s32]) => [s8, s16, s32],
        _ => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Decode detections for a single stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let unmap = |x: f32, y: f32| -> (f32, f32) {
        (
            (x - letterbox.pad_x) / letterbox.scale,
            (y - letterbox.pad_y) / letterbox.scale,
        )
    };

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (cell % grid_w) as f32 * step;
        let anchor_cy = (cell / grid_w) as f32 * step;

        let Some(off) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let (x1, y1) = unmap(anchor_cx - off[0] * step, anchor_cy - off[1] * step);
        let (x2, y2) = unmap(anchor_cx + off[2] * step, anchor_cy + off[3] * step);

        let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| unmap(anchor_cx + k[i * 2] * step, anchor_cy + k[i * 2 + 1] * step))
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// NMS, then drop faces whose shorter side is below `min_face_size`.
fn finalize(detections: Vec<BoundingBox>, options: &DetectorOptions) -> Vec<BoundingBox> {
    nms(detections, options.nms_threshold)
        .into_iter()
        .filter(|f| f.width.min(f.height) >= options.min_face_size)
        .collect()
}

/// Non-Maximum Suppression. Output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}
