//! MoveNet single-pose detector via ONNX Runtime.
//!
//! Runs the MoveNet Lightning single-person model (float ONNX export)
//! and decodes its `[1, 1, 17, 3]` (y, x, score) output into frame-space
//! keypoints, then applies the presence rule: a person is present when
//! enough keypoints clear the confidence threshold.

use crate::types::{Keypoint, PoseDetection, KEYPOINT_COUNT};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const POSE_INPUT_SIZE: usize = 192;
const KEYPOINT_SCORE_THRESHOLD: f32 = 0.30;
const MIN_CONFIDENT_KEYPOINTS: usize = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — export MoveNet Lightning to ONNX and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// MoveNet-based single-person pose detector.
pub struct PoseDetector {
    session: Session,
    input_size: usize,
}

impl PoseDetector {
    /// Load the MoveNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "loaded MoveNet model"
        );

        Ok(Self {
            session,
            input_size: POSE_INPUT_SIZE,
        })
    }

    /// Run pose inference on one RGB frame.
    ///
    /// Returns `Some(PoseDetection)` when a person is present, `None`
    /// otherwise. Exactly one presence decision per frame; the model is
    /// single-pose, so multiple subjects collapse into one detection.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<PoseDetection>, DetectorError> {
        check_frame_len(rgb.len(), width as usize, height as usize)?;
        let (input, letterbox) = self.preprocess(rgb, width as usize, height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("keypoint tensor: {e}")))?;

        if raw.len() < KEYPOINT_COUNT * 3 {
            return Err(DetectorError::InferenceFailed(format!(
                "expected {} output values (17 keypoints × y/x/score), got {}",
                KEYPOINT_COUNT * 3,
                raw.len()
            )));
        }

        let keypoints = decode_keypoints(raw, self.input_size, &letterbox);
        Ok(presence(keypoints))
    }

    /// Preprocess an RGB frame into a NHWC float tensor with letterbox padding.
    ///
    /// MoveNet takes `[1, 192, 192, 3]` with pixel values in 0–255.
    /// Bilinear resize preserves limb edges at the small input size.
    fn preprocess(&self, rgb: &[u8], width: usize, height: usize) -> (Array4<f32>, LetterboxInfo) {
        let size = self.input_size;
        let scale_w = size as f32 / width as f32;
        let scale_h = size as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = (width as f32 * scale).round() as usize;
        let new_h = (height as f32 * scale).round() as usize;
        let pad_x = (size - new_w) as f32 / 2.0;
        let pad_y = (size - new_h) as f32 / 2.0;

        let letterbox = LetterboxInfo { scale, pad_x, pad_y };

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;
        let inv_scale = 1.0 / scale;

        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));

        for y in 0..new_h {
            let src_y = (y as f32 + 0.5) * inv_scale - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
            let y1 = (y0 + 1).min(height - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for x in 0..new_w {
                let src_x = (x as f32 + 0.5) * inv_scale - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
                let x1 = (x0 + 1).min(width - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                for c in 0..3 {
                    let tl = rgb[(y0 * width + x0) * 3 + c] as f32;
                    let tr = rgb[(y0 * width + x1) * 3 + c] as f32;
                    let bl = rgb[(y1 * width + x0) * 3 + c] as f32;
                    let br = rgb[(y1 * width + x1) * 3 + c] as f32;

                    let val = tl * (1.0 - fx) * (1.0 - fy)
                        + tr * fx * (1.0 - fy)
                        + bl * (1.0 - fx) * fy
                        + br * fx * fy;

                    tensor[[0, pad_y_start + y, pad_x_start + x, c]] = val;
                }
            }
        }

        (tensor, letterbox)
    }
}

/// Validate that the RGB buffer covers the full frame before `preprocess`
/// indexes into it.
fn check_frame_len(actual: usize, width: usize, height: usize) -> Result<(), DetectorError> {
    let expected = width * height * 3;
    if actual < expected {
        return Err(DetectorError::InvalidFrame { expected, actual });
    }
    Ok(())
}

/// Decode a flat `[y, x, score]` keypoint tensor into frame coordinates.
///
/// MoveNet outputs coordinates normalized to the letterboxed input
/// square; de-map through the letterbox to original frame space.
fn decode_keypoints(raw: &[f32], input_size: usize, letterbox: &LetterboxInfo) -> Vec<Keypoint> {
    let mut keypoints = Vec::with_capacity(KEYPOINT_COUNT);

    for i in 0..KEYPOINT_COUNT {
        let off = i * 3;
        let y_norm = raw[off];
        let x_norm = raw[off + 1];
        let score = raw[off + 2];

        let x_px = x_norm * input_size as f32;
        let y_px = y_norm * input_size as f32;

        keypoints.push(Keypoint {
            x: (x_px - letterbox.pad_x) / letterbox.scale,
            y: (y_px - letterbox.pad_y) / letterbox.scale,
            score,
        });
    }

    keypoints
}

/// Apply the presence rule: a person is present when at least
/// `MIN_CONFIDENT_KEYPOINTS` keypoints score at or above the threshold.
fn presence(keypoints: Vec<Keypoint>) -> Option<PoseDetection> {
    let confident: Vec<f32> = keypoints
        .iter()
        .filter(|k| k.score >= KEYPOINT_SCORE_THRESHOLD)
        .map(|k| k.score)
        .collect();

    if confident.len() < MIN_CONFIDENT_KEYPOINTS {
        return None;
    }

    let score = confident.iter().sum::<f32>() / confident.len() as f32;
    Some(PoseDetection { keypoints, score })
}
