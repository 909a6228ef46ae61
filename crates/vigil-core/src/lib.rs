//! vigil-core — Single-person pose detection.
//!
//! Runs a MoveNet-style keypoint model via ONNX Runtime for CPU
//! inference and reduces its output to one presence boolean per frame.

pub mod detector;
pub mod types;

pub use detector::{DetectorError, PoseDetector};
pub use types::{Keypoint, PoseDetection, SKELETON};
