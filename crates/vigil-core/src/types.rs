use serde::{Deserialize, Serialize};

/// One detected body keypoint in frame coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Model confidence for this keypoint, [0, 1].
    pub score: f32,
}

/// A detected human pose: all 17 COCO keypoints plus an overall score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseDetection {
    pub keypoints: Vec<Keypoint>,
    /// Mean score of the keypoints that cleared the confidence threshold.
    pub score: f32,
}

/// COCO-17 keypoint ordering as produced by MoveNet.
pub const KEYPOINT_COUNT: usize = 17;

/// Skeleton edges over the COCO-17 keypoints, used by the preview overlay.
///
/// Indices: 0 nose, 1/2 eyes, 3/4 ears, 5/6 shoulders, 7/8 elbows,
/// 9/10 wrists, 11/12 hips, 13/14 knees, 15/16 ankles.
pub const SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];
