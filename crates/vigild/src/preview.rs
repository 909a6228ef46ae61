//! Live preview window with pose overlay.
//!
//! Presentation only: shows each frame with the detected skeleton drawn
//! over it and turns a `Q` key press (or window close) into a graceful
//! shutdown request.

use minifb::{Key, Window, WindowOptions};
use thiserror::Error;
use vigil_core::{PoseDetection, SKELETON};
use vigil_hw::Frame;

const WINDOW_TITLE: &str = "Vigil — presence monitor (Q to quit)";
const TARGET_FPS: usize = 30;
/// Keypoints below this score are not drawn.
const OVERLAY_MIN_SCORE: f32 = 0.30;
const BONE_COLOR: u32 = 0x0000_E060;
const JOINT_COLOR: u32 = 0x00FF_4040;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("failed to open preview window: {0}")]
    Open(String),
}

pub struct Preview {
    window: Window,
    width: usize,
    height: usize,
}

impl Preview {
    pub fn open(width: u32, height: u32) -> Result<Self, PreviewError> {
        let width = width as usize;
        let height = height as usize;
        let mut window = Window::new(WINDOW_TITLE, width, height, WindowOptions::default())
            .map_err(|e| PreviewError::Open(e.to_string()))?;
        window.set_target_fps(TARGET_FPS);
        Ok(Self {
            window,
            width,
            height,
        })
    }

    /// Render one frame with its overlay. Returns true when the user
    /// requested shutdown (Q pressed or window closed). Render failures
    /// are logged and also treated as a shutdown request: a monitor
    /// without its preview surface was asked to have one.
    pub fn render(&mut self, frame: &Frame, pose: Option<&PoseDetection>) -> bool {
        let mut buffer = frame.to_argb();
        if let Some(pose) = pose {
            draw_pose(&mut buffer, self.width, self.height, pose);
        }

        if let Err(e) = self
            .window
            .update_with_buffer(&buffer, self.width, self.height)
        {
            tracing::warn!(error = %e, "preview update failed");
            return true;
        }

        !self.window.is_open() || self.window.is_key_down(Key::Q)
    }
}

/// Draw the skeleton edges and keypoint markers into an ARGB buffer.
fn draw_pose(buffer: &mut [u32], width: usize, height: usize, pose: &PoseDetection) {
    for &(a, b) in SKELETON.iter() {
        let (Some(ka), Some(kb)) = (pose.keypoints.get(a), pose.keypoints.get(b)) else {
            continue;
        };
        if ka.score < OVERLAY_MIN_SCORE || kb.score < OVERLAY_MIN_SCORE {
            continue;
        }
        draw_line(
            buffer,
            width,
            height,
            (ka.x as i32, ka.y as i32),
            (kb.x as i32, kb.y as i32),
            BONE_COLOR,
        );
    }

    for kp in &pose.keypoints {
        if kp.score < OVERLAY_MIN_SCORE {
            continue;
        }
        draw_marker(buffer, width, height, kp.x as i32, kp.y as i32, JOINT_COLOR);
    }
}

/// Bresenham line, clipped to the buffer.
fn draw_line(
    buffer: &mut [u32],
    width: usize,
    height: usize,
    from: (i32, i32),
    to: (i32, i32),
    color: u32,
) {
    let (mut x, mut y) = from;
    let (x1, y1) = to;
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel(buffer, width, height, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// 3x3 filled square marker.
fn draw_marker(buffer: &mut [u32], width: usize, height: usize, cx: i32, cy: i32, color: u32) {
    for y in cy - 1..=cy + 1 {
        for x in cx - 1..=cx + 1 {
            put_pixel(buffer, width, height, x, y, color);
        }
    }
}

fn put_pixel(buffer: &mut [u32], width: usize, height: usize, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
        return;
    }
    buffer[y as usize * width + x as usize] = color;
}
