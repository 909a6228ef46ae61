//! Frame type and pixel conversion — YUYV to RGB, ARGB packing, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Interleaved RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Average luma (0.0–255.0), BT.601 weights.
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .data
            .chunks_exact(3)
            .map(|px| 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
            .sum();
        sum / (self.data.len() / 3) as f32
    }

    /// Pack RGB pixels into `0RGB` u32 values for a preview framebuffer.
    pub fn to_argb(&self) -> Vec<u32> {
        self.data
            .chunks_exact(3)
            .map(|px| ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32)
            .collect()
    }

    /// Encode the frame as JPEG bytes (quality 85).
    pub fn encode_jpeg(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 85)
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| FrameError::EncodeFailed(e.to_string()))?;
        Ok(buf)
    }
}

/// Convert packed YUYV (4:2:2) to interleaved RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]. Both pixels share
/// the chroma pair. Uses the BT.601 full-range conversion.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for &y in &[quad[0], quad[2]] {
            let y = y as f32;
            let r = y + 1.402 * v;
            let g = y - 0.344 * u - 0.714 * v;
            let b = y + 1.772 * u;
            rgb.push(r.round().clamp(0.0, 255.0) as u8);
            rgb.push(g.round().clamp(0.0, 255.0) as u8);
            rgb.push(b.round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    EncodeFailed(String),
}
