//! vigil-hw — Hardware abstraction for camera capture and audible alerts.
//!
//! Provides V4L2-based camera access, RGB frame handling, and the sounder
//! abstraction used for alarm pulses and the send-confirmation tone.

pub mod camera;
pub mod frame;
pub mod tone;

pub use camera::{Camera, CameraError, CaptureSession};
pub use frame::Frame;
pub use tone::{AudioSounder, Sounder};
