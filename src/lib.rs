//! Fisheye Lens Undistortion
//!
//! Calibrates a fisheye camera from chessboard photos and removes the lens
//! distortion from photos and videos:
//! - Chessboard corner detection (pure Rust, or OpenCV with the `opencv` feature)
//! - Kannala-Brandt fisheye calibration by Levenberg-Marquardt
//! - Undistortion maps with bilinear remapping
//! - FFmpeg pipes for video

pub mod app;
pub mod calibration;
pub mod camera;
pub mod chessboard;
pub mod config;
pub mod error;
pub mod export;
pub mod io;
pub mod video;

#[cfg(test)]
mod test_support;

pub use error::{DefisheyeError, Result};
