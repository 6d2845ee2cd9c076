//! Error types shared by the library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while calibrating or undistorting.
#[derive(Error, Debug)]
pub enum DefisheyeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("No such directory: {0}")]
    NoSuchDirectory(PathBuf),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Image size {actual_width}x{actual_height} does not match calibrated size {expected_width}x{expected_height}")]
    SizeMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("No chessboard found in any of the {0} calibration images")]
    NoChessboardFound(usize),
    #[error("Calibration failed: {0}")]
    Calibration(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("FFmpeg binary not found. Please install FFmpeg or place it in assets/ffmpeg/")]
    FfmpegNotFound,
    #[error("FFmpeg failed: {0}")]
    Ffmpeg(String),
    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

pub type Result<T> = std::result::Result<T, DefisheyeError>;
