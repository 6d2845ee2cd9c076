//! Frame-by-frame video processing through ffmpeg pipes.

mod ffmpeg;

use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use ffmpeg::{FfmpegWrapper, FrameReader, FrameWriter, VideoInfo};

/// Output encoding of undistorted videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// ffmpeg filter graph applied to the processed frames.
    pub filter: String,
    /// Output frames per second.
    pub frame_rate: f64,
    /// Encoder quality passed as `-q:v`.
    pub quality: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            filter: "tmix=frames=3,framestep=step=6".to_string(),
            frame_rate: 5.0,
            quality: 0,
        }
    }
}

/// Decode `source`, pass every frame through `process` and encode the result
/// into `destination`. Returns the number of frames processed.
pub fn transform_video<F>(
    ffmpeg: &FfmpegWrapper,
    source: &Path,
    destination: &Path,
    config: &VideoConfig,
    mut process: F,
) -> Result<u64>
where
    F: FnMut(&VideoInfo, RgbImage) -> Result<RgbImage>,
{
    let info = ffmpeg.get_video_info(source)?;
    log::info!(
        "Processing {} ({}x{} {} at {:.2} fps)",
        source.display(),
        info.width,
        info.height,
        info.codec,
        info.frame_rate
    );

    let mut reader = ffmpeg.open_reader(source, &info)?;
    let mut writer = ffmpeg.open_writer(destination, &info, config)?;

    let mut frames = 0u64;
    while let Some(frame) = reader.read_frame()? {
        let processed = process(&info, frame)?;
        writer.write_frame(&processed)?;
        frames += 1;
    }

    reader.finish()?;
    writer.finish()?;

    log::debug!("Wrote {} frames to {}", frames, destination.display());
    Ok(frames)
}
