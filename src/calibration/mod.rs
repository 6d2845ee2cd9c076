//! Fisheye camera calibration and undistortion.

mod homography;
mod rectify;
mod solver;

use std::path::Path;

use image::RgbImage;
use nalgebra::{Matrix3, Point2};
use rayon::prelude::*;

use crate::chessboard::{default_detector, find_chessboard, CornerDetector, DetectorParams};
use crate::camera::FisheyeIntrinsics;
use crate::config::{AppConfig, CalibrationConfig, RectifyConfig};
use crate::error::{DefisheyeError, Result};
use crate::export::CalibrationFile;
use crate::io::{load_image, save_image};
use crate::video::{transform_video, FfmpegWrapper, VideoConfig};

pub use homography::Homography;
pub use rectify::{estimate_new_camera_matrix, remap, UndistortMaps};
pub use solver::{calibrate_fisheye, FisheyeCalibration, SolverOptions};

/// Something that can remove lens distortion from photos and videos.
pub trait CameraCalibration {
    fn undistort_image(&self, source: &Path, destination: &Path) -> Result<()>;
    fn undistort_video(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// Tunables of a calibration run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationOptions {
    pub detector: DetectorParams,
    pub solver: SolverOptions,
    pub rectify: RectifyConfig,
    pub video: VideoConfig,
}

impl From<&AppConfig> for CalibrationOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            detector: config.detector.clone(),
            solver: config.solver,
            rectify: config.rectify,
            video: config.video.clone(),
        }
    }
}

/// Calibrated fisheye camera with precomputed undistortion maps.
pub struct FisheyeCameraCalibration {
    file: CalibrationFile,
    maps: UndistortMaps,
    video: VideoConfig,
}

impl FisheyeCameraCalibration {
    /// Calibrate from the chessboard photos of `config`.
    pub fn new(config: &CalibrationConfig, options: &CalibrationOptions) -> Result<Self> {
        let detector = default_detector(&options.detector);
        Self::with_detector(config, options, detector.as_ref())
    }

    pub fn with_detector(
        config: &CalibrationConfig,
        options: &CalibrationOptions,
        detector: &dyn CornerDetector,
    ) -> Result<Self> {
        let images = config
            .images()
            .iter()
            .map(|path| load_image(path))
            .collect::<Result<Vec<_>>>()?;
        let (width, height) = validate_image_sizes(&images)?;

        let pattern = config.pattern();
        let detections = config
            .images()
            .par_iter()
            .zip(images.par_iter())
            .map(|(path, image)| {
                let corners = find_chessboard(detector, image, pattern)?;
                match &corners {
                    Some(_) => log::info!("Chessboard found in {}", path.display()),
                    None => log::warn!("No chessboard found in {}", path.display()),
                }
                Ok(corners)
            })
            .collect::<Result<Vec<Option<Vec<Point2<f64>>>>>>()?;

        let image_points: Vec<Vec<Point2<f64>>> = detections.into_iter().flatten().collect();
        if image_points.is_empty() {
            return Err(DefisheyeError::NoChessboardFound(images.len()));
        }
        let object_points = vec![pattern.object_points(); image_points.len()];

        let calibration = calibrate_fisheye(&object_points, &image_points, (width, height), &options.solver)?;
        let new_camera_matrix = estimate_new_camera_matrix(
            &calibration.intrinsics,
            (width, height),
            options.rectify.balance,
            options.rectify.fov_scale,
        )?;

        let file = CalibrationFile::new(&calibration, &new_camera_matrix);
        Self::from_calibration_file(&file, options.video.clone())
    }

    /// Rebuild the undistortion maps of a saved calibration.
    pub fn from_calibration_file(file: &CalibrationFile, video: VideoConfig) -> Result<Self> {
        let maps = UndistortMaps::new(
            &file.intrinsics(),
            &file.new_camera_matrix(),
            &Matrix3::identity(),
            (file.image_width, file.image_height),
        )?;

        Ok(Self {
            file: file.clone(),
            maps,
            video,
        })
    }

    pub fn intrinsics(&self) -> FisheyeIntrinsics {
        self.file.intrinsics()
    }

    pub fn new_camera_matrix(&self) -> Matrix3<f64> {
        self.file.new_camera_matrix()
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.file.image_width, self.file.image_height)
    }

    pub fn calibration_file(&self) -> &CalibrationFile {
        &self.file
    }

    /// Remap an image of the calibrated size.
    pub fn undistort(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = self.image_size();
        if image.width() != width || image.height() != height {
            return Err(DefisheyeError::SizeMismatch {
                expected_width: width,
                expected_height: height,
                actual_width: image.width(),
                actual_height: image.height(),
            });
        }
        Ok(remap(image, &self.maps))
    }
}

impl CameraCalibration for FisheyeCameraCalibration {
    fn undistort_image(&self, source: &Path, destination: &Path) -> Result<()> {
        let image = load_image(source)?;
        let undistorted = self.undistort(&image)?;
        save_image(&undistorted, destination)
    }

    fn undistort_video(&self, source: &Path, destination: &Path) -> Result<()> {
        let ffmpeg = FfmpegWrapper::new()?;
        let frames = transform_video(&ffmpeg, source, destination, &self.video, |_, frame| {
            self.undistort(&frame)
        })?;
        log::info!("Undistorted {} frames of {}", frames, source.display());
        Ok(())
    }
}

/// All calibration images must share one size.
fn validate_image_sizes(images: &[RgbImage]) -> Result<(u32, u32)> {
    let first = images.first().ok_or_else(|| {
        DefisheyeError::InvalidArgument("no calibration images".to_string())
    })?;
    let (width, height) = first.dimensions();

    if let Some(other) = images
        .iter()
        .skip(1)
        .find(|image| image.width() != width || image.height() != height)
    {
        return Err(DefisheyeError::SizeMismatch {
            expected_width: width,
            expected_height: height,
            actual_width: other.width(),
            actual_height: other.height(),
        });
    }
    Ok((width, height))
}
