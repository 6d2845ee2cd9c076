//! Application driver: calibrate once, then undistort every candidate.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::calibration::{CalibrationOptions, CameraCalibration, FisheyeCameraCalibration};
use crate::config::{AppConfig, CalibrationConfig};
use crate::error::DefisheyeError;
use crate::export::CalibrationFile;
use crate::io::{create_temporary_file, is_video, list_directory, output_path_for, resolve_images, save_image};

const OUTPUT_PREFIX: &str = "undistorted";

pub struct App {
    config: AppConfig,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Undistort every image and video of the candidate directory and return
    /// the written files.
    pub fn run(&self) -> anyhow::Result<Vec<PathBuf>> {
        let calibration = self.calibration()?;

        let candidates = list_directory(&self.config.candidate_dir).with_context(|| {
            format!(
                "Failed to list candidates in {}",
                self.config.candidate_dir.display()
            )
        })?;
        let (videos, images): (Vec<PathBuf>, Vec<PathBuf>) =
            candidates.into_iter().partition(|path| is_video(path));

        let mut outputs = Vec::new();
        for (path, image) in resolve_images(&images) {
            let undistorted = match calibration.undistort(&image) {
                Ok(undistorted) => undistorted,
                Err(e @ DefisheyeError::SizeMismatch { .. }) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => return Err(e).with_context(|| format!("Failed to undistort {}", path.display())),
            };

            let destination = self.output_path(&path, "jpg")?;
            save_image(&undistorted, &destination)?;
            log::info!("Undistorted {} -> {}", path.display(), destination.display());
            outputs.push(destination);
        }

        for path in videos {
            let destination = self.output_path(&path, "mp4")?;
            match calibration.undistort_video(&path, &destination) {
                Ok(()) => outputs.push(destination),
                Err(e) => {
                    log::warn!("Skipping video {}: {}", path.display(), e);
                    if self.config.output_dir.is_none() {
                        let _ = fs::remove_file(&destination);
                    }
                }
            }
        }

        Ok(outputs)
    }

    /// Reuse the saved calibration when there is one, otherwise calibrate from
    /// the chessboard photos (and save the result if a file is configured).
    fn calibration(&self) -> anyhow::Result<FisheyeCameraCalibration> {
        let options = CalibrationOptions::from(&self.config);

        if let Some(path) = self.config.calibration_file.as_deref().filter(|p| p.is_file()) {
            log::info!("Loading calibration from {}", path.display());
            let file = CalibrationFile::load(path)
                .with_context(|| format!("Failed to load calibration {}", path.display()))?;
            return Ok(FisheyeCameraCalibration::from_calibration_file(&file, options.video)?);
        }

        let images = list_directory(&self.config.calibration_dir).with_context(|| {
            format!(
                "Failed to list calibration images in {}",
                self.config.calibration_dir.display()
            )
        })?;
        log::info!(
            "Calibrating from {} images in {}",
            images.len(),
            self.config.calibration_dir.display()
        );

        let calibration_config = CalibrationConfig::new(
            images,
            self.config.chessboard.width,
            self.config.chessboard.height,
        )?;
        let calibration = FisheyeCameraCalibration::new(&calibration_config, &options)
            .context("Calibration failed")?;

        if let Some(path) = &self.config.calibration_file {
            calibration
                .calibration_file()
                .save_json(path)
                .with_context(|| format!("Failed to save calibration to {}", path.display()))?;
            log::info!("Saved calibration to {}", path.display());
        }

        Ok(calibration)
    }

    fn output_path(&self, source: &Path, extension: &str) -> anyhow::Result<PathBuf> {
        match &self.config.output_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                Ok(output_path_for(dir, source, OUTPUT_PREFIX, extension))
            }
            None => Ok(create_temporary_file(OUTPUT_PREFIX, &format!(".{}", extension))?),
        }
    }
}
