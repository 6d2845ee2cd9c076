//! Configuration and serialization module.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::calibration::SolverOptions;
use crate::chessboard::{DetectorParams, PatternSize};
use crate::error::{DefisheyeError, Result};
use crate::video::VideoConfig;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "defisheye.json";

/// Inputs of a single calibration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationConfig {
    images: Vec<PathBuf>,
    chessboard_width: u32,
    chessboard_height: u32,
}

impl CalibrationConfig {
    pub fn new(images: Vec<PathBuf>, chessboard_width: u32, chessboard_height: u32) -> Result<Self> {
        if images.is_empty() {
            return Err(DefisheyeError::InvalidArgument(
                "at least one calibration image is required".to_string(),
            ));
        }
        if chessboard_width == 0 {
            return Err(DefisheyeError::InvalidArgument(
                "chessboard width must be positive".to_string(),
            ));
        }
        if chessboard_height == 0 {
            return Err(DefisheyeError::InvalidArgument(
                "chessboard height must be positive".to_string(),
            ));
        }

        Ok(Self {
            images,
            chessboard_width,
            chessboard_height,
        })
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn chessboard_width(&self) -> u32 {
        self.chessboard_width
    }

    pub fn chessboard_height(&self) -> u32 {
        self.chessboard_height
    }

    /// Inner-corner layout of the calibration board.
    pub fn pattern(&self) -> PatternSize {
        PatternSize::new(self.chessboard_width, self.chessboard_height)
    }
}

/// Chessboard dimensions in inner corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessboardConfig {
    /// Inner corners per row.
    pub width: u32,
    /// Rows of inner corners.
    pub height: u32,
}

impl Default for ChessboardConfig {
    fn default() -> Self {
        Self { width: 6, height: 9 }
    }
}

/// Undistortion framing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    /// 0.0 keeps only valid pixels, 1.0 keeps the whole source frame.
    pub balance: f64,
    /// Divides the estimated focal length.
    pub fov_scale: f64,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self {
            balance: 0.0,
            fov_scale: 1.0,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding chessboard photos.
    pub calibration_dir: PathBuf,
    /// Directory holding photos and videos to undistort.
    pub candidate_dir: PathBuf,
    /// Output directory. Temporary files are used when unset.
    pub output_dir: Option<PathBuf>,
    /// Calibration JSON to reuse, or to write after calibrating.
    pub calibration_file: Option<PathBuf>,
    pub chessboard: ChessboardConfig,
    pub detector: DetectorParams,
    pub solver: SolverOptions,
    pub rectify: RectifyConfig,
    pub video: VideoConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            calibration_dir: PathBuf::from("calibration"),
            candidate_dir: PathBuf::from("candidate"),
            output_dir: None,
            calibration_file: None,
            chessboard: ChessboardConfig::default(),
            detector: DetectorParams::default(),
            solver: SolverOptions::default(),
            rectify: RectifyConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve the configuration: working directory first, then the user config dir.
    pub fn load() -> Result<Self> {
        for path in Self::candidate_paths() {
            if path.is_file() {
                log::info!("Loading configuration from {}", path.display());
                return Self::load_from_file(&path);
            }
        }

        log::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(mut dir) = dirs::config_dir() {
            dir.push("defisheye");
            dir.push("config.json");
            paths.push(dir);
        }
        paths
    }

    /// Load and validate a JSON configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&contents)?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Clamp tunables into their valid ranges.
    pub fn sanitize(&mut self) {
        self.rectify.balance = self.rectify.balance.clamp(0.0, 1.0);
        if self.rectify.fov_scale <= 0.0 {
            self.rectify.fov_scale = 1.0;
        }
        self.solver.max_iterations = self.solver.max_iterations.max(1);
    }

    pub fn validate(&self) -> Result<()> {
        if self.chessboard.width == 0 || self.chessboard.height == 0 {
            return Err(DefisheyeError::InvalidArgument(format!(
                "chessboard must have positive dimensions, got {}x{}",
                self.chessboard.width, self.chessboard.height
            )));
        }
        if self.video.frame_rate <= 0.0 {
            return Err(DefisheyeError::InvalidArgument(format!(
                "video frame rate must be positive, got {}",
                self.video.frame_rate
            )));
        }
        Ok(())
    }

    pub fn pattern(&self) -> PatternSize {
        PatternSize::new(self.chessboard.width, self.chessboard.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.calibration_dir, PathBuf::from("calibration"));
        assert_eq!(config.candidate_dir, PathBuf::from("candidate"));
        assert_eq!(config.chessboard, ChessboardConfig { width: 6, height: 9 });
        assert_eq!(config.rectify.balance, 0.0);
        assert!(config.output_dir.is_none());
    }

    #[test]
    fn test_calibration_config_validation() {
        let images = vec![PathBuf::from("a.jpg")];
        assert!(CalibrationConfig::new(images.clone(), 6, 9).is_ok());
        assert!(CalibrationConfig::new(Vec::new(), 6, 9).is_err());
        assert!(CalibrationConfig::new(images.clone(), 0, 9).is_err());
        assert!(CalibrationConfig::new(images, 6, 0).is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defisheye.json");
        fs::write(
            &path,
            r#"{ "candidate_dir": "photos", "chessboard": { "width": 7, "height": 5 }, "rectify": { "balance": 3.0 } }"#,
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.candidate_dir, PathBuf::from("photos"));
        assert_eq!(config.calibration_dir, PathBuf::from("calibration"));
        assert_eq!(config.pattern(), PatternSize::new(7, 5));
        assert_eq!(config.rectify.balance, 1.0);
        assert_eq!(config.rectify.fov_scale, 1.0);
    }

    #[test]
    fn test_partial_chessboard_keeps_other_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defisheye.json");
        fs::write(&path, r#"{ "chessboard": { "width": 7 } }"#).unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.chessboard, ChessboardConfig { width: 7, height: 9 });
    }

    #[test]
    fn test_invalid_chessboard_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defisheye.json");
        fs::write(&path, r#"{ "chessboard": { "width": 0, "height": 9 } }"#).unwrap();

        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(DefisheyeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.output_dir = Some(PathBuf::from("out"));
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.output_dir, config.output_dir);
        assert_eq!(loaded.chessboard, config.chessboard);
        assert_eq!(loaded.solver.max_iterations, config.solver.max_iterations);
        assert_eq!(loaded.video.filter, config.video.filter);
    }
}
