//! Persistence of calibration results.

use std::fs;
use std::path::Path;

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::calibration::FisheyeCalibration;
use crate::camera::FisheyeIntrinsics;
use crate::error::{DefisheyeError, Result};

/// Calibration saved to disk so later runs can skip chessboard detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub image_width: u32,
    pub image_height: u32,
    /// Row-major 3x3 camera matrix.
    pub camera_matrix: [[f64; 3]; 3],
    /// Fisheye coefficients k1..k4.
    pub distortion: [f64; 4],
    /// Row-major camera matrix of the undistorted output.
    pub new_camera_matrix: [[f64; 3]; 3],
    /// RMS reprojection error in pixels.
    pub rms: f64,
    /// Number of chessboard views used.
    pub views_used: usize,
}

fn to_rows(matrix: &Matrix3<f64>) -> [[f64; 3]; 3] {
    let mut rows = [[0.0; 3]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = matrix[(r, c)];
        }
    }
    rows
}

fn from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|r, c| rows[r][c])
}

impl CalibrationFile {
    pub fn new(calibration: &FisheyeCalibration, new_camera_matrix: &Matrix3<f64>) -> Self {
        Self {
            image_width: calibration.image_width,
            image_height: calibration.image_height,
            camera_matrix: to_rows(&calibration.intrinsics.camera_matrix()),
            distortion: calibration.intrinsics.distortion,
            new_camera_matrix: to_rows(new_camera_matrix),
            rms: calibration.rms,
            views_used: calibration.used_views.len(),
        }
    }

    pub fn intrinsics(&self) -> FisheyeIntrinsics {
        FisheyeIntrinsics::from_camera_matrix(&from_rows(&self.camera_matrix), self.distortion)
    }

    pub fn new_camera_matrix(&self) -> Matrix3<f64> {
        from_rows(&self.new_camera_matrix)
    }

    /// Save as pretty-printed JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a calibration saved with [`CalibrationFile::save_json`].
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&contents)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(DefisheyeError::InvalidArgument(format!(
                "calibration image size must be positive, got {}x{}",
                self.image_width, self.image_height
            )));
        }
        let mut values = self
            .camera_matrix
            .iter()
            .chain(&self.new_camera_matrix)
            .flatten()
            .chain(&self.distortion);
        if values.any(|v| !v.is_finite()) {
            return Err(DefisheyeError::InvalidArgument(
                "calibration contains non-finite values".to_string(),
            ));
        }
        if self.new_camera_matrix().try_inverse().is_none() {
            return Err(DefisheyeError::InvalidArgument(
                "new camera matrix is singular".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CalibrationFile {
        CalibrationFile {
            image_width: 640,
            image_height: 480,
            camera_matrix: [[300.0, 0.0, 319.5], [0.0, 301.0, 239.5], [0.0, 0.0, 1.0]],
            distortion: [0.03, -0.01, 0.002, -0.0005],
            new_camera_matrix: [[250.0, 0.0, 320.0], [0.0, 250.0, 240.0], [0.0, 0.0, 1.0]],
            rms: 0.25,
            views_used: 12,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        let file = sample();
        file.save_json(&path).unwrap();

        let loaded = CalibrationFile::load(&path).unwrap();
        assert_eq!(loaded.image_width, 640);
        assert_eq!(loaded.views_used, 12);
        assert!((loaded.camera_matrix[0][0] - 300.0).abs() < 1e-12);
        assert!((loaded.distortion[3] + 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_intrinsics_from_file() {
        let intrinsics = sample().intrinsics();
        assert_eq!(intrinsics.fx, 300.0);
        assert_eq!(intrinsics.fy, 301.0);
        assert_eq!(intrinsics.cx, 319.5);
        assert_eq!(intrinsics.skew, 0.0);
        assert_eq!(sample().new_camera_matrix()[(1, 2)], 240.0);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");

        let mut file = sample();
        file.image_width = 0;
        file.save_json(&path).unwrap();
        assert!(CalibrationFile::load(&path).is_err());

        let mut file = sample();
        file.new_camera_matrix = [[0.0; 3]; 3];
        file.save_json(&path).unwrap();
        assert!(CalibrationFile::load(&path).is_err());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(CalibrationFile::load(&path), Err(DefisheyeError::Json(_))));
    }
}
