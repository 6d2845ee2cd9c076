//! Planar homography estimation.
//!
//! Direct linear transform with Hartley normalization, used to seed the pose of
//! each chessboard view and the initial focal length.

use nalgebra::{Matrix3, Point2, SMatrix, SymmetricEigen, Vector3};

use crate::error::{DefisheyeError, Result};

/// Minimum number of point pairs for a homography.
pub const MIN_POINTS: usize = 4;

/// 3x3 projective transform between two planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    pub matrix: Matrix3<f64>,
}

impl Default for Homography {
    fn default() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }
}

impl Homography {
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    /// Estimate the homography mapping `src` onto `dst`.
    pub fn estimate(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Result<Self> {
        if src.len() != dst.len() {
            return Err(DefisheyeError::InvalidArgument(format!(
                "point count mismatch: {} vs {}",
                src.len(),
                dst.len()
            )));
        }
        if src.len() < MIN_POINTS {
            return Err(DefisheyeError::Calibration(format!(
                "Not enough correspondences for a homography: {} (need at least {})",
                src.len(),
                MIN_POINTS
            )));
        }

        let (src_norm, src_t) = normalize_points(src)?;
        let (dst_norm, dst_t) = normalize_points(dst)?;

        let mut ata = SMatrix::<f64, 9, 9>::zeros();
        for (s, d) in src_norm.iter().zip(&dst_norm) {
            let (x, y, u, v) = (s.x, s.y, d.x, d.y);
            let rows = [
                [-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u],
                [0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v],
            ];
            for row in &rows {
                for i in 0..9 {
                    for j in 0..9 {
                        ata[(i, j)] += row[i] * row[j];
                    }
                }
            }
        }

        let eigen = SymmetricEigen::new(ata);
        let smallest = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let h = eigen.eigenvectors.column(smallest);
        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        let dst_t_inv = dst_t.try_inverse().ok_or_else(|| {
            DefisheyeError::Calibration("degenerate point normalization".to_string())
        })?;
        let mut matrix = dst_t_inv * normalized * src_t;
        let scale = matrix[(2, 2)];
        if scale.abs() > 1e-12 {
            matrix /= scale;
        }

        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(DefisheyeError::Calibration(
                "Failed to compute homography".to_string(),
            ));
        }

        Ok(Self { matrix })
    }

    /// Apply the homography to a point.
    pub fn transform_point(&self, point: &Point2<f64>) -> Option<Point2<f64>> {
        let p = self.matrix * Vector3::new(point.x, point.y, 1.0);
        if p.z.abs() < 1e-10 {
            return None;
        }
        Some(Point2::new(p.x / p.z, p.y / p.z))
    }

    /// Compute the inverse homography.
    pub fn invert(&self) -> Result<Self> {
        if self.matrix.determinant().abs() < 1e-10 {
            return Err(DefisheyeError::Calibration(
                "Matrix is singular, cannot invert".to_string(),
            ));
        }
        self.matrix
            .try_inverse()
            .map(Self::new)
            .ok_or_else(|| DefisheyeError::Calibration("Matrix is singular, cannot invert".to_string()))
    }

    /// Mean transfer error in destination units.
    pub fn reprojection_error(&self, src: &[Point2<f64>], dst: &[Point2<f64>]) -> f64 {
        let mut total_error = 0.0;
        let mut count = 0;
        for (s, d) in src.iter().zip(dst) {
            if let Some(t) = self.transform_point(s) {
                total_error += (t - d).norm();
                count += 1;
            }
        }

        if count > 0 {
            total_error / count as f64
        } else {
            0.0
        }
    }
}

/// Translate to the centroid and scale to a mean distance of √2.
fn normalize_points(points: &[Point2<f64>]) -> Result<(Vec<Point2<f64>>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_distance = points
        .iter()
        .map(|p| (p.x - cx).hypot(p.y - cy))
        .sum::<f64>()
        / n;
    if mean_distance < 1e-12 {
        return Err(DefisheyeError::Calibration(
            "degenerate point configuration".to_string(),
        ));
    }

    let scale = std::f64::consts::SQRT_2 / mean_distance;
    let transform = Matrix3::new(scale, 0.0, -scale * cx, 0.0, scale, -scale * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| Point2::new((p.x - cx) * scale, (p.y - cy) * scale))
        .collect();

    Ok((normalized, transform))
}
