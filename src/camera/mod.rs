//! Fisheye camera model.
//!
//! Equidistant fisheye projection with four radial coefficients:
//! `θd = θ (1 + k1 θ² + k2 θ⁴ + k3 θ⁶ + k4 θ⁸)` where `θ` is the angle between the
//! incoming ray and the optical axis.

mod pose;

pub use pose::Pose;

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Newton iterations used when inverting the distortion polynomial.
const UNDISTORT_ITERATIONS: usize = 10;

/// Intrinsic parameters of a fisheye camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FisheyeIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Skew coefficient (alpha), zero for square pixels.
    pub skew: f64,
    /// Radial coefficients k1..k4.
    pub distortion: [f64; 4],
}

impl FisheyeIntrinsics {
    /// Distortion-free camera with square pixels.
    pub fn new(focal: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx: focal,
            fy: focal,
            cx,
            cy,
            skew: 0.0,
            distortion: [0.0; 4],
        }
    }

    /// Starting guess for an image: 180° across the long side, centered principal point.
    pub fn initial_guess(width: u32, height: u32) -> Self {
        let focal = f64::from(width.max(height)) / PI;
        Self::new(focal, f64::from(width) / 2.0 - 0.5, f64::from(height) / 2.0 - 0.5)
    }

    pub fn with_distortion(mut self, distortion: [f64; 4]) -> Self {
        self.distortion = distortion;
        self
    }

    /// 3x3 camera matrix.
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx,
            self.fx * self.skew,
            self.cx,
            0.0,
            self.fy,
            self.cy,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Build intrinsics from a camera matrix and distortion coefficients.
    pub fn from_camera_matrix(matrix: &Matrix3<f64>, distortion: [f64; 4]) -> Self {
        let fx = matrix[(0, 0)];
        Self {
            fx,
            fy: matrix[(1, 1)],
            cx: matrix[(0, 2)],
            cy: matrix[(1, 2)],
            skew: if fx.abs() > f64::EPSILON { matrix[(0, 1)] / fx } else { 0.0 },
            distortion,
        }
    }

    /// Distorted angle for an incidence angle.
    pub fn distort_theta(&self, theta: f64) -> f64 {
        let [k1, k2, k3, k4] = self.distortion;
        let t2 = theta * theta;
        let t4 = t2 * t2;
        let t6 = t4 * t2;
        let t8 = t4 * t4;
        theta * (1.0 + k1 * t2 + k2 * t4 + k3 * t6 + k4 * t8)
    }

    fn distort_theta_derivative(&self, theta: f64) -> f64 {
        let [k1, k2, k3, k4] = self.distortion;
        let t2 = theta * theta;
        let t4 = t2 * t2;
        let t6 = t4 * t2;
        let t8 = t4 * t4;
        1.0 + 3.0 * k1 * t2 + 5.0 * k2 * t4 + 7.0 * k3 * t6 + 9.0 * k4 * t8
    }

    /// Apply the distortion to pinhole normalized coordinates `(x/z, y/z)`.
    pub fn distort_normalized(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let r = point.norm();
        if r < 1e-12 {
            return *point;
        }
        let theta_d = self.distort_theta(r.atan());
        point * (theta_d / r)
    }

    /// Map distorted coordinates to pixels.
    fn to_pixel(&self, distorted: &Vector2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * (distorted.x + self.skew * distorted.y) + self.cx,
            self.fy * distorted.y + self.cy,
        )
    }

    /// Project a point given in the camera frame.
    pub fn project(&self, point: &Vector3<f64>) -> Point2<f64> {
        let r = point.x.hypot(point.y);
        if r < 1e-12 {
            return Point2::new(self.cx, self.cy);
        }
        let theta_d = self.distort_theta(r.atan2(point.z));
        let distorted = Vector2::new(point.x, point.y) * (theta_d / r);
        self.to_pixel(&distorted)
    }

    /// Project pinhole normalized coordinates.
    pub fn project_normalized(&self, point: &Vector2<f64>) -> Point2<f64> {
        self.to_pixel(&self.distort_normalized(point))
    }

    /// Recover pinhole normalized coordinates from a pixel.
    ///
    /// Returns `None` when the distortion polynomial cannot be inverted or the ray
    /// lies at or beyond 90° from the optical axis.
    pub fn undistort_pixel(&self, pixel: &Point2<f64>) -> Option<Vector2<f64>> {
        let yd = (pixel.y - self.cy) / self.fy;
        let xd = (pixel.x - self.cx) / self.fx - self.skew * yd;
        let distorted = Vector2::new(xd, yd);
        let theta_d = distorted.norm();
        if theta_d < 1e-12 {
            return Some(distorted);
        }

        let mut theta = theta_d;
        let mut converged = false;
        for _ in 0..UNDISTORT_ITERATIONS {
            let error = self.distort_theta(theta) - theta_d;
            if error.abs() < 1e-12 {
                converged = true;
                break;
            }
            let slope = self.distort_theta_derivative(theta);
            if slope.abs() < 1e-12 {
                return None;
            }
            theta -= error / slope;
        }
        if !converged && (self.distort_theta(theta) - theta_d).abs() > 1e-8 {
            return None;
        }
        if !(0.0..FRAC_PI_2).contains(&theta) {
            return None;
        }

        Some(distorted * (theta.tan() / theta_d))
    }
}
