//! Board-to-camera rigid transform.

use nalgebra::{Matrix3, Point3, Rotation3, Vector3};

/// Rotation (Rodrigues vector) and translation taking board points into the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build a pose from a rotation matrix, re-orthonormalizing it first.
    pub fn from_rotation_matrix(matrix: &Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rotation = Rotation3::from_matrix(matrix);
        Self::new(rotation.scaled_axis(), translation)
    }

    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        Rotation3::new(self.rotation)
    }

    /// Transform a board point into the camera frame.
    pub fn transform(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.rotation_matrix() * point.coords + self.translation
    }

    /// Flatten as `[rx, ry, rz, tx, ty, tz]`.
    pub fn to_params(&self) -> [f64; 6] {
        [
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    pub fn from_params(params: &[f64]) -> Self {
        Self::new(
            Vector3::new(params[0], params[1], params[2]),
            Vector3::new(params[3], params[4], params[5]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_pose() {
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 4.0));
        let p = pose.transform(&Point3::new(1.0, 2.0, 0.0));
        assert!((p - Vector3::new(1.0, 2.0, 4.0)).norm() < 1e-12);
    }

    #[test]
    fn test_rotation_matrix_round_trip() {
        let rotation = Vector3::new(0.2, -0.4, 0.1);
        let pose = Pose::new(rotation, Vector3::zeros());
        let rebuilt = Pose::from_rotation_matrix(pose.rotation_matrix().matrix(), Vector3::zeros());
        assert!((rebuilt.rotation - rotation).norm() < 1e-9);
    }

    #[test]
    fn test_params_round_trip() {
        let pose = Pose::new(Vector3::new(0.1, 0.2, 0.3), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(Pose::from_params(&pose.to_params()), pose);
    }
}
