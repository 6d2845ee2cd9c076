//! Fisheye calibration from planar chessboard views.
//!
//! Pose seeds come from homographies of undistorted normalized points. The
//! intrinsics and every view's pose are then refined together with
//! `levenberg_marquardt`, alternating with a per-view pose refinement.
//! Jacobians are taken by central differences, one block per view.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn, Matrix3, Point2, Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::homography::{Homography, MIN_POINTS};
use crate::camera::{FisheyeIntrinsics, Pose};
use crate::error::{DefisheyeError, Result};

const POSE_PARAMS: usize = 6;

/// Calibration flags and termination criteria.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Maximum refinement rounds, also the evaluation patience of each
    /// joint minimization.
    pub max_iterations: usize,
    /// Relative change of the intrinsics below which the solver stops.
    pub epsilon: f64,
    /// Re-refine every view's pose after each intrinsic update.
    pub recompute_extrinsic: bool,
    /// Reject views whose extrinsic Jacobian is ill-conditioned.
    pub check_cond: bool,
    /// Keep the skew coefficient at zero.
    pub fix_skew: bool,
    /// Condition number above which a view is rejected.
    pub condition_threshold: f64,
    /// Evaluation patience of the per-view pose refinement.
    pub extrinsic_iterations: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            epsilon: 1e-6,
            recompute_extrinsic: true,
            check_cond: true,
            fix_skew: true,
            condition_threshold: 1e6,
            extrinsic_iterations: 20,
        }
    }
}

/// Result of a fisheye calibration.
#[derive(Debug, Clone)]
pub struct FisheyeCalibration {
    pub intrinsics: FisheyeIntrinsics,
    /// Board pose of each used view.
    pub poses: Vec<Pose>,
    /// Indices (into the input views) that took part in the calibration.
    pub used_views: Vec<usize>,
    /// Root mean square reprojection error in pixels.
    pub rms: f64,
    pub image_width: u32,
    pub image_height: u32,
}

/// One chessboard observation.
struct View<'a> {
    object: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
}

/// Calibrate a fisheye camera from planar object points and their detections.
pub fn calibrate_fisheye(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    image_size: (u32, u32),
    options: &SolverOptions,
) -> Result<FisheyeCalibration> {
    validate_input(object_points, image_points, image_size)?;
    let (width, height) = image_size;

    let views: Vec<View> = object_points
        .iter()
        .zip(image_points)
        .map(|(object, image)| View { object, image })
        .collect();

    let intrinsics = initial_intrinsics(&views, width, height);
    log::debug!(
        "Initial intrinsics: f=({:.2}, {:.2}) c=({:.2}, {:.2})",
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy
    );

    let mut used = Vec::new();
    let mut poses = Vec::new();
    for (index, view) in views.iter().enumerate() {
        let pose = init_extrinsics(&intrinsics, view)
            .and_then(|pose| refine_extrinsics(&intrinsics, view, pose, options, options.check_cond));
        match pose {
            Ok(pose) => {
                used.push(index);
                poses.push(pose);
            }
            Err(e) => log::warn!("Rejecting calibration view {}: {}", index, e),
        }
    }
    if used.is_empty() {
        return Err(DefisheyeError::Calibration(
            "no usable calibration view".to_string(),
        ));
    }

    let used_views: Vec<&View> = used.iter().map(|&i| &views[i]).collect();
    let mut problem = JointProblem::new(used_views, options.fix_skew, &intrinsics, &poses);
    let n_intr = problem.intrinsic_count();
    let solver = LevenbergMarquardt::new()
        .with_xtol(options.epsilon)
        .with_patience(options.max_iterations.max(1));

    for round in 0..options.max_iterations.max(1) {
        let before = problem.params.rows(0, n_intr).into_owned();
        let (minimized, report) = solver.minimize(problem);
        problem = minimized;
        log::debug!(
            "Round {}: {:?} after {} evaluations, objective {:.6e}",
            round,
            report.termination,
            report.number_of_evaluations,
            report.objective_function
        );
        if !report.objective_function.is_finite() {
            return Err(DefisheyeError::Calibration(
                "reprojection error diverged".to_string(),
            ));
        }

        if options.recompute_extrinsic {
            problem.recompute_extrinsics(options);
        }

        let after = problem.params.rows(0, n_intr);
        let change = (&after - &before).norm() / after.norm().max(f64::EPSILON);
        log::debug!("Round {}: intrinsic change {:.3e}", round, change);
        if change < options.epsilon {
            break;
        }
    }

    let intrinsics = problem.intrinsics();
    let poses = problem.poses();
    let cost = problem.stacked_residuals().norm_squared();
    let rms = (cost / problem.point_count() as f64).sqrt();

    log::info!(
        "Calibrated from {} views: f=({:.2}, {:.2}) c=({:.2}, {:.2}) k={:?} rms={:.4}px",
        used.len(),
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy,
        intrinsics.distortion,
        rms
    );

    Ok(FisheyeCalibration {
        intrinsics,
        poses,
        used_views: used,
        rms,
        image_width: width,
        image_height: height,
    })
}

fn validate_input(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    image_size: (u32, u32),
) -> Result<()> {
    if object_points.is_empty() {
        return Err(DefisheyeError::InvalidArgument(
            "no calibration views".to_string(),
        ));
    }
    if object_points.len() != image_points.len() {
        return Err(DefisheyeError::InvalidArgument(format!(
            "{} object point sets but {} image point sets",
            object_points.len(),
            image_points.len()
        )));
    }
    if image_size.0 == 0 || image_size.1 == 0 {
        return Err(DefisheyeError::InvalidArgument(
            "image size must be positive".to_string(),
        ));
    }
    for (index, (object, image)) in object_points.iter().zip(image_points).enumerate() {
        if object.len() != image.len() || object.len() < MIN_POINTS {
            return Err(DefisheyeError::InvalidArgument(format!(
                "view {} has {} object points and {} image points",
                index,
                object.len(),
                image.len()
            )));
        }
        if object.iter().any(|p| p.z.abs() > 1e-9) {
            return Err(DefisheyeError::InvalidArgument(format!(
                "object points of view {} must lie in the z = 0 plane",
                index
            )));
        }
    }
    Ok(())
}

/// Focal length from planar homography constraints, falling back to `max(w, h) / π`.
fn initial_intrinsics(views: &[View], width: u32, height: u32) -> FisheyeIntrinsics {
    let mut guess = FisheyeIntrinsics::initial_guess(width, height);
    let fallback = guess.fx;

    let (mut numerator, mut denominator) = (0.0, 0.0);
    for view in views {
        let board: Vec<_> = view.object.iter().map(|p| Point2::new(p.x, p.y)).collect();
        let centered: Vec<_> = view
            .image
            .iter()
            .map(|p| Point2::new(p.x - guess.cx, p.y - guess.cy))
            .collect();
        let Ok(homography) = Homography::estimate(&board, &centered) else {
            continue;
        };
        let h = homography.matrix / homography.matrix.norm();

        // Orthogonal columns and equal norms of K⁻¹H with K = diag(f, f, 1).
        let equations = [
            (
                h[(0, 0)] * h[(0, 1)] + h[(1, 0)] * h[(1, 1)],
                h[(2, 0)] * h[(2, 1)],
            ),
            (
                h[(0, 0)].powi(2) + h[(1, 0)].powi(2) - h[(0, 1)].powi(2) - h[(1, 1)].powi(2),
                h[(2, 0)].powi(2) - h[(2, 1)].powi(2),
            ),
        ];
        for (a, b) in equations {
            numerator += a * b;
            denominator += a * a;
        }
    }

    if denominator > 0.0 {
        let inverse_square = -numerator / denominator;
        if inverse_square > 0.0 {
            let focal = 1.0 / inverse_square.sqrt();
            if focal.is_finite() && focal > 0.2 * fallback && focal < 5.0 * fallback {
                guess.fx = focal;
                guess.fy = focal;
            }
        }
    }

    guess
}

fn init_extrinsics(intrinsics: &FisheyeIntrinsics, view: &View) -> Result<Pose> {
    let mut board = Vec::with_capacity(view.object.len());
    let mut normalized = Vec::with_capacity(view.object.len());
    for (object, image) in view.object.iter().zip(view.image) {
        if let Some(n) = intrinsics.undistort_pixel(image) {
            board.push(Point2::new(object.x, object.y));
            normalized.push(Point2::new(n.x, n.y));
        }
    }

    let homography = Homography::estimate(&board, &normalized)?;
    pose_from_homography(&homography.matrix)
}

/// Decompose `H ∝ [r1 r2 t]` into a pose with the board in front of the camera.
fn pose_from_homography(h: &Matrix3<f64>) -> Result<Pose> {
    let h1: Vector3<f64> = h.column(0).into_owned();
    let h2: Vector3<f64> = h.column(1).into_owned();
    let h3: Vector3<f64> = h.column(2).into_owned();

    let norm = (h1.norm() + h2.norm()) / 2.0;
    if norm < 1e-12 {
        return Err(DefisheyeError::Calibration(
            "degenerate homography".to_string(),
        ));
    }
    let mut scale = 1.0 / norm;
    if h3.z * scale < 0.0 {
        scale = -scale;
    }

    let r1 = h1 * scale;
    let r2 = h2 * scale;
    let translation = h3 * scale;
    let r3 = r1.cross(&r2);
    let approx = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = approx.svd(true, true);
    let (Some(mut u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(DefisheyeError::Calibration(
            "failed to orthonormalize rotation".to_string(),
        ));
    };
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        let flipped = -u.column(2);
        u.set_column(2, &flipped);
        rotation = u * v_t;
    }

    Ok(Pose::from_rotation_matrix(&rotation, translation))
}

fn view_residuals(intrinsics: &FisheyeIntrinsics, pose: &Pose, view: &View) -> DVector<f64> {
    let rotation = pose.rotation_matrix();
    let mut residuals = DVector::zeros(2 * view.object.len());
    for (i, (object, image)) in view.object.iter().zip(view.image).enumerate() {
        let projected = intrinsics.project(&(rotation * object.coords + pose.translation));
        residuals[2 * i] = projected.x - image.x;
        residuals[2 * i + 1] = projected.y - image.y;
    }
    residuals
}

fn difference_step(value: f64) -> f64 {
    1e-6 * value.abs().max(1.0)
}

/// Central-difference Jacobian of `residuals` with respect to `params[columns]`.
fn numeric_jacobian<F>(params: &[f64], columns: &[usize], rows: usize, residuals: F) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> DVector<f64>,
{
    let mut jacobian = DMatrix::zeros(rows, columns.len());
    let mut p = params.to_vec();
    for (column, &index) in columns.iter().enumerate() {
        let original = p[index];
        let step = difference_step(original);
        p[index] = original + step;
        let plus = residuals(&p);
        p[index] = original - step;
        let minus = residuals(&p);
        p[index] = original;
        jacobian.set_column(column, &((plus - minus) / (2.0 * step)));
    }
    jacobian
}

/// Ratio of the largest to the smallest singular value.
fn condition_number(jacobian: &DMatrix<f64>) -> f64 {
    let singular = jacobian.singular_values();
    let max = singular.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = singular.iter().copied().fold(f64::INFINITY, f64::min);
    if min <= 0.0 {
        return f64::INFINITY;
    }
    max / min
}

/// One view's reprojection with the intrinsics held fixed.
struct PoseProblem<'a> {
    intrinsics: &'a FisheyeIntrinsics,
    view: &'a View<'a>,
    params: DVector<f64>,
}

impl PoseProblem<'_> {
    fn residuals_at(&self, params: &[f64]) -> DVector<f64> {
        view_residuals(self.intrinsics, &Pose::from_params(params), self.view)
    }

    fn pose_jacobian(&self) -> DMatrix<f64> {
        let columns: Vec<usize> = (0..POSE_PARAMS).collect();
        numeric_jacobian(
            self.params.as_slice(),
            &columns,
            2 * self.view.object.len(),
            |p| self.residuals_at(p),
        )
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for PoseProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residuals_at(self.params.as_slice()))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(self.pose_jacobian())
    }
}

/// Refine a view's pose with the intrinsics held fixed.
fn refine_extrinsics(
    intrinsics: &FisheyeIntrinsics,
    view: &View,
    pose: Pose,
    options: &SolverOptions,
    check_cond: bool,
) -> Result<Pose> {
    let problem = PoseProblem {
        intrinsics,
        view,
        params: DVector::from_row_slice(&pose.to_params()),
    };
    let (problem, report) = LevenbergMarquardt::new()
        .with_patience(options.extrinsic_iterations.max(1))
        .minimize(problem);
    if !report.objective_function.is_finite() {
        return Err(DefisheyeError::Calibration(format!(
            "pose refinement failed: {:?}",
            report.termination
        )));
    }

    if check_cond {
        let condition = condition_number(&problem.pose_jacobian());
        if condition > options.condition_threshold {
            return Err(DefisheyeError::Calibration(format!(
                "ill-conditioned view (condition number {:.3e})",
                condition
            )));
        }
    }

    Ok(Pose::from_params(problem.params.as_slice()))
}

/// Joint problem over the intrinsics and every view's pose. Parameters are
/// the intrinsics first, then six pose parameters per view.
struct JointProblem<'a> {
    views: Vec<&'a View<'a>>,
    fix_skew: bool,
    params: DVector<f64>,
}

impl<'a> JointProblem<'a> {
    fn new(views: Vec<&'a View<'a>>, fix_skew: bool, intrinsics: &FisheyeIntrinsics, poses: &[Pose]) -> Self {
        let [k1, k2, k3, k4] = intrinsics.distortion;
        let mut params = vec![
            intrinsics.fx,
            intrinsics.fy,
            intrinsics.cx,
            intrinsics.cy,
            k1,
            k2,
            k3,
            k4,
        ];
        if !fix_skew {
            params.push(intrinsics.skew);
        }
        for pose in poses {
            params.extend_from_slice(&pose.to_params());
        }

        Self {
            views,
            fix_skew,
            params: DVector::from_vec(params),
        }
    }

    fn intrinsic_count(&self) -> usize {
        if self.fix_skew {
            8
        } else {
            9
        }
    }

    fn point_count(&self) -> usize {
        self.views.iter().map(|v| v.object.len()).sum()
    }

    fn intrinsics_at(&self, params: &[f64]) -> FisheyeIntrinsics {
        FisheyeIntrinsics {
            fx: params[0],
            fy: params[1],
            cx: params[2],
            cy: params[3],
            skew: if self.fix_skew { 0.0 } else { params[8] },
            distortion: [params[4], params[5], params[6], params[7]],
        }
    }

    fn pose_offset(&self, view: usize) -> usize {
        self.intrinsic_count() + POSE_PARAMS * view
    }

    fn pose_at(&self, params: &[f64], view: usize) -> Pose {
        let offset = self.pose_offset(view);
        Pose::from_params(&params[offset..offset + POSE_PARAMS])
    }

    fn intrinsics(&self) -> FisheyeIntrinsics {
        self.intrinsics_at(self.params.as_slice())
    }

    fn poses(&self) -> Vec<Pose> {
        (0..self.views.len())
            .map(|v| self.pose_at(self.params.as_slice(), v))
            .collect()
    }

    fn stacked_residuals(&self) -> DVector<f64> {
        let intrinsics = self.intrinsics();
        let mut residuals = Vec::with_capacity(2 * self.point_count());
        for (v, view) in self.views.iter().enumerate() {
            let pose = self.pose_at(self.params.as_slice(), v);
            residuals.extend(view_residuals(&intrinsics, &pose, view).iter());
        }
        DVector::from_vec(residuals)
    }

    /// Re-refine every pose under the current intrinsics.
    fn recompute_extrinsics(&mut self, options: &SolverOptions) {
        let intrinsics = self.intrinsics();
        for v in 0..self.views.len() {
            let pose = self.pose_at(self.params.as_slice(), v);
            if let Ok(refined) = refine_extrinsics(&intrinsics, self.views[v], pose, options, false) {
                let offset = self.pose_offset(v);
                self.params
                    .rows_mut(offset, POSE_PARAMS)
                    .copy_from_slice(&refined.to_params());
            }
        }
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for JointProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.stacked_residuals())
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let n_intr = self.intrinsic_count();
        let params = self.params.as_slice();

        let blocks: Vec<DMatrix<f64>> = self
            .views
            .par_iter()
            .enumerate()
            .map(|(v, view)| {
                let offset = self.pose_offset(v);
                let columns: Vec<usize> = (0..n_intr).chain(offset..offset + POSE_PARAMS).collect();
                numeric_jacobian(params, &columns, 2 * view.object.len(), |p| {
                    view_residuals(&self.intrinsics_at(p), &self.pose_at(p, v), view)
                })
            })
            .collect();

        let mut jacobian = DMatrix::zeros(2 * self.point_count(), self.params.len());
        let mut row = 0;
        for (v, block) in blocks.iter().enumerate() {
            let rows = block.nrows();
            jacobian
                .view_mut((row, 0), (rows, n_intr))
                .copy_from(&block.columns(0, n_intr));
            jacobian
                .view_mut((row, self.pose_offset(v)), (rows, POSE_PARAMS))
                .copy_from(&block.columns(n_intr, POSE_PARAMS));
            row += rows;
        }
        Some(jacobian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chessboard::PatternSize;

    fn true_camera() -> FisheyeIntrinsics {
        FisheyeIntrinsics {
            fx: 300.0,
            fy: 300.0,
            cx: 322.0,
            cy: 236.0,
            skew: 0.0,
            distortion: [0.03, -0.01, 0.002, -0.0005],
        }
    }

    fn board_pose(rx: f64, ry: f64, rz: f64, dx: f64, dy: f64) -> Pose {
        let rotation = Vector3::new(rx.to_radians(), ry.to_radians(), rz.to_radians());
        let center = Vector3::new(2.5, 4.0, 0.0);
        let r = Pose::new(rotation, Vector3::zeros()).rotation_matrix();
        Pose::new(rotation, -(r * center) + Vector3::new(dx, dy, 10.0))
    }

    fn synthetic_views() -> (Vec<Vec<Point3<f64>>>, Vec<Vec<Point2<f64>>>) {
        let camera = true_camera();
        let object = PatternSize::new(6, 9).object_points();
        let poses = [
            board_pose(20.0, 0.0, 0.0, 0.0, 0.0),
            board_pose(-20.0, 0.0, 5.0, 1.0, 0.0),
            board_pose(0.0, 25.0, 0.0, -2.0, 1.0),
            board_pose(0.0, -25.0, -5.0, 2.0, -1.0),
            board_pose(15.0, 15.0, 10.0, -1.0, -2.0),
            board_pose(-15.0, 20.0, -10.0, 2.0, 2.0),
            board_pose(10.0, -20.0, 5.0, -3.0, 1.5),
            board_pose(-10.0, -15.0, -5.0, 3.0, -1.5),
        ];

        let image = poses
            .iter()
            .map(|pose| {
                object
                    .iter()
                    .map(|p| camera.project(&pose.transform(p)))
                    .collect()
            })
            .collect();
        (vec![object; poses.len()], image)
    }

    #[test]
    fn test_recovers_synthetic_camera() {
        let (object, image) = synthetic_views();
        let result = calibrate_fisheye(&object, &image, (640, 480), &SolverOptions::default()).unwrap();

        assert_eq!(result.used_views.len(), 8);
        assert_recovers(&result);
        assert_eq!(result.intrinsics.skew, 0.0);
    }

    #[test]
    fn test_pose_from_homography_of_known_pose() {
        let pose = board_pose(10.0, -5.0, 3.0, 0.5, -0.5);
        let r = pose.rotation_matrix();
        let h = Matrix3::from_columns(&[
            r.matrix().column(0).into_owned(),
            r.matrix().column(1).into_owned(),
            pose.translation,
        ]) * -2.5;

        let recovered = pose_from_homography(&h).unwrap();
        assert!((recovered.rotation - pose.rotation).norm() < 1e-9);
        assert!((recovered.translation - pose.translation).norm() < 1e-9);
    }

    #[test]
    fn test_rejects_non_planar_points() {
        let (mut object, image) = synthetic_views();
        object[0][3].z = 1.0;
        assert!(matches!(
            calibrate_fisheye(&object, &image, (640, 480), &SolverOptions::default()),
            Err(DefisheyeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rejects_mismatched_views() {
        let (object, mut image) = synthetic_views();
        image.pop();
        assert!(calibrate_fisheye(&object, &image, (640, 480), &SolverOptions::default()).is_err());
    }

    fn assert_recovers(result: &FisheyeCalibration) {
        let truth = true_camera();
        assert!(result.rms < 1e-3, "rms {}", result.rms);
        assert!((result.intrinsics.fx - truth.fx).abs() < 0.5, "fx {}", result.intrinsics.fx);
        assert!((result.intrinsics.fy - truth.fy).abs() < 0.5, "fy {}", result.intrinsics.fy);
        assert!((result.intrinsics.cx - truth.cx).abs() < 0.5, "cx {}", result.intrinsics.cx);
        assert!((result.intrinsics.cy - truth.cy).abs() < 0.5, "cy {}", result.intrinsics.cy);
    }

    #[test]
    fn test_ill_conditioned_view_is_dropped() {
        let (mut object, mut image) = synthetic_views();
        // A board a thousand units away barely constrains its own pose.
        let mut far = board_pose(0.0, 0.0, 0.0, 0.0, 0.0);
        far.translation.z += 990.0;
        let camera = true_camera();
        image.push(object[0].iter().map(|p| camera.project(&far.transform(p))).collect());
        object.push(object[0].clone());

        let options = SolverOptions {
            condition_threshold: 1e3,
            ..SolverOptions::default()
        };
        let result = calibrate_fisheye(&object, &image, (640, 480), &options).unwrap();
        assert_eq!(result.used_views, (0..8).collect::<Vec<_>>());
        assert_eq!(result.poses.len(), 8);
        assert_recovers(&result);
    }

    #[test]
    fn test_all_views_rejected() {
        let (object, image) = synthetic_views();
        let options = SolverOptions {
            condition_threshold: 1.0,
            ..SolverOptions::default()
        };
        assert!(matches!(
            calibrate_fisheye(&object, &image, (640, 480), &options),
            Err(DefisheyeError::Calibration(_))
        ));
    }

    #[test]
    fn test_free_skew_stays_near_zero() {
        let (object, image) = synthetic_views();
        let options = SolverOptions {
            fix_skew: false,
            ..SolverOptions::default()
        };
        let result = calibrate_fisheye(&object, &image, (640, 480), &options).unwrap();
        assert_recovers(&result);
        assert!(result.intrinsics.skew.abs() < 1e-4, "skew {}", result.intrinsics.skew);
    }

    #[test]
    fn test_without_recomputing_extrinsics() {
        let (object, image) = synthetic_views();
        let options = SolverOptions {
            recompute_extrinsic: false,
            check_cond: false,
            ..SolverOptions::default()
        };
        let result = calibrate_fisheye(&object, &image, (640, 480), &options).unwrap();
        assert_eq!(result.used_views.len(), 8);
        assert_recovers(&result);
    }

    #[test]
    fn test_condition_number() {
        assert!((condition_number(&DMatrix::identity(12, 6)) - 1.0).abs() < 1e-12);
        assert!(condition_number(&DMatrix::zeros(12, 6)).is_infinite());
    }
}
