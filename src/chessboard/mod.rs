//! Chessboard inner-corner detection.
//!
//! [`SaddleCornerDetector`] is a pure Rust detector: candidate X-junctions from
//! a Hessian saddle response, refined to sub-pixel accuracy, validated with a
//! ring test and grown into a grid. Equalization and blur only feed the
//! candidate search; refinement runs on gradients of the untouched image.
//! With the `opencv` feature enabled, [`OpenCvCornerDetector`] wraps
//! `findChessboardCorners` instead.

mod filters;
mod grid;
mod saddle;
mod subpix;

#[cfg(feature = "opencv")]
mod opencv_impl;

use image::{GrayImage, RgbImage};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use subpix::SubPixParams;

#[cfg(feature = "opencv")]
pub use opencv_impl::OpenCvCornerDetector;

use filters::Gradients;

/// Number of inner corners along each side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternSize {
    pub width: u32,
    pub height: u32,
}

impl PatternSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn corner_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Board coordinates of the corners in detection order, one unit per square.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let width = self.width.max(1) as usize;
        (0..self.corner_count())
            .map(|i| Point3::new((i % width) as f64, (i / width) as f64, 0.0))
            .collect()
    }
}

/// Finds the inner corners of a chessboard in a grayscale image.
pub trait CornerDetector: Send + Sync {
    /// `Ok(None)` when the full pattern is not visible.
    fn find_corners(&self, image: &GrayImage, pattern: PatternSize) -> Result<Option<Vec<Point2<f64>>>>;
}

/// Tuning for [`SaddleCornerDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub blur_sigma: f32,
    /// Fraction of the strongest saddle response a candidate must reach.
    pub response_threshold: f32,
    pub nms_radius: usize,
    pub ring_radius: f64,
    /// Minimum gray level spread around a corner after normalization.
    pub min_contrast: f32,
    pub min_distance: f64,
    pub max_candidates: usize,
    pub max_seeds: usize,
    /// Allowed distance from a predicted corner, as a fraction of the local square size.
    pub grid_tolerance: f64,
    pub normalize_image: bool,
    /// Bail out before grid assembly when there are fewer candidates than corners.
    pub fast_check: bool,
    pub subpix: SubPixParams,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            response_threshold: 0.05,
            nms_radius: 3,
            ring_radius: 5.0,
            min_contrast: 20.0,
            min_distance: 3.0,
            max_candidates: 2000,
            max_seeds: 16,
            grid_tolerance: 0.35,
            normalize_image: true,
            fast_check: true,
            subpix: SubPixParams::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaddleCornerDetector {
    params: DetectorParams,
}

impl SaddleCornerDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }
}

impl CornerDetector for SaddleCornerDetector {
    fn find_corners(&self, image: &GrayImage, pattern: PatternSize) -> Result<Option<Vec<Point2<f64>>>> {
        let params = &self.params;
        let margin = params.ring_radius.ceil() as usize + 2;
        if pattern.corner_count() == 0
            || (image.width() as usize) <= 2 * margin
            || (image.height() as usize) <= 2 * margin
        {
            return Ok(None);
        }

        let blurred = filters::smooth(image, params.normalize_image, params.blur_sigma);
        let gradients = Gradients::new(image);
        let response = saddle::saddle_response(&blurred);
        let maxima = saddle::local_maxima(&response, params.response_threshold, params.nms_radius, margin);

        let mut candidates: Vec<(Point2<f64>, f32)> = maxima
            .into_iter()
            .filter_map(|(point, score)| {
                let refined = subpix::corner_sub_pix(&gradients, point, &params.subpix);
                saddle::passes_ring_test(&blurred, refined, params.ring_radius, params.min_contrast)
                    .then_some((refined, score))
            })
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut candidates = saddle::suppress_duplicates(candidates, params.min_distance);
        candidates.truncate(params.max_candidates);

        log::trace!(
            "{} corner candidates for a {}x{} pattern",
            candidates.len(),
            pattern.width,
            pattern.height
        );

        if params.fast_check && candidates.len() < pattern.corner_count() {
            return Ok(None);
        }

        let points: Vec<Point2<f64>> = candidates.into_iter().map(|(p, _)| p).collect();
        Ok(grid::assemble_grid(
            &points,
            pattern,
            params.max_seeds,
            params.grid_tolerance,
        ))
    }
}

/// Detector used for calibration: OpenCV when the `opencv` feature is
/// enabled, the saddle detector otherwise.
pub fn default_detector(params: &DetectorParams) -> Box<dyn CornerDetector> {
    #[cfg(feature = "opencv")]
    {
        Box::new(OpenCvCornerDetector::new(params.subpix))
    }
    #[cfg(not(feature = "opencv"))]
    {
        Box::new(SaddleCornerDetector::new(params.clone()))
    }
}

/// Detect the pattern in a color image.
pub fn find_chessboard(
    detector: &dyn CornerDetector,
    image: &RgbImage,
    pattern: PatternSize,
) -> Result<Option<Vec<Point2<f64>>>> {
    let gray = image::imageops::grayscale(image);
    detector.find_corners(&gray, pattern)
}
