use image::GrayImage;
use nalgebra::Point2;
use opencv::calib3d;
use opencv::core::{Mat, Point2f, Size, TermCriteria, TermCriteria_Type, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use super::{CornerDetector, PatternSize, SubPixParams};
use crate::error::Result;

/// Chessboard detection through OpenCV's `findChessboardCorners`.
#[derive(Debug, Clone, Default)]
pub struct OpenCvCornerDetector {
    pub subpix: SubPixParams,
}

impl OpenCvCornerDetector {
    pub fn new(subpix: SubPixParams) -> Self {
        Self { subpix }
    }
}

impl CornerDetector for OpenCvCornerDetector {
    fn find_corners(&self, image: &GrayImage, pattern: PatternSize) -> Result<Option<Vec<Point2<f64>>>> {
        let flat = Mat::from_slice(image.as_raw())?;
        let gray = flat.reshape(1, image.height() as i32)?.try_clone()?;

        let size = Size::new(pattern.width as i32, pattern.height as i32);
        let mut corners = Vector::<Point2f>::new();
        let flags = calib3d::CALIB_CB_ADAPTIVE_THRESH
            | calib3d::CALIB_CB_FAST_CHECK
            | calib3d::CALIB_CB_NORMALIZE_IMAGE;
        if !calib3d::find_chessboard_corners(&gray, size, &mut corners, flags)? {
            return Ok(None);
        }

        let half = self.subpix.half_window as i32;
        let criteria = TermCriteria::new(
            TermCriteria_Type::COUNT as i32 + TermCriteria_Type::EPS as i32,
            self.subpix.max_iterations as i32,
            self.subpix.epsilon,
        )?;
        imgproc::corner_sub_pix(
            &gray,
            &mut corners,
            Size::new(half, half),
            Size::new(-1, -1),
            criteria,
        )?;

        if corners.len() != pattern.corner_count() {
            return Ok(None);
        }
        Ok(Some(
            corners
                .iter()
                .map(|p| Point2::new(f64::from(p.x), f64::from(p.y)))
                .collect(),
        ))
    }
}
