//! Undistortion maps and remapping.

use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use rayon::prelude::*;

use crate::camera::FisheyeIntrinsics;
use crate::error::{DefisheyeError, Result};

/// Camera matrix for the undistorted image.
///
/// `balance` moves the focal length between the value that keeps only valid
/// pixels (0.0) and the one that keeps the whole source frame (1.0); the result
/// is divided by `fov_scale`. Edge midpoints at or beyond 90° of incidence are
/// unbounded after undistortion, so an axis with such an edge does not
/// constrain the focal length.
pub fn estimate_new_camera_matrix(
    intrinsics: &FisheyeIntrinsics,
    image_size: (u32, u32),
    balance: f64,
    fov_scale: f64,
) -> Result<Matrix3<f64>> {
    let (width, height) = (f64::from(image_size.0), f64::from(image_size.1));
    let balance = balance.clamp(0.0, 1.0);

    // top, right, bottom, left
    let edges = [
        Point2::new(width / 2.0, 0.0),
        Point2::new(width, height / 2.0),
        Point2::new(width / 2.0, height),
        Point2::new(0.0, height / 2.0),
    ];
    let aspect_ratio = intrinsics.fx / intrinsics.fy;

    let undistorted: Vec<Option<Vector2<f64>>> = edges
        .iter()
        .map(|edge| {
            let mut p = intrinsics.undistort_pixel(edge)?;
            p.y *= aspect_ratio;
            Some(p)
        })
        .collect();
    for (edge, point) in edges.iter().zip(&undistorted) {
        if point.is_none() {
            log::debug!("Image edge ({}, {}) lies outside the field of view", edge.x, edge.y);
        }
    }

    let points: Vec<Vector2<f64>> = undistorted.iter().flatten().copied().collect();
    if points.is_empty() {
        return Err(DefisheyeError::Calibration(
            "every image edge lies outside the field of view".to_string(),
        ));
    }

    let center = points.iter().fold(Vector2::<f64>::zeros(), |acc, p| acc + p) / points.len() as f64;
    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

    let mut focals = Vec::with_capacity(4);
    if undistorted[1].is_some() && undistorted[3].is_some() {
        focals.push(width * 0.5 / (center.x - min_x));
        focals.push(width * 0.5 / (max_x - center.x));
    }
    if undistorted[0].is_some() && undistorted[2].is_some() {
        focals.push(height * 0.5 * aspect_ratio / (center.y - min_y));
        focals.push(height * 0.5 * aspect_ratio / (max_y - center.y));
    }
    focals.retain(|f| f.is_finite() && *f > 0.0);
    if focals.is_empty() {
        return Err(DefisheyeError::Calibration(
            "no image axis lies within the field of view".to_string(),
        ));
    }

    let f_min = focals.iter().copied().fold(f64::INFINITY, f64::min);
    let f_max = focals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut focal = balance * f_min + (1.0 - balance) * f_max;
    if fov_scale > 0.0 {
        focal /= fov_scale;
    }
    if !focal.is_finite() || focal <= 0.0 {
        return Err(DefisheyeError::Calibration(format!(
            "invalid undistorted focal length {}",
            focal
        )));
    }

    let cx = -center.x * focal + width * 0.5;
    let cy = (-center.y * focal + height * aspect_ratio * 0.5) / aspect_ratio;
    let fy = focal / aspect_ratio;

    Ok(Matrix3::new(focal, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0))
}

/// Per-pixel source coordinates of the undistorted image.
#[derive(Debug, Clone)]
pub struct UndistortMaps {
    pub width: u32,
    pub height: u32,
    /// Source column for each destination pixel, row-major.
    pub map_x: Vec<f32>,
    /// Source row for each destination pixel, row-major.
    pub map_y: Vec<f32>,
}

impl UndistortMaps {
    /// Build the maps for `new_camera_matrix` after applying `rectification`.
    pub fn new(
        intrinsics: &FisheyeIntrinsics,
        new_camera_matrix: &Matrix3<f64>,
        rectification: &Matrix3<f64>,
        image_size: (u32, u32),
    ) -> Result<Self> {
        let (width, height) = image_size;
        if width == 0 || height == 0 {
            return Err(DefisheyeError::InvalidArgument(
                "map size must be positive".to_string(),
            ));
        }
        let inverse = (new_camera_matrix * rectification)
            .try_inverse()
            .ok_or_else(|| {
                DefisheyeError::Calibration("new camera matrix is singular".to_string())
            })?;

        let len = width as usize * height as usize;
        let mut map_x = vec![0.0f32; len];
        let mut map_y = vec![0.0f32; len];

        map_x
            .par_chunks_mut(width as usize)
            .zip(map_y.par_chunks_mut(width as usize))
            .enumerate()
            .for_each(|(row, (xs, ys))| {
                for col in 0..width as usize {
                    let ray = inverse * Vector3::new(col as f64, row as f64, 1.0);
                    let (sx, sy) = if ray.z > 0.0 {
                        let normalized = Vector2::new(ray.x / ray.z, ray.y / ray.z);
                        let source = intrinsics.project_normalized(&normalized);
                        (source.x as f32, source.y as f32)
                    } else {
                        (-1.0, -1.0)
                    };
                    xs[col] = sx;
                    ys[col] = sy;
                }
            });

        Ok(Self {
            width,
            height,
            map_x,
            map_y,
        })
    }

    /// Maps that sample every pixel from itself.
    pub fn identity(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        let mut map_x = Vec::with_capacity(len);
        let mut map_y = Vec::with_capacity(len);
        for row in 0..height {
            for col in 0..width {
                map_x.push(col as f32);
                map_y.push(row as f32);
            }
        }
        Self {
            width,
            height,
            map_x,
            map_y,
        }
    }

    /// Source coordinate for a destination pixel.
    pub fn source(&self, x: u32, y: u32) -> (f32, f32) {
        let idx = (y * self.width + x) as usize;
        (self.map_x[idx], self.map_y[idx])
    }
}

/// Resample `image` through `maps` with bilinear interpolation and a black border.
pub fn remap(image: &RgbImage, maps: &UndistortMaps) -> RgbImage {
    let mut output = RgbImage::new(maps.width, maps.height);
    let row_len = maps.width as usize * 3;
    if row_len == 0 {
        return output;
    }

    output
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(row, pixels)| {
            let offset = row * maps.width as usize;
            for col in 0..maps.width as usize {
                let value = sample_bilinear(image, maps.map_x[offset + col], maps.map_y[offset + col]);
                pixels[col * 3..col * 3 + 3].copy_from_slice(&value.0);
            }
        });

    output
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = (image.width() as i64, image.height() as i64);
    if !x.is_finite() || !y.is_finite() {
        return Rgb([0, 0, 0]);
    }
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    if x0 < -1 || y0 < -1 || x0 >= width || y0 >= height {
        return Rgb([0, 0, 0]);
    }
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let fetch = |px: i64, py: i64| -> [f32; 3] {
        if px < 0 || py < 0 || px >= width || py >= height {
            [0.0; 3]
        } else {
            let p = image.get_pixel(px as u32, py as u32);
            [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])]
        }
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1, y0);
    let p01 = fetch(x0, y0 + 1);
    let p11 = fetch(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] + (p10[c] - p00[c]) * fx;
        let bottom = p01[c] + (p11[c] - p01[c]) * fx;
        out[c] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
