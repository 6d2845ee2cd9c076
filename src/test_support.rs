//! Synthetic chessboard renderers for tests.

use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::{Point2, Rotation2, Vector2, Vector3};
use rayon::prelude::*;

use crate::camera::{FisheyeIntrinsics, Pose};
use crate::chessboard::PatternSize;

const SUPERSAMPLING: u32 = 4;

/// Placement of a flat board drawn straight onto the image plane.
pub struct BoardLayout {
    /// Square side in pixels.
    pub square: f64,
    pub angle: f64,
    pub center: Point2<f64>,
}

/// Gray level of board coordinates measured in squares from the outer corner.
fn board_shade(bx: f64, by: f64, pattern: PatternSize) -> f64 {
    let cols = f64::from(pattern.width + 1);
    let rows = f64::from(pattern.height + 1);
    if !(0.0..cols).contains(&bx) || !(0.0..rows).contains(&by) {
        return 255.0;
    }
    let cell = bx.floor() as i64 + by.floor() as i64;
    if cell % 2 == 0 {
        0.0
    } else {
        255.0
    }
}

fn render<F>(width: u32, height: u32, samples: u32, shade: F) -> Vec<u8>
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    let mut pixels = vec![0u8; width as usize * height as usize];
    pixels
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, pixel) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for sy in 0..samples {
                    for sx in 0..samples {
                        let px = x as f64 - 0.5 + (f64::from(sx) + 0.5) / f64::from(samples);
                        let py = y as f64 - 0.5 + (f64::from(sy) + 0.5) / f64::from(samples);
                        acc += shade(px, py);
                    }
                }
                *pixel = (acc / f64::from(samples * samples)).round() as u8;
            }
        });
    pixels
}

/// Render a board under a similarity transform and return its inner corners
/// in detection order.
pub fn render_board(
    width: u32,
    height: u32,
    pattern: PatternSize,
    layout: &BoardLayout,
) -> (GrayImage, Vec<Point2<f64>>) {
    let rotation = Rotation2::new(layout.angle);
    let inverse = rotation.inverse();
    let board_center = Vector2::new(
        f64::from(pattern.width + 1) / 2.0,
        f64::from(pattern.height + 1) / 2.0,
    );

    let pixels = render(width, height, SUPERSAMPLING, |x, y| {
        let offset = Vector2::new(x, y) - layout.center.coords;
        let board = inverse * offset / layout.square + board_center;
        board_shade(board.x, board.y, pattern)
    });
    let image = GrayImage::from_raw(width, height, pixels).unwrap();

    let corners = (0..pattern.corner_count())
        .map(|i| {
            let board = Vector2::new(
                (i % pattern.width as usize + 1) as f64,
                (i / pattern.width as usize + 1) as f64,
            );
            Point2::from(layout.center.coords + rotation * (board - board_center) * layout.square)
        })
        .collect();

    (image, corners)
}

/// Render a board seen through a fisheye camera. Board units match
/// [`PatternSize::object_points`].
pub fn render_fisheye_board(
    camera: &FisheyeIntrinsics,
    pose: &Pose,
    width: u32,
    height: u32,
    pattern: PatternSize,
) -> RgbImage {
    let rotation = pose.rotation_matrix();
    let camera_center = -(rotation.inverse() * pose.translation);

    let pixels = render(width, height, 2, |x, y| {
        let Some(normalized) = camera.undistort_pixel(&Point2::new(x, y)) else {
            return 255.0;
        };
        let direction = rotation.inverse() * Vector3::new(normalized.x, normalized.y, 1.0);
        if direction.z.abs() < 1e-12 {
            return 255.0;
        }
        let scale = -camera_center.z / direction.z;
        if scale <= 0.0 {
            return 255.0;
        }
        let hit = camera_center + direction * scale;
        board_shade(hit.x + 1.0, hit.y + 1.0, pattern)
    });

    let gray = GrayImage::from_raw(width, height, pixels).unwrap();
    RgbImage::from_fn(width, height, |x, y| {
        let Luma([v]) = *gray.get_pixel(x, y);
        Rgb([v, v, v])
    })
}
