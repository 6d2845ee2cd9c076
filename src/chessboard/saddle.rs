//! Saddle point response and candidate filtering.

use image::{ImageBuffer, Luma};
use nalgebra::Point2;

use super::filters::{contains, sample, FloatImage};

/// Number of samples taken around a candidate by the ring test.
const RING_SAMPLES: usize = 16;

/// `Ixy² - Ixx·Iyy`, positive at X-junctions and zero along straight edges.
pub fn saddle_response(image: &FloatImage) -> FloatImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let data = image.as_raw();
    let at = |x: usize, y: usize| data[y * width + x];

    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let (x, y) = (x as usize, y as usize);
        if x == 0 || y == 0 || x + 1 >= width || y + 1 >= height {
            return Luma([0.0]);
        }
        let c = at(x, y);
        let ixx = at(x + 1, y) - 2.0 * c + at(x - 1, y);
        let iyy = at(x, y + 1) - 2.0 * c + at(x, y - 1);
        let ixy = (at(x + 1, y + 1) - at(x + 1, y - 1) - at(x - 1, y + 1) + at(x - 1, y - 1)) * 0.25;
        Luma([(ixy * ixy - ixx * iyy).max(0.0)])
    })
}

/// Local maxima of `response` above `relative_threshold` times its peak.
///
/// Plateaus keep the first pixel in raster order. Pixels closer than `margin`
/// to the border are skipped.
pub fn local_maxima(
    response: &FloatImage,
    relative_threshold: f32,
    radius: usize,
    margin: usize,
) -> Vec<(Point2<f64>, f32)> {
    let data = response.as_raw();
    let peak = data.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return Vec::new();
    }
    let threshold = peak * relative_threshold;
    let (width, height) = (response.width() as usize, response.height() as usize);
    let margin = margin.max(radius);
    if width <= 2 * margin || height <= 2 * margin {
        return Vec::new();
    }

    let radius = radius as i64;
    let mut maxima = Vec::new();
    for y in margin..height - margin {
        'pixel: for x in margin..width - margin {
            let value = data[y * width + x];
            if value <= threshold {
                continue;
            }
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let neighbour = data[(y as i64 + dy) as usize * width + (x as i64 + dx) as usize];
                    let earlier = dy < 0 || (dy == 0 && dx < 0);
                    if neighbour > value || (neighbour == value && earlier) {
                        continue 'pixel;
                    }
                }
            }
            maxima.push((Point2::new(x as f64, y as f64), value));
        }
    }
    maxima
}

/// Check that a circle around `center` crosses exactly four dark/bright sectors
/// with opposite sectors sharing a color.
pub fn passes_ring_test(image: &FloatImage, center: Point2<f64>, radius: f64, min_contrast: f32) -> bool {
    let mut values = [0.0f64; RING_SAMPLES];
    for (k, value) in values.iter_mut().enumerate() {
        let angle = (k as f64 + 0.5) * std::f64::consts::TAU / RING_SAMPLES as f64;
        let x = center.x + radius * angle.cos();
        let y = center.y + radius * angle.sin();
        if !contains(image, x, y) {
            return false;
        }
        *value = sample(image, x, y);
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max - min < f64::from(min_contrast) {
        return false;
    }

    let mid = (min + max) * 0.5;
    let bright: Vec<bool> = values.iter().map(|&v| v > mid).collect();

    let transitions = (0..RING_SAMPLES)
        .filter(|&k| bright[k] != bright[(k + 1) % RING_SAMPLES])
        .count();
    if transitions != 4 {
        return false;
    }

    let half = RING_SAMPLES / 2;
    let mismatches = (0..half).filter(|&k| bright[k] != bright[k + half]).count();
    mismatches <= 2
}

/// Drop candidates within `min_distance` of a stronger one. Input must be
/// sorted by descending score.
pub fn suppress_duplicates(candidates: Vec<(Point2<f64>, f32)>, min_distance: f64) -> Vec<(Point2<f64>, f32)> {
    let mut kept: Vec<(Point2<f64>, f32)> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept
            .iter()
            .all(|(p, _)| (p - candidate.0).norm() >= min_distance)
        {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadrants(size: u32, split: f64) -> FloatImage {
        ImageBuffer::from_fn(size, size, |x, y| {
            let dark = (f64::from(x) < split) == (f64::from(y) < split);
            Luma([if dark { 0.0 } else { 255.0 }])
        })
    }

    #[test]
    fn test_response_peaks_at_junction() {
        let image = imageproc::filter::gaussian_blur_f32(&quadrants(21, 10.5), 1.5);
        let response = saddle_response(&image);
        let maxima = local_maxima(&response, 0.5, 3, 3);
        assert_eq!(maxima.len(), 1, "{:?}", maxima);
        let (p, _) = maxima[0];
        assert!((p.x - 10.5).abs() <= 0.5 && (p.y - 10.5).abs() <= 0.5);
    }

    #[test]
    fn test_ring_test_accepts_saddle() {
        let image = quadrants(21, 10.5);
        assert!(passes_ring_test(&image, Point2::new(10.5, 10.5), 5.0, 20.0));
    }

    #[test]
    fn test_ring_test_rejects_edge_and_flat() {
        let edge: FloatImage = ImageBuffer::from_fn(21, 21, |x, _| Luma([if x >= 11 { 255.0 } else { 0.0 }]));
        assert!(!passes_ring_test(&edge, Point2::new(10.5, 10.5), 5.0, 20.0));

        let flat = FloatImage::new(21, 21);
        assert!(!passes_ring_test(&flat, Point2::new(10.5, 10.5), 5.0, 20.0));
    }

    #[test]
    fn test_ring_outside_image_rejected() {
        let image = quadrants(21, 10.5);
        assert!(!passes_ring_test(&image, Point2::new(2.0, 10.5), 5.0, 20.0));
    }

    #[test]
    fn test_suppress_duplicates_keeps_strongest() {
        let candidates = vec![
            (Point2::new(10.0, 10.0), 5.0),
            (Point2::new(11.0, 10.0), 4.0),
            (Point2::new(30.0, 10.0), 3.0),
        ];
        let kept = suppress_duplicates(candidates, 3.0);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].0, Point2::new(10.0, 10.0));
        assert_eq!(kept[1].0, Point2::new(30.0, 10.0));
    }
}
