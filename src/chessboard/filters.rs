//! Grayscale preprocessing shared by the corner detector.

use image::{GrayImage, ImageBuffer, Luma, Primitive};
use imageproc::contrast::equalize_histogram;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_scharr, vertical_scharr};

/// Single-channel floating point image.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

fn to_float<T>(image: &ImageBuffer<Luma<T>, Vec<T>>) -> FloatImage
where
    T: Primitive + Into<f32>,
{
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0].into()])
    })
}

/// Histogram-equalized (when `normalize` is set) and Gaussian-smoothed copy of `gray`.
pub fn smooth(gray: &GrayImage, normalize: bool, sigma: f32) -> FloatImage {
    let float = if normalize {
        to_float(&equalize_histogram(gray))
    } else {
        to_float(gray)
    };
    if sigma > 0.0 {
        gaussian_blur_f32(&float, sigma)
    } else {
        float
    }
}

#[inline]
fn clamped(image: &FloatImage, x: i64, y: i64) -> f64 {
    let x = x.clamp(0, i64::from(image.width()) - 1) as u32;
    let y = y.clamp(0, i64::from(image.height()) - 1) as u32;
    f64::from(image.get_pixel(x, y)[0])
}

/// Bilinear sample with edge clamping.
pub fn sample(image: &FloatImage, x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let p00 = clamped(image, x0, y0);
    let p10 = clamped(image, x0 + 1, y0);
    let p01 = clamped(image, x0, y0 + 1);
    let p11 = clamped(image, x0 + 1, y0 + 1);

    let top = p00 + (p10 - p00) * fx;
    let bottom = p01 + (p11 - p01) * fx;
    top + (bottom - top) * fy
}

pub fn contains(image: &FloatImage, x: f64, y: f64) -> bool {
    x >= 0.0
        && y >= 0.0
        && x <= f64::from(image.width()) - 1.0
        && y <= f64::from(image.height()) - 1.0
}

/// Scharr gradients of a grayscale image.
pub struct Gradients {
    pub x: FloatImage,
    pub y: FloatImage,
}

impl Gradients {
    pub fn new(gray: &GrayImage) -> Self {
        Self {
            x: to_float(&horizontal_scharr(gray)),
            y: to_float(&vertical_scharr(gray)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_preserves_constant() {
        let gray = GrayImage::from_pixel(9, 7, Luma([50]));
        let blurred = smooth(&gray, false, 1.5);
        assert_eq!(blurred.dimensions(), (9, 7));
        assert!(blurred.pixels().all(|p| (p[0] - 50.0).abs() < 1e-3));
    }

    #[test]
    fn test_equalization_stretches_range() {
        let gray = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8 * 10]));
        let equalized = smooth(&gray, true, 0.0);
        let values: Vec<f32> = equalized.pixels().map(|p| p[0]).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]), "{:?}", values);
        assert_eq!(values[3], 255.0);
    }

    #[test]
    fn test_bilinear_sample() {
        let image = FloatImage::from_raw(2, 2, vec![0.0, 10.0, 20.0, 30.0]).unwrap();
        assert!((sample(&image, 0.5, 0.5) - 15.0).abs() < 1e-9);
        assert!((sample(&image, -3.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((sample(&image, 1.0, 1.0) - 30.0).abs() < 1e-9);
        assert!(contains(&image, 1.0, 0.0));
        assert!(!contains(&image, 1.5, 0.0));
    }

    #[test]
    fn test_gradients_of_ramp() {
        let gray = GrayImage::from_fn(10, 10, |x, _| Luma([(x * 10) as u8]));
        let gradients = Gradients::new(&gray);
        assert!((sample(&gradients.x, 5.0, 5.0).abs() - 320.0).abs() < 1e-3);
        assert!(sample(&gradients.y, 5.0, 5.0).abs() < 1e-3);
    }
}
