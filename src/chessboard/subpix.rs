//! Iterative sub-pixel corner refinement.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use super::filters::{sample, Gradients};

/// Search window and termination criteria for [`corner_sub_pix`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half the side of the search window, in pixels.
    pub half_window: u32,
    pub max_iterations: u32,
    /// Stop once an update moves the corner less than this many pixels.
    pub epsilon: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 3,
            max_iterations: 30,
            epsilon: 0.01,
        }
    }
}

/// Move `initial` to the point where the image gradients in the surrounding
/// window are orthogonal to the offsets from it.
///
/// Returns `initial` unchanged if the estimate leaves the search window.
pub fn corner_sub_pix(gradients: &Gradients, initial: Point2<f64>, params: &SubPixParams) -> Point2<f64> {
    let half = params.half_window.max(1) as i32;
    let weight_scale = 1.0 / f64::from(half * half);
    let mut current = initial;

    for _ in 0..params.max_iterations.max(1) {
        let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);

        for dy in -half..=half {
            for dx in -half..=half {
                let (ox, oy) = (f64::from(dx), f64::from(dy));
                let gx = sample(&gradients.x, current.x + ox, current.y + oy);
                let gy = sample(&gradients.y, current.x + ox, current.y + oy);
                let weight = (-(ox * ox + oy * oy) * weight_scale).exp();

                let gxx = gx * gx * weight;
                let gxy = gx * gy * weight;
                let gyy = gy * gy * weight;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * ox + gxy * oy;
                bb2 += gxy * ox + gyy * oy;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= 1e-12 * (a * c).abs().max(1.0) {
            break;
        }
        let qx = (c * bb1 - b * bb2) / det;
        let qy = (a * bb2 - b * bb1) / det;
        current = Point2::new(current.x + qx, current.y + qy);

        if qx * qx + qy * qy <= params.epsilon * params.epsilon {
            break;
        }
    }

    let limit = f64::from(half);
    if !current.x.is_finite()
        || !current.y.is_finite()
        || (current.x - initial.x).abs() > limit
        || (current.y - initial.y).abs() > limit
    {
        return initial;
    }
    current
}
