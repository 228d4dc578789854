//! Iterative sub-pixel corner localisation.
//!
//! At the true corner `q`, every image gradient `g` sampled at `p` in the
//! window is orthogonal to `p - q`. Solving `Σ w g gᵀ q = Σ w g gᵀ p` for
//! `q` and iterating converges to the saddle point.

use camcal_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};

use crate::params::SubPixParams;

fn refine_one(img: &GrayImageView<'_>, start: Point2<f64>, params: &SubPixParams) -> Point2<f64> {
    let w = params.half_window as i32;
    let sigma = params.half_window.max(1) as f64;
    let inv_two_sigma2 = 1.0 / (2.0 * sigma * sigma);
    let sample = |x: f64, y: f64| sample_bilinear(img, x as f32, y as f32) as f64;

    let mut q = start;
    for _ in 0..params.max_iterations {
        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();
        for dy in -w..=w {
            for dx in -w..=w {
                let (px, py) = (q.x + dx as f64, q.y + dy as f64);
                let gx = 0.5 * (sample(px + 1.0, py) - sample(px - 1.0, py));
                let gy = 0.5 * (sample(px, py + 1.0) - sample(px, py - 1.0));
                let weight = (-((dx * dx + dy * dy) as f64) * inv_two_sigma2).exp();
                let (gxx, gxy, gyy) = (gx * gx * weight, gx * gy * weight, gy * gy * weight);
                a[(0, 0)] += gxx;
                a[(0, 1)] += gxy;
                a[(1, 0)] += gxy;
                a[(1, 1)] += gyy;
                b[0] += gxx * px + gxy * py;
                b[1] += gxy * px + gyy * py;
            }
        }

        let Some(inv) = a.try_inverse() else {
            break;
        };
        let next = inv * b;
        let next = Point2::new(next[0], next[1]);
        let step = (next - q).norm();
        q = next;
        if step <= params.epsilon {
            break;
        }
    }

    // Runaway solutions keep the original estimate.
    if (q.x - start.x).abs() > w as f64 || (q.y - start.y).abs() > w as f64 || !q.x.is_finite() {
        start
    } else {
        q
    }
}

/// Refine every point in `points` in place.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip_all, fields(n = points.len(), w = params.half_window))
)]
pub fn refine_corners_subpix(img: &GrayImageView<'_>, points: &mut [Point2<f64>], params: &SubPixParams) {
    for p in points.iter_mut() {
        *p = refine_one(img, *p, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::render_checkerboard_at as render_checkerboard;

    #[test]
    fn converges_to_true_corner_from_offset_start() {
        let img = render_checkerboard(160, 160, 3, 3, 30.0, Point2::new(20.0, 20.0));
        let truth = Point2::new(50.0, 80.0);
        let mut pts = [Point2::new(51.6, 78.9)];
        refine_corners_subpix(&img.view(), &mut pts, &SubPixParams::standard());
        assert!((pts[0] - truth).norm() < 0.15, "got {:?}", pts[0]);

        let mut fine = [Point2::new(51.6, 78.9)];
        refine_corners_subpix(&img.view(), &mut fine, &SubPixParams::optimize());
        assert!((fine[0] - truth).norm() < 0.1, "got {:?}", fine[0]);
    }

    #[test]
    fn flat_region_keeps_start() {
        let img = camcal_core::GrayImage::filled(40, 40, 128);
        let mut pts = [Point2::new(20.3, 19.7)];
        refine_corners_subpix(&img.view(), &mut pts, &SubPixParams::standard());
        assert_eq!(pts[0], Point2::new(20.3, 19.7));
    }
}
