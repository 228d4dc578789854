//! Closed-form starting point for the joint solve.
//!
//! The principal point starts at the image centre. Focal lengths follow from
//! the orthogonality and equal-norm constraints on the first two columns of
//! each view homography (the vanishing points of the board axes), which
//! works from a single tilted view. Poses come from `K⁻¹H`, projected back
//! onto SO(3).

use camcal_core::{estimate_homography, ImageSize, PointSet, Pose};
use log::debug;
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

use crate::camera::Intrinsics;

/// Board-to-image homography of one planar view.
pub fn view_homography(view: &PointSet) -> Option<Matrix3<f64>> {
    estimate_homography(&view.planar_object_xy(), view.image_points()).map(|h| h.h)
}

/// Focal lengths from view homographies, principal point at the centre.
///
/// Solves for `(1/fx², 1/fy²)` first; if that is ill-posed (all views
/// nearly fronto-parallel, or a negative solution), retries with
/// `fx = fy`, and finally falls back to the larger image side.
pub fn init_intrinsics(homographies: &[Matrix3<f64>], size: ImageSize) -> Intrinsics {
    let (cx, cy) = (size.width as f64 / 2.0, size.height as f64 / 2.0);
    let fallback = size.width.max(size.height) as f64;
    let centre = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    // Each view contributes two rows `a * A0 + b * A1 = -c`.
    let mut rows: Vec<(f64, f64, f64)> = Vec::with_capacity(2 * homographies.len());
    for h in homographies {
        let hc = centre * h;
        let n = hc.norm();
        if n < 1e-12 {
            continue;
        }
        let hc = hc / n;
        let (h11, h21, h31) = (hc[(0, 0)], hc[(1, 0)], hc[(2, 0)]);
        let (h12, h22, h32) = (hc[(0, 1)], hc[(1, 1)], hc[(2, 1)]);
        rows.push((h11 * h12, h21 * h22, h31 * h32));
        rows.push((h11 * h11 - h12 * h12, h21 * h21 - h22 * h22, h31 * h31 - h32 * h32));
    }

    let sane = |f: f64| f.is_finite() && f > 0.05 * fallback && f < 50.0 * fallback;

    let mut ata = Matrix2::zeros();
    let mut atb = Vector2::zeros();
    for &(a0, a1, c) in &rows {
        let a = Vector2::new(a0, a1);
        ata += a * a.transpose();
        atb -= a * c;
    }
    if let Some(ab) = ata.try_inverse().map(|inv| inv * atb) {
        if ab.x > 0.0 && ab.y > 0.0 {
            let (fx, fy) = (1.0 / ab.x.sqrt(), 1.0 / ab.y.sqrt());
            if sane(fx) && sane(fy) && (fx / fy).max(fy / fx) < 1.5 {
                return Intrinsics::new(fx, fy, cx, cy);
            }
        }
    }

    let (num, den) = rows
        .iter()
        .fold((0.0, 0.0), |(n, d), &(a0, a1, c)| (n - (a0 + a1) * c, d + (a0 + a1).powi(2)));
    if den > 1e-18 && num / den > 0.0 {
        let f = 1.0 / (num / den).sqrt();
        if sane(f) {
            return Intrinsics::new(f, f, cx, cy);
        }
    }

    debug!("focal initialization ill-posed, using {fallback}px");
    Intrinsics::new(fallback, fallback, cx, cy)
}

/// Board pose from a homography and a camera matrix, board in front.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<Pose> {
    let m = k.try_inverse()? * h;
    let (m1, m2, m3): (Vector3<f64>, Vector3<f64>, Vector3<f64>) = (
        m.column(0).into_owned(),
        m.column(1).into_owned(),
        m.column(2).into_owned(),
    );
    let norm = 0.5 * (m1.norm() + m2.norm());
    if norm < 1e-12 {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if m3.z * lambda < 0.0 {
        lambda = -lambda;
    }
    let r1 = m1 * lambda;
    let r2 = m2 * lambda;
    let r3 = r1.cross(&r2);
    let approx = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = approx.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u = u;
        u.column_mut(2).neg_mut();
        r = u * v_t;
    }
    let t = m3 * lambda;
    if !(r.iter().all(|v| v.is_finite()) && t.iter().all(|v| v.is_finite())) {
        return None;
    }
    Some(Pose::from_rotation_translation(&r, t))
}
