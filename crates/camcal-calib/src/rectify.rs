//! Bouguet rectification of a calibrated pair.
//!
//! Each camera is rotated half-way towards the other, then both are turned
//! so the baseline lies along the image x (or y) axis. Principal points are
//! placed so the rectified images share a zero-disparity centre.

use camcal_core::{rodrigues, ImageSize, Pose};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::CalibError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectification {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    /// Projects rectified left-frame points into the rectified left image.
    pub p1: Matrix3x4<f64>,
    /// Projects rectified left-frame points into the rectified right image.
    pub p2: Matrix3x4<f64>,
    /// Maps `(x, y, disparity, 1)` to homogeneous 3D.
    pub q: Matrix4<f64>,
    pub horizontal: bool,
}

/// Mean rectified position of the four image corners under focal `f` and
/// principal point zero.
fn mean_rectified_corner(camera: &Camera, r: &Matrix3<f64>, size: ImageSize, f: f64) -> Option<Point2<f64>> {
    let (w, h) = ((size.width as f64 - 1.0).max(0.0), (size.height as f64 - 1.0).max(0.0));
    let mut sum = Vector3::zeros();
    for px in [Point2::new(0.0, 0.0), Point2::new(w, 0.0), Point2::new(0.0, h), Point2::new(w, h)] {
        let n = camera.pixel_to_normalized(&px);
        let ray = r * Vector3::new(n.x, n.y, 1.0);
        if ray.z.abs() < 1e-12 {
            return None;
        }
        sum += Vector3::new(f * ray.x / ray.z, f * ray.y / ray.z, 1.0);
    }
    Some(Point2::new(sum.x / 4.0, sum.y / 4.0))
}

/// Rectifying rotations, projections and the disparity-to-depth matrix.
///
/// `rotation`, `translation` map left-camera points into the right camera.
pub fn stereo_rectify(
    left: &Camera,
    right: &Camera,
    size: ImageSize,
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
) -> Result<Rectification, CalibError> {
    let half = Pose::from_rotation_translation(rotation, Vector3::zeros()).rvec * -0.5;
    let r_half = rodrigues(&half);
    let t = r_half * translation;

    let horizontal = t.x.abs() > t.y.abs();
    let idx = if horizontal { 0 } else { 1 };
    let c = t[idx];
    let nt = t.norm();
    if nt < 1e-12 {
        return Err(CalibError::Initialization("zero baseline".into()));
    }
    let mut axis = Vector3::zeros();
    axis[idx] = if c > 0.0 { 1.0 } else { -1.0 };
    let mut ww = t.cross(&axis);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / nt).clamp(-1.0, 1.0).acos() / nw;
    }
    let w_r = rodrigues(&ww);
    let r1 = w_r * r_half.transpose();
    let r2 = w_r * r_half;
    let t_new = r2 * translation;

    let (kl, kr) = (left.intrinsics, right.intrinsics);
    let f = if horizontal { kl.fy.min(kr.fy) } else { kl.fx.min(kr.fx) };

    let centre = Point2::new(
        (size.width as f64 - 1.0) / 2.0,
        (size.height as f64 - 1.0) / 2.0,
    );
    let ml = mean_rectified_corner(left, &r1, size, f).ok_or(CalibError::NonFinite)?;
    let mr = mean_rectified_corner(right, &r2, size, f).ok_or(CalibError::NonFinite)?;
    let cl = centre - ml.coords;
    let cr = centre - mr.coords;
    let (cx, cy) = (0.5 * (cl.x + cr.x), 0.5 * (cl.y + cr.y));

    let p1 = Matrix3x4::new(f, 0.0, cx, 0.0, 0.0, f, cy, 0.0, 0.0, 0.0, 1.0, 0.0);
    let mut p2 = p1;
    p2[(idx, 3)] = t_new[idx] * f;

    let tx = t_new[idx];
    let mut q = Matrix4::zeros();
    q[(0, 0)] = 1.0;
    q[(1, 1)] = 1.0;
    q[(0, 3)] = -cx;
    q[(1, 3)] = -cy;
    q[(2, 3)] = f;
    q[(3, 2)] = -1.0 / tx;

    let all_finite = r1.iter().chain(r2.iter()).chain(q.iter()).all(|v| v.is_finite());
    if !all_finite {
        return Err(CalibError::NonFinite);
    }
    Ok(Rectification {
        r1,
        r2,
        p1,
        p2,
        q,
        horizontal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraModel, Intrinsics};
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    fn cameras() -> (Camera, Camera) {
        (
            Camera::pinhole(CameraModel::Standard, Intrinsics::new(800.0, 790.0, 330.0, 235.0)),
            Camera::pinhole(CameraModel::Standard, Intrinsics::new(810.0, 805.0, 315.0, 245.0)),
        )
    }

    fn project(p: &Matrix3x4<f64>, x: &Vector3<f64>) -> Point2<f64> {
        let h = p * Vector4::new(x.x, x.y, x.z, 1.0);
        Point2::new(h.x / h.z, h.y / h.z)
    }

    #[test]
    fn rectified_rows_agree_and_q_recovers_depth() {
        let (l, r) = cameras();
        let rot = rodrigues(&Vector3::new(0.02, -0.04, 0.01));
        let t = Vector3::new(-0.1, 0.004, 0.002);
        let rect = stereo_rectify(&l, &r, ImageSize::new(640, 480), &rot, &t).unwrap();
        assert!(rect.horizontal);
        assert_relative_eq!(rect.r1.determinant(), 1.0, epsilon = 1e-9);

        // The rectified right frame differs from the left only along x.
        let shift = rect.r2 * t;
        assert_relative_eq!(shift.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(shift.z, 0.0, epsilon = 1e-12);

        for x in [Vector3::new(0.1, -0.05, 1.2), Vector3::new(-0.2, 0.1, 2.5)] {
            let xr = rect.r1 * x;
            let (u1, u2) = (project(&rect.p1, &xr), project(&rect.p2, &xr));
            assert_relative_eq!(u1.y, u2.y, max_relative = 1e-9);

            // Same point seen through the right camera's rectified frame.
            let xr2 = rect.r2 * (rot * x + t);
            let k = Matrix3::new(rect.p1[(0, 0)], 0.0, rect.p1[(0, 2)], 0.0, rect.p1[(1, 1)], rect.p1[(1, 2)], 0.0, 0.0, 1.0);
            let v = k * xr2;
            assert_relative_eq!(v.x / v.z, u2.x, max_relative = 1e-9);

            let d = u1.x - u2.x;
            let h = rect.q * Vector4::new(u1.x, u1.y, d, 1.0);
            assert_relative_eq!(h.z / h.w, xr.z, max_relative = 1e-9);
        }
    }

    #[test]
    fn vertical_baseline_shifts_rows() {
        let (l, r) = cameras();
        let rect = stereo_rectify(&l, &r, ImageSize::new(640, 480), &Matrix3::identity(), &Vector3::new(0.0, 0.12, 0.0))
            .unwrap();
        assert!(!rect.horizontal);
        assert_eq!(rect.p2[(0, 3)], 0.0);
        assert!(rect.p2[(1, 3)].abs() > 0.0);
    }

    #[test]
    fn zero_baseline_is_rejected() {
        let (l, r) = cameras();
        let res = stereo_rectify(&l, &r, ImageSize::new(640, 480), &Matrix3::identity(), &Vector3::zeros());
        assert!(res.is_err());
    }
}
