//! Two-camera extrinsic calibration with fixed intrinsics.
//!
//! The right camera sees board point `X` of pair `k` at
//! `R * (R_k X + t_k) + T`, where `(R_k, t_k)` is the left pose of that
//! pair. `R, T` and every left pose are refined jointly against both
//! cameras' reprojections.

use camcal_core::{rodrigues, PointSet, Pose};
use log::info;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::CalibError;
use crate::lm::{diff_step, levenberg_marquardt, LmReport, NllsProblem};
use crate::mono::{check_views, pose_at, push_pose, write_view_residuals, CalibOptions, POSE_LEN};
use crate::reprojection::view_error;

/// One camera's share of a stereo run; views and poses are pair-aligned.
#[derive(Clone, Copy, Debug)]
pub struct StereoSide<'a> {
    pub camera: &'a Camera,
    pub views: &'a [PointSet],
    /// Per-view poses from that camera's own calibration.
    pub poses: &'a [Pose],
}

/// Relative pose and errors of a calibrated pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StereoCalibration {
    pub left: Camera,
    pub right: Camera,
    /// `X_right = rotation * X_left + translation`.
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub left_poses: Vec<Pose>,
    pub left_errors: Vec<f64>,
    pub right_errors: Vec<f64>,
    /// Mean of the left and right error of each pair.
    pub per_pair_errors: Vec<f64>,
    /// Mean over all `2N` per-view errors.
    pub mean_error: f64,
    pub report: LmReport,
}

impl StereoCalibration {
    /// `|T|`, in board units.
    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }

    /// `[T]ₓ R`, from the calibrated pose.
    pub fn essential(&self) -> Matrix3<f64> {
        self.translation.cross_matrix() * self.rotation
    }

    /// `K_r⁻ᵀ E K_l⁻¹`, from the calibrated pose.
    pub fn fundamental(&self) -> Option<Matrix3<f64>> {
        let kl_inv = self.left.matrix().try_inverse()?;
        let kr_inv = self.right.matrix().try_inverse()?;
        Some(kr_inv.transpose() * self.essential() * kl_inv)
    }

    /// Right-camera pose of pair `k`.
    pub fn right_pose(&self, k: usize) -> Option<Pose> {
        self.left_poses
            .get(k)
            .map(|p| compose(&self.rotation, &self.translation, p))
    }
}

fn compose(r: &Matrix3<f64>, t: &Vector3<f64>, left: &Pose) -> Pose {
    let rot = r * left.rotation();
    Pose::from_rotation_translation(&rot, r * left.tvec + t)
}

fn median(mut v: Vec<f64>) -> f64 {
    v.sort_by(f64::total_cmp);
    let n = v.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        v[n / 2]
    } else {
        0.5 * (v[n / 2 - 1] + v[n / 2])
    }
}

/// Component-wise median of the per-pair relative poses.
fn initial_relative_pose(left: &[Pose], right: &[Pose]) -> Pose {
    let rel: Vec<Pose> = left
        .iter()
        .zip(right)
        .map(|(l, r)| {
            let rot = r.rotation() * l.rotation().transpose();
            Pose::from_rotation_translation(&rot, r.tvec - rot * l.tvec)
        })
        .collect();
    let med = |f: &dyn Fn(&Pose) -> f64| median(rel.iter().map(f).collect());
    Pose::new(
        Vector3::new(med(&|p| p.rvec.x), med(&|p| p.rvec.y), med(&|p| p.rvec.z)),
        Vector3::new(med(&|p| p.tvec.x), med(&|p| p.tvec.y), med(&|p| p.tvec.z)),
    )
}

/// Parameters `[rvec_rel, T | rvec_k, t_k per pair]`; rows are grouped by
/// pair, left residuals first.
struct StereoProblem<'a> {
    left: &'a Camera,
    right: &'a Camera,
    left_views: &'a [PointSet],
    right_views: &'a [PointSet],
    offsets: Vec<usize>,
    rows: usize,
}

impl<'a> StereoProblem<'a> {
    fn new(left: StereoSide<'a>, right: StereoSide<'a>) -> Self {
        let mut offsets = Vec::with_capacity(left.views.len());
        let mut rows = 0;
        for (l, r) in left.views.iter().zip(right.views) {
            offsets.push(rows);
            rows += 2 * (l.len() + r.len());
        }
        Self {
            left: left.camera,
            right: right.camera,
            left_views: left.views,
            right_views: right.views,
            offsets,
            rows,
        }
    }

    fn param_len(&self) -> usize {
        POSE_LEN * (1 + self.left_views.len())
    }

    fn pair_rows(&self, k: usize) -> usize {
        2 * (self.left_views[k].len() + self.right_views[k].len())
    }

    fn pair_residuals(&self, rel: &Pose, pose: &Pose, k: usize, out: &mut [f64]) {
        let nl = 2 * self.left_views[k].len();
        write_view_residuals(self.left, pose, &self.left_views[k], &mut out[..nl]);
        let right_pose = compose(&rel.rotation(), &rel.tvec, pose);
        write_view_residuals(self.right, &right_pose, &self.right_views[k], &mut out[nl..]);
    }

    fn pose_of_pair(x: &[f64], k: usize) -> Pose {
        let o = POSE_LEN * (1 + k);
        pose_at(&x[o..o + POSE_LEN])
    }
}

impl NllsProblem for StereoProblem<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let xs = x.as_slice();
        let rel = pose_at(&xs[..POSE_LEN]);
        let mut r = DVector::zeros(self.rows);
        for k in 0..self.left_views.len() {
            let o = self.offsets[k];
            let n = self.pair_rows(k);
            self.pair_residuals(&rel, &Self::pose_of_pair(xs, k), k, &mut r.as_mut_slice()[o..o + n]);
        }
        r
    }

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.rows, self.param_len());
        let mut xp = x.clone();
        for c in 0..POSE_LEN {
            let h = diff_step(x[c]);
            xp[c] = x[c] + h;
            let fp = self.residuals(&xp);
            xp[c] = x[c] - h;
            let fm = self.residuals(&xp);
            xp[c] = x[c];
            jac.set_column(c, &((fp - fm) / (2.0 * h)));
        }

        let xs = x.as_slice();
        let rel = pose_at(&xs[..POSE_LEN]);
        for k in 0..self.left_views.len() {
            let (o, n) = (self.offsets[k], self.pair_rows(k));
            let c0 = POSE_LEN * (1 + k);
            let mut p: Vec<f64> = xs[c0..c0 + POSE_LEN].to_vec();
            let (mut fp, mut fm) = (vec![0.0; n], vec![0.0; n]);
            for c in 0..POSE_LEN {
                let v = p[c];
                let h = diff_step(v);
                p[c] = v + h;
                self.pair_residuals(&rel, &pose_at(&p), k, &mut fp);
                p[c] = v - h;
                self.pair_residuals(&rel, &pose_at(&p), k, &mut fm);
                p[c] = v;
                for r in 0..n {
                    jac[(o + r, c0 + c)] = (fp[r] - fm[r]) / (2.0 * h);
                }
            }
        }
        jac
    }
}

/// Refine the relative pose of two calibrated cameras from pair-aligned
/// views.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "info", skip_all, fields(pairs = left.views.len()))
)]
pub fn calibrate_stereo(
    left: StereoSide<'_>,
    right: StereoSide<'_>,
    opts: &CalibOptions,
) -> Result<StereoCalibration, CalibError> {
    let n = left.views.len();
    if right.views.len() != n || left.poses.len() != n || right.poses.len() != n {
        return Err(CalibError::StereoMismatch(format!(
            "{} left views, {} right views, {}/{} poses",
            n,
            right.views.len(),
            left.poses.len(),
            right.poses.len()
        )));
    }
    if left.camera.model != right.camera.model {
        return Err(CalibError::StereoMismatch(format!(
            "camera models differ ({} vs {})",
            left.camera.model, right.camera.model
        )));
    }
    check_views(left.views)?;
    check_views(right.views)?;

    let problem = StereoProblem::new(left, right);
    if problem.rows < problem.param_len() {
        return Err(CalibError::NotEnoughEquations {
            residuals: problem.rows,
            params: problem.param_len(),
        });
    }

    let rel0 = initial_relative_pose(left.poses, right.poses);
    let mut x0 = Vec::with_capacity(problem.param_len());
    push_pose(&mut x0, &rel0);
    for p in left.poses {
        push_pose(&mut x0, p);
    }
    let (x, report) = levenberg_marquardt(&problem, DVector::from_vec(x0), &opts.lm)?;
    if !x.iter().all(|v| v.is_finite()) {
        return Err(CalibError::NonFinite);
    }

    let xs = x.as_slice();
    let rel = pose_at(&xs[..POSE_LEN]);
    let rotation = rodrigues(&rel.rvec);
    let translation = rel.tvec;
    let left_poses: Vec<Pose> = (0..n).map(|k| StereoProblem::pose_of_pair(xs, k)).collect();

    let left_errors: Vec<f64> = left_poses
        .iter()
        .zip(left.views)
        .map(|(p, v)| view_error(left.camera, p, v))
        .collect();
    let right_errors: Vec<f64> = left_poses
        .iter()
        .zip(right.views)
        .map(|(p, v)| view_error(right.camera, &compose(&rotation, &translation, p), v))
        .collect();
    let per_pair_errors: Vec<f64> = left_errors
        .iter()
        .zip(&right_errors)
        .map(|(l, r)| 0.5 * (l + r))
        .collect();
    let mean_error = (left_errors.iter().sum::<f64>() + right_errors.iter().sum::<f64>()) / (2 * n) as f64;
    info!(
        "stereo calibration over {n} pairs: baseline {:.4}, mean error {mean_error:.4}",
        translation.norm()
    );

    Ok(StereoCalibration {
        left: left.camera.clone(),
        right: right.camera.clone(),
        rotation,
        translation,
        left_poses,
        left_errors,
        right_errors,
        per_pair_errors,
        mean_error,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn median_of_even_and_odd_lists() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(vec![]), 0.0);
    }

    #[test]
    fn relative_pose_of_consistent_pairs_is_exact() {
        let r = rodrigues(&Vector3::new(0.01, -0.05, 0.02));
        let t = Vector3::new(-0.12, 0.003, 0.001);
        let left = vec![
            Pose::new(Vector3::new(0.2, 0.1, 0.0), Vector3::new(0.0, 0.0, 0.8)),
            Pose::new(Vector3::new(-0.3, 0.0, 0.1), Vector3::new(0.1, 0.0, 1.0)),
            Pose::new(Vector3::new(0.0, 0.4, -0.2), Vector3::new(-0.1, 0.05, 0.7)),
        ];
        let right: Vec<Pose> = left.iter().map(|p| compose(&r, &t, p)).collect();
        let rel = initial_relative_pose(&left, &right);
        assert_relative_eq!(rel.rotation(), r, epsilon = 1e-9);
        assert_relative_eq!(rel.tvec, t, epsilon = 1e-9);
    }
}
