//! Single-camera calibration: intrinsics, distortion and one pose per view
//! refined jointly.

use camcal_core::{ImageSize, PointSet, Pose};
use log::{debug, info};
use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, CameraModel};
use crate::error::CalibError;
use crate::init::{init_intrinsics, pose_from_homography, view_homography};
use crate::lm::{diff_step, levenberg_marquardt, LmOptions, LmReport, NllsProblem};
use crate::reprojection::{rms_error, view_error};

/// Solve settings shared by mono and stereo runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibOptions {
    pub lm: LmOptions,
    /// Largest accepted singular-value ratio of a view's pose Jacobian
    /// (fisheye runs only).
    pub max_condition: f64,
}

impl Default for CalibOptions {
    fn default() -> Self {
        Self {
            lm: LmOptions::default(),
            max_condition: 1e6,
        }
    }
}

/// Output of [`calibrate_mono`]; poses and errors follow the view order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonoCalibration {
    pub camera: Camera,
    pub poses: Vec<Pose>,
    /// Root mean square over all points.
    pub rms: f64,
    pub per_view_errors: Vec<f64>,
    /// Plain mean of `per_view_errors`.
    pub mean_error: f64,
    pub report: LmReport,
}

pub(crate) const POSE_LEN: usize = 6;

#[inline]
pub(crate) fn pose_at(x: &[f64]) -> Pose {
    Pose::new(
        Vector3::new(x[0], x[1], x[2]),
        Vector3::new(x[3], x[4], x[5]),
    )
}

#[inline]
pub(crate) fn push_pose(out: &mut Vec<f64>, pose: &Pose) {
    out.extend_from_slice(pose.rvec.as_slice());
    out.extend_from_slice(pose.tvec.as_slice());
}

/// Residuals of one view, `[dx0, dy0, dx1, dy1, ...]`.
pub(crate) fn write_view_residuals(camera: &Camera, pose: &Pose, view: &PointSet, out: &mut [f64]) {
    for (k, (_, obj, img)) in view.iter().enumerate() {
        let p = camera.project_camera_point(&pose.transform_point(obj).coords);
        out[2 * k] = p.x - img.x;
        out[2 * k + 1] = p.y - img.y;
    }
}

/// Joint problem over `[camera params | rvec, tvec per view]`.
struct MonoProblem<'a> {
    model: CameraModel,
    views: &'a [PointSet],
    offsets: Vec<usize>,
    rows: usize,
}

impl<'a> MonoProblem<'a> {
    fn new(model: CameraModel, views: &'a [PointSet]) -> Self {
        let mut offsets = Vec::with_capacity(views.len());
        let mut rows = 0;
        for v in views {
            offsets.push(rows);
            rows += 2 * v.len();
        }
        Self {
            model,
            views,
            offsets,
            rows,
        }
    }

    fn param_len(&self) -> usize {
        self.model.param_len() + POSE_LEN * self.views.len()
    }

    fn camera(&self, x: &DVector<f64>) -> Camera {
        Camera::from_params(self.model, &x.as_slice()[..self.model.param_len()])
    }

    fn pose(&self, x: &DVector<f64>, view: usize) -> Pose {
        let o = self.model.param_len() + POSE_LEN * view;
        pose_at(&x.as_slice()[o..o + POSE_LEN])
    }

    fn view_residuals(&self, camera: &Camera, pose: &Pose, view: usize) -> Vec<f64> {
        let mut r = vec![0.0; 2 * self.views[view].len()];
        write_view_residuals(camera, pose, &self.views[view], &mut r);
        r
    }

    /// `2n × 6` Jacobian of one view's residuals with respect to its pose.
    fn pose_block(&self, x: &DVector<f64>, view: usize) -> DMatrix<f64> {
        let camera = self.camera(x);
        let o = self.model.param_len() + POSE_LEN * view;
        let n = 2 * self.views[view].len();
        let mut block = DMatrix::zeros(n, POSE_LEN);
        let mut p: Vec<f64> = x.as_slice()[o..o + POSE_LEN].to_vec();
        for c in 0..POSE_LEN {
            let v = p[c];
            let h = diff_step(v);
            p[c] = v + h;
            let fp = self.view_residuals(&camera, &pose_at(&p), view);
            p[c] = v - h;
            let fm = self.view_residuals(&camera, &pose_at(&p), view);
            p[c] = v;
            for r in 0..n {
                block[(r, c)] = (fp[r] - fm[r]) / (2.0 * h);
            }
        }
        block
    }
}

impl NllsProblem for MonoProblem<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let camera = self.camera(x);
        let mut r = DVector::zeros(self.rows);
        for (k, view) in self.views.iter().enumerate() {
            let o = self.offsets[k];
            write_view_residuals(&camera, &self.pose(x, k), view, &mut r.as_mut_slice()[o..o + 2 * view.len()]);
        }
        r
    }

    /// Camera columns touch every row; pose columns only their own view.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.rows, self.param_len());
        let mut xp = x.clone();
        for c in 0..self.model.param_len() {
            let h = diff_step(x[c]);
            xp[c] = x[c] + h;
            let fp = self.residuals(&xp);
            xp[c] = x[c] - h;
            let fm = self.residuals(&xp);
            xp[c] = x[c];
            jac.set_column(c, &((fp - fm) / (2.0 * h)));
        }
        for k in 0..self.views.len() {
            let block = self.pose_block(x, k);
            let c0 = self.model.param_len() + POSE_LEN * k;
            jac.view_mut((self.offsets[k], c0), block.shape())
                .copy_from(&block);
        }
        jac
    }
}

/// Shape checks shared by mono and stereo runs.
pub(crate) fn check_views(views: &[PointSet]) -> Result<(), CalibError> {
    if views.is_empty() {
        return Err(CalibError::TooFewViews { needed: 1, found: 0 });
    }
    if let Some((view, v)) = views.iter().enumerate().find(|(_, v)| v.len() < 4) {
        return Err(CalibError::TooFewPoints {
            view,
            found: v.len(),
        });
    }
    Ok(())
}

/// Initial poses for `camera`, one per view.
pub(crate) fn initial_poses(camera: &Camera, views: &[PointSet]) -> Result<Vec<Pose>, CalibError> {
    let k = camera.matrix();
    views
        .iter()
        .enumerate()
        .map(|(i, v)| {
            view_homography(v)
                .and_then(|h| pose_from_homography(&k, &h))
                .ok_or_else(|| CalibError::Initialization(format!("no pose for view {i}")))
        })
        .collect()
}

/// Calibrate one camera from planar views.
///
/// Every view must hold at least four points of a `z = 0` board. Fisheye
/// runs additionally reject views whose pose is numerically unobservable.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "info", skip_all, fields(views = views.len(), model = %model))
)]
pub fn calibrate_mono(
    views: &[PointSet],
    image_size: ImageSize,
    model: CameraModel,
    opts: &CalibOptions,
) -> Result<MonoCalibration, CalibError> {
    check_views(views)?;
    let problem = MonoProblem::new(model, views);
    let params = problem.param_len();
    if problem.rows < params {
        return Err(CalibError::NotEnoughEquations {
            residuals: problem.rows,
            params,
        });
    }

    let homographies: Vec<_> = views
        .iter()
        .enumerate()
        .map(|(i, v)| {
            view_homography(v)
                .ok_or_else(|| CalibError::Initialization(format!("no homography for view {i}")))
        })
        .collect::<Result<_, _>>()?;
    let camera0 = Camera::pinhole(model, init_intrinsics(&homographies, image_size));
    let poses0 = initial_poses(&camera0, views)?;
    debug!(
        "initial intrinsics fx={:.1} fy={:.1} cx={:.1} cy={:.1}",
        camera0.intrinsics.fx, camera0.intrinsics.fy, camera0.intrinsics.cx, camera0.intrinsics.cy
    );

    let mut x0 = camera0.params();
    for p in &poses0 {
        push_pose(&mut x0, p);
    }
    let (x, report) = levenberg_marquardt(&problem, DVector::from_vec(x0), &opts.lm)?;
    if !x.iter().all(|v| v.is_finite()) {
        return Err(CalibError::NonFinite);
    }

    if model == CameraModel::Fisheye {
        for k in 0..views.len() {
            let sv = problem.pose_block(&x, k).singular_values();
            let (max, min) = (sv.max(), sv.min());
            let ratio = if min > 0.0 { max / min } else { f64::INFINITY };
            if ratio > opts.max_condition {
                return Err(CalibError::IllConditioned { view: k, ratio });
            }
        }
    }

    let camera = problem.camera(&x);
    let poses: Vec<Pose> = (0..views.len()).map(|k| problem.pose(&x, k)).collect();
    let per_view_errors: Vec<f64> = poses
        .iter()
        .zip(views)
        .map(|(p, v)| view_error(&camera, p, v))
        .collect();
    let mean_error = per_view_errors.iter().sum::<f64>() / per_view_errors.len() as f64;
    let rms = rms_error(&camera, &poses, views);
    info!(
        "{model} calibration over {} views: rms {rms:.4}px, mean {mean_error:.4}, {} evaluations ({})",
        views.len(),
        report.evaluations,
        report.termination
    );

    Ok(MonoCalibration {
        camera,
        poses,
        rms,
        per_view_errors,
        mean_error,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::numeric_jacobian;
    use approx::assert_relative_eq;
    use crate::camera::Intrinsics;
    use nalgebra::{Point2, Point3};

    fn board() -> Vec<Point3<f64>> {
        (0..4)
            .flat_map(|j| (0..5).map(move |i| Point3::new(i as f64 * 0.03, j as f64 * 0.03, 0.0)))
            .collect()
    }

    fn view(camera: &Camera, pose: &Pose) -> PointSet {
        let obj = board();
        let img: Vec<Point2<f64>> = obj.iter().map(|p| camera.project(pose, p).unwrap()).collect();
        PointSet::new((0..obj.len() as u32).collect(), obj, img).unwrap()
    }

    #[test]
    fn block_jacobian_matches_dense_differences() {
        let cam = Camera::new(
            CameraModel::Standard,
            Intrinsics::new(500.0, 510.0, 320.0, 240.0),
            vec![-0.1, 0.01, 0.0, 0.0, 0.0],
        )
        .unwrap();
        let poses = [
            Pose::new(Vector3::new(0.2, -0.1, 0.0), Vector3::new(-0.05, -0.04, 0.5)),
            Pose::new(Vector3::new(-0.1, 0.3, 0.1), Vector3::new(-0.06, -0.05, 0.6)),
        ];
        let views: Vec<PointSet> = poses.iter().map(|p| view(&cam, p)).collect();
        let problem = MonoProblem::new(CameraModel::Standard, &views);
        let mut x = cam.params();
        for p in &poses {
            push_pose(&mut x, p);
        }
        let x = DVector::from_vec(x);
        let dense = numeric_jacobian(&x, |p| problem.residuals(p));
        assert_relative_eq!(problem.jacobian(&x), dense, epsilon = 1e-6);
    }

    #[test]
    fn empty_and_tiny_inputs_are_rejected() {
        let size = ImageSize::new(640, 480);
        let opts = CalibOptions::default();
        assert!(matches!(
            calibrate_mono(&[], size, CameraModel::Standard, &opts),
            Err(CalibError::TooFewViews { .. })
        ));
        let tiny = PointSet::new(
            vec![0, 1, 2],
            vec![Point3::origin(); 3],
            vec![Point2::origin(); 3],
        )
        .unwrap();
        assert!(matches!(
            calibrate_mono(&[tiny], size, CameraModel::Standard, &opts),
            Err(CalibError::TooFewPoints { view: 0, found: 3 })
        ));
    }
}
