//! Camera models: pinhole intrinsics with Brown–Conrady (standard) or
//! Kannala–Brandt (fisheye) distortion, zero skew in both.

use std::fmt;
use std::str::FromStr;

use camcal_core::Pose;
use nalgebra::{Matrix3, Point2, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::CalibError;

const UNDISTORT_ITERATIONS: usize = 20;

/// Lens model used for one calibration run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraModel {
    /// Pinhole with `[k1, k2, p1, p2, k3]`.
    #[default]
    Standard,
    /// Equidistant fisheye with `[k1, k2, k3, k4]`.
    Fisheye,
}

impl CameraModel {
    pub fn as_str(self) -> &'static str {
        match self {
            CameraModel::Standard => "standard",
            CameraModel::Fisheye => "fisheye",
        }
    }

    #[inline]
    pub fn distortion_len(self) -> usize {
        match self {
            CameraModel::Standard => 5,
            CameraModel::Fisheye => 4,
        }
    }

    /// Intrinsic plus distortion parameter count.
    #[inline]
    pub fn param_len(self) -> usize {
        4 + self.distortion_len()
    }
}

impl fmt::Display for CameraModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraModel {
    type Err = CalibError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "pinhole" => Ok(CameraModel::Standard),
            "fisheye" => Ok(CameraModel::Fisheye),
            other => Err(CalibError::UnknownModel(other.to_string())),
        }
    }
}

/// Focal lengths and principal point in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Reads `fx, fy, cx, cy`; skew is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }
}

/// A calibrated camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub model: CameraModel,
    pub intrinsics: Intrinsics,
    pub distortion: Vec<f64>,
}

impl Camera {
    pub fn new(
        model: CameraModel,
        intrinsics: Intrinsics,
        distortion: Vec<f64>,
    ) -> Result<Self, CalibError> {
        if distortion.len() != model.distortion_len() {
            return Err(CalibError::DistortionLength {
                model: model.as_str(),
                expected: model.distortion_len(),
                found: distortion.len(),
            });
        }
        Ok(Self {
            model,
            intrinsics,
            distortion,
        })
    }

    /// Camera without lens distortion.
    pub fn pinhole(model: CameraModel, intrinsics: Intrinsics) -> Self {
        Self {
            model,
            intrinsics,
            distortion: vec![0.0; model.distortion_len()],
        }
    }

    /// Inverse of [`Camera::params`]. `p` must hold `model.param_len()` values.
    pub(crate) fn from_params(model: CameraModel, p: &[f64]) -> Self {
        Self {
            model,
            intrinsics: Intrinsics::new(p[0], p[1], p[2], p[3]),
            distortion: p[4..model.param_len()].to_vec(),
        }
    }

    /// `[fx, fy, cx, cy, distortion...]`.
    pub fn params(&self) -> Vec<f64> {
        let i = &self.intrinsics;
        let mut p = vec![i.fx, i.fy, i.cx, i.cy];
        p.extend_from_slice(&self.distortion);
        p
    }

    #[inline]
    pub fn matrix(&self) -> Matrix3<f64> {
        self.intrinsics.matrix()
    }

    #[inline]
    fn d(&self, k: usize) -> f64 {
        self.distortion.get(k).copied().unwrap_or(0.0)
    }

    /// Distortion applied to an ideal normalized point.
    pub fn distort(&self, x: Vector2<f64>) -> Vector2<f64> {
        match self.model {
            CameraModel::Standard => {
                let (k1, k2, p1, p2, k3) = (self.d(0), self.d(1), self.d(2), self.d(3), self.d(4));
                let r2 = x.norm_squared();
                let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
                let xy = x.x * x.y;
                Vector2::new(
                    x.x * radial + 2.0 * p1 * xy + p2 * (r2 + 2.0 * x.x * x.x),
                    x.y * radial + p1 * (r2 + 2.0 * x.y * x.y) + 2.0 * p2 * xy,
                )
            }
            CameraModel::Fisheye => {
                let r = x.norm();
                if r < 1e-12 {
                    return x;
                }
                let theta = r.atan();
                x * (self.fisheye_theta_d(theta) / r)
            }
        }
    }

    #[inline]
    fn fisheye_theta_d(&self, theta: f64) -> f64 {
        let t2 = theta * theta;
        theta * (1.0 + t2 * (self.d(0) + t2 * (self.d(1) + t2 * (self.d(2) + t2 * self.d(3)))))
    }

    /// Iterative inverse of [`Camera::distort`].
    pub fn undistort(&self, xd: Vector2<f64>) -> Vector2<f64> {
        match self.model {
            CameraModel::Standard => {
                let (k1, k2, p1, p2, k3) = (self.d(0), self.d(1), self.d(2), self.d(3), self.d(4));
                let mut x = xd;
                for _ in 0..UNDISTORT_ITERATIONS {
                    let r2 = x.norm_squared();
                    let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
                    let xy = x.x * x.y;
                    let dx = 2.0 * p1 * xy + p2 * (r2 + 2.0 * x.x * x.x);
                    let dy = p1 * (r2 + 2.0 * x.y * x.y) + 2.0 * p2 * xy;
                    if radial.abs() < 1e-12 {
                        break;
                    }
                    x = Vector2::new((xd.x - dx) / radial, (xd.y - dy) / radial);
                }
                x
            }
            CameraModel::Fisheye => {
                let theta_d = xd.norm();
                if theta_d < 1e-12 {
                    return xd;
                }
                // Newton on theta_d(theta) = theta_d.
                let mut theta = theta_d;
                for _ in 0..UNDISTORT_ITERATIONS {
                    let t2 = theta * theta;
                    let f = self.fisheye_theta_d(theta) - theta_d;
                    let df = 1.0
                        + t2 * (3.0 * self.d(0)
                            + t2 * (5.0 * self.d(1) + t2 * (7.0 * self.d(2) + t2 * 9.0 * self.d(3))));
                    if df.abs() < 1e-12 {
                        break;
                    }
                    let step = f / df;
                    theta -= step;
                    if step.abs() < 1e-14 {
                        break;
                    }
                }
                let theta = theta.clamp(0.0, std::f64::consts::FRAC_PI_2 - 1e-6);
                xd * (theta.tan() / theta_d)
            }
        }
    }

    /// Pixel of a camera-frame point, without a visibility check.
    pub(crate) fn project_camera_point(&self, p: &Vector3<f64>) -> Point2<f64> {
        let x = match self.model {
            CameraModel::Standard => Vector2::new(p.x / p.z, p.y / p.z),
            CameraModel::Fisheye => {
                let r = (p.x * p.x + p.y * p.y).sqrt();
                if r < 1e-12 {
                    Vector2::zeros()
                } else {
                    let theta = r.atan2(p.z);
                    Vector2::new(p.x / r, p.y / r) * self.fisheye_theta_d(theta)
                }
            }
        };
        let xd = match self.model {
            CameraModel::Standard => self.distort(x),
            CameraModel::Fisheye => x,
        };
        self.normalized_to_pixel(xd)
    }

    /// Pixel of board point `p` seen from `pose`; `None` behind the camera.
    pub fn project(&self, pose: &Pose, p: &Point3<f64>) -> Option<Point2<f64>> {
        let pc = pose.transform_point(p).coords;
        (pc.z > 1e-9).then(|| self.project_camera_point(&pc))
    }

    #[inline]
    pub fn normalized_to_pixel(&self, x: Vector2<f64>) -> Point2<f64> {
        let i = &self.intrinsics;
        Point2::new(i.fx * x.x + i.cx, i.fy * x.y + i.cy)
    }

    /// Ideal normalized coordinates of a distorted pixel.
    pub fn pixel_to_normalized(&self, px: &Point2<f64>) -> Vector2<f64> {
        let i = &self.intrinsics;
        self.undistort(Vector2::new((px.x - i.cx) / i.fx, (px.y - i.cy) / i.fy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn model_names_parse() {
        assert_eq!("pinhole".parse::<CameraModel>(), Ok(CameraModel::Standard));
        assert_eq!("Fisheye".parse::<CameraModel>(), Ok(CameraModel::Fisheye));
        assert!("omni".parse::<CameraModel>().is_err());
        assert_eq!(CameraModel::Fisheye.param_len(), 8);
    }

    #[test]
    fn standard_undistort_inverts_distort() {
        let cam = Camera::new(
            CameraModel::Standard,
            Intrinsics::new(800.0, 790.0, 320.0, 240.0),
            vec![-0.2, 0.05, 0.001, -0.0005, 0.0],
        )
        .unwrap();
        let x = Vector2::new(0.3, -0.2);
        assert_relative_eq!(cam.undistort(cam.distort(x)), x, epsilon = 1e-9);
    }

    #[test]
    fn fisheye_undistort_inverts_distort() {
        let cam = Camera::new(
            CameraModel::Fisheye,
            Intrinsics::new(300.0, 300.0, 320.0, 240.0),
            vec![0.05, -0.01, 0.002, 0.0],
        )
        .unwrap();
        let x = Vector2::new(1.2, 0.4);
        let xd = cam.distort(x);
        assert!(xd.norm() < x.norm());
        assert_relative_eq!(cam.undistort(xd), x, epsilon = 1e-8);
    }

    #[test]
    fn projection_round_trips_through_normalized_coordinates() {
        let cam = Camera::new(
            CameraModel::Standard,
            Intrinsics::new(600.0, 600.0, 320.0, 240.0),
            vec![0.1, 0.0, 0.0, 0.0, 0.0],
        )
        .unwrap();
        let pose = Pose::new(Vector3::new(0.1, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0));
        let p = Point3::new(0.1, 0.05, 0.0);
        let px = cam.project(&pose, &p).unwrap();
        let n = cam.pixel_to_normalized(&px);
        let pc = pose.transform_point(&p);
        assert_relative_eq!(n, Vector2::new(pc.x / pc.z, pc.y / pc.z), epsilon = 1e-9);

        let behind = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, -1.0));
        assert!(cam.project(&behind, &p).is_none());
    }

    #[test]
    fn wrong_distortion_length_is_rejected() {
        let err = Camera::new(CameraModel::Fisheye, Intrinsics::new(1.0, 1.0, 0.0, 0.0), vec![0.0; 5]);
        assert!(matches!(err, Err(CalibError::DistortionLength { expected: 4, .. })));
    }
}
