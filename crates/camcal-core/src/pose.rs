use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transform `X_cam = R(rvec) * X_board + tvec`.
///
/// `rvec` is an axis-angle (Rodrigues) vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    pub fn from_rotation_translation(r: &Matrix3<f64>, t: Vector3<f64>) -> Self {
        let rot = Rotation3::from_matrix_eps(r, 1e-12, 0, Rotation3::identity());
        Self::new(rot.scaled_axis(), t)
    }

    #[inline]
    pub fn rotation(&self) -> Matrix3<f64> {
        rodrigues(&self.rvec)
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation() * p.coords + self.tvec)
    }

    /// Rotation angle in radians (`|rvec|`).
    #[inline]
    pub fn angle(&self) -> f64 {
        self.rvec.norm()
    }
}

/// Axis-angle vector to rotation matrix.
pub fn rodrigues(rvec: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::new(*rvec).into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_round_trips_through_matrix() {
        let rvec = Vector3::new(0.1, -0.4, 0.25);
        let pose = Pose::new(rvec, Vector3::new(0.0, 0.1, 1.5));
        let back = Pose::from_rotation_translation(&pose.rotation(), pose.tvec);
        assert_relative_eq!(back.rvec, rvec, epsilon = 1e-10);
        assert_relative_eq!(pose.angle(), rvec.norm());
    }

    #[test]
    fn transform_applies_rotation_then_translation() {
        let pose = Pose::new(
            Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            Vector3::new(1.0, 0.0, 0.0),
        );
        let q = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(q, Point3::new(1.0, 1.0, 0.0), epsilon = 1e-12);
    }
}
