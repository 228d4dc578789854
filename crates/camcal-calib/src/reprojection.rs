use camcal_core::{PointSet, Pose};
use nalgebra::Point2;

use crate::camera::Camera;

/// Projected board points of one view; points behind the camera project
/// through the raw model so the error stays finite and large.
pub fn project_view(camera: &Camera, pose: &Pose, view: &PointSet) -> Vec<Point2<f64>> {
    view.object_points()
        .iter()
        .map(|p| camera.project_camera_point(&pose.transform_point(p).coords))
        .collect()
}

/// Sum of squared pixel residuals of one view.
pub fn view_squared_error(camera: &Camera, pose: &Pose, view: &PointSet) -> f64 {
    project_view(camera, pose, view)
        .iter()
        .zip(view.image_points())
        .map(|(p, q)| (p - q).norm_squared())
        .sum()
}

/// Per-view error: L2 norm of the stacked residuals divided by the point
/// count.
pub fn view_error(camera: &Camera, pose: &Pose, view: &PointSet) -> f64 {
    if view.is_empty() {
        return 0.0;
    }
    view_squared_error(camera, pose, view).sqrt() / view.len() as f64
}

/// Root mean square point error over all views.
pub fn rms_error(camera: &Camera, poses: &[Pose], views: &[PointSet]) -> f64 {
    let (sq, n) = poses
        .iter()
        .zip(views)
        .fold((0.0, 0usize), |(sq, n), (pose, view)| {
            (sq + view_squared_error(camera, pose, view), n + view.len())
        });
    if n == 0 {
        0.0
    } else {
        (sq / n as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraModel, Intrinsics};
    use nalgebra::{Point3, Vector3};

    #[test]
    fn per_view_error_is_norm_over_count() {
        let cam = Camera::pinhole(CameraModel::Standard, Intrinsics::new(100.0, 100.0, 0.0, 0.0));
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0));
        let object = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.1, 0.0, 0.0)];
        // Exact projections are (0,0) and (10,0); offset both by 3 px in x.
        let image = vec![Point2::new(3.0, 0.0), Point2::new(13.0, 0.0)];
        let view = PointSet::new(vec![0, 1], object, image).unwrap();
        let e = view_error(&cam, &pose, &view);
        assert!((e - (18.0f64).sqrt() / 2.0).abs() < 1e-12);
        assert!((rms_error(&cam, &[pose], &[view]) - 3.0).abs() < 1e-12);
    }
}
