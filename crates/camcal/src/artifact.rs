//! Persisted result files and response records.
//!
//! Field names here are an interchange format read by downstream programs;
//! matrices are row-major nested lists, pose vectors are 3×1 columns.

use camcal_calib::{Camera, CameraModel, Intrinsics};
use nalgebra::{SMatrix, Vector3};
use serde::{Deserialize, Serialize};

use crate::engine::{CalibrationResult, StereoCalibrationResult};
use crate::error::CalibrationError;

pub const CALIBRATION_FILE: &str = "calibration_data.json";
pub const STEREO_CALIBRATION_FILE: &str = "stereo_calibration_data.json";
pub const QUALITY_FILE: &str = "quality_metrics.json";

pub type Rows = Vec<Vec<f64>>;

pub fn rows<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> Rows {
    (0..R).map(|r| (0..C).map(|c| m[(r, c)]).collect()).collect()
}

pub fn column(v: &Vector3<f64>) -> [[f64; 1]; 3] {
    [[v.x], [v.y], [v.z]]
}

/// `calibration_data.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationArtifact {
    pub camera_matrix: Rows,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion: Vec<f64>,
    pub rotation_vecs: Vec<[[f64; 1]; 3]>,
    pub translation_vecs: Vec<[[f64; 1]; 3]>,
}

impl From<&CalibrationResult> for CalibrationArtifact {
    fn from(r: &CalibrationResult) -> Self {
        let k = &r.camera.intrinsics;
        Self {
            camera_matrix: rows(&r.camera.matrix()),
            fx: k.fx,
            fy: k.fy,
            cx: k.cx,
            cy: k.cy,
            distortion: r.camera.distortion.clone(),
            rotation_vecs: r.poses.iter().map(|p| column(&p.rvec)).collect(),
            translation_vecs: r.poses.iter().map(|p| column(&p.tvec)).collect(),
        }
    }
}

impl CalibrationArtifact {
    /// Camera described by the file; the model follows from the distortion
    /// length.
    pub fn camera(&self) -> Result<Camera, CalibrationError> {
        let model = if self.distortion.len() == CameraModel::Fisheye.distortion_len() {
            CameraModel::Fisheye
        } else {
            CameraModel::Standard
        };
        Camera::new(
            model,
            Intrinsics::new(self.fx, self.fy, self.cx, self.cy),
            self.distortion.clone(),
        )
        .map_err(|e| CalibrationError::InvalidInput(e.to_string()))
    }
}

/// `stereo_calibration_data.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoArtifact {
    pub left_camera_matrix: Rows,
    pub left_distortion: Vec<f64>,
    pub right_camera_matrix: Rows,
    pub right_distortion: Vec<f64>,
    pub rotation_matrix: Rows,
    pub translation_vector: [[f64; 1]; 3],
    pub essential_matrix: Rows,
    pub fundamental_matrix: Rows,
    pub rectification_matrix_left: Rows,
    pub rectification_matrix_right: Rows,
    pub projection_matrix_left: Rows,
    pub projection_matrix_right: Rows,
    pub disparity_to_depth_mapping: Rows,
    pub baseline: f64,
    pub reprojection_error: f64,
}

impl From<&StereoCalibrationResult> for StereoArtifact {
    fn from(s: &StereoCalibrationResult) -> Self {
        Self {
            left_camera_matrix: rows(&s.left.camera.matrix()),
            left_distortion: s.left.camera.distortion.clone(),
            right_camera_matrix: rows(&s.right.camera.matrix()),
            right_distortion: s.right.camera.distortion.clone(),
            rotation_matrix: rows(&s.rotation),
            translation_vector: column(&s.translation),
            essential_matrix: rows(&s.essential.matrix),
            fundamental_matrix: rows(&s.fundamental.matrix),
            rectification_matrix_left: rows(&s.rectification.r1),
            rectification_matrix_right: rows(&s.rectification.r2),
            projection_matrix_left: rows(&s.rectification.p1),
            projection_matrix_right: rows(&s.rectification.p2),
            disparity_to_depth_mapping: rows(&s.rectification.q),
            baseline: s.baseline,
            reprojection_error: s.mean_error,
        }
    }
}

/// Preview of one listed image.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FramePreview {
    pub image_path: String,
    pub corners_found: bool,
    /// Base64 JPEG with the detection drawn on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
    /// Base64 JPEG corrected with the recovered camera.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undistorted_image: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationResponse {
    pub camera_model: CameraModel,
    pub camera_matrix: Rows,
    pub dist_coeffs: Vec<f64>,
    pub reprojection_error: f64,
    pub per_frame_errors: Vec<f64>,
    pub rotation_vectors: Vec<[f64; 3]>,
    pub translation_vectors: Vec<[f64; 3]>,
    pub num_images_calibrated: usize,
    pub frame_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previews: Vec<FramePreview>,
}

impl From<&CalibrationResult> for CalibrationResponse {
    fn from(r: &CalibrationResult) -> Self {
        Self {
            camera_model: r.camera.model,
            camera_matrix: rows(&r.camera.matrix()),
            dist_coeffs: r.camera.distortion.clone(),
            reprojection_error: r.mean_error,
            per_frame_errors: r.per_view_errors.clone(),
            rotation_vectors: r.poses.iter().map(|p| p.rvec.into()).collect(),
            translation_vectors: r.poses.iter().map(|p| p.tvec.into()).collect(),
            num_images_calibrated: r.poses.len(),
            frame_ids: r.frame_ids.clone(),
            previews: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StereoResponse {
    #[serde(flatten)]
    pub geometry: StereoArtifact,
    pub left_reprojection_error: f64,
    pub right_reprojection_error: f64,
    pub per_pair_errors: Vec<f64>,
    pub num_pairs: usize,
    pub frame_ids: Vec<String>,
}

impl From<&StereoCalibrationResult> for StereoResponse {
    fn from(s: &StereoCalibrationResult) -> Self {
        Self {
            geometry: StereoArtifact::from(s),
            left_reprojection_error: s.left.mean_error,
            right_reprojection_error: s.right.mean_error,
            per_pair_errors: s.per_pair_errors.clone(),
            num_pairs: s.frame_ids.len(),
            frame_ids: s.frame_ids.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3x4, Vector3};

    #[test]
    fn rows_are_row_major() {
        let m = Matrix3x4::from_fn(|r, c| (r * 10 + c) as f64);
        let r = rows(&m);
        assert_eq!(r.len(), 3);
        assert_eq!(r[1], vec![10.0, 11.0, 12.0, 13.0]);
    }

    #[test]
    fn artifact_field_names_are_stable() {
        let a = CalibrationArtifact {
            camera_matrix: rows(&nalgebra::Matrix3::new(800.0, 0.0, 320.0, 0.0, 810.0, 240.0, 0.0, 0.0, 1.0)),
            fx: 800.0,
            fy: 810.0,
            cx: 320.0,
            cy: 240.0,
            distortion: vec![0.1, -0.05, 0.0, 0.0, 0.0],
            rotation_vecs: vec![column(&Vector3::new(0.1, 0.2, 0.3))],
            translation_vecs: vec![column(&Vector3::new(0.0, 0.0, 1.0))],
        };
        let json = serde_json::to_value(&a).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for k in ["camera_matrix", "fx", "fy", "cx", "cy", "distortion", "rotation_vecs", "translation_vecs"] {
            assert!(keys.contains(&k), "{k}");
        }
        assert_eq!(json["camera_matrix"][0][2], 320.0);
        assert_eq!(json["rotation_vecs"][0][1][0], 0.2);

        let cam = a.camera().unwrap();
        assert_eq!(cam.model, CameraModel::Standard);
        assert_eq!(cam.intrinsics.fy, 810.0);
    }
}
