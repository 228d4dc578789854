//! Calibration entry points over image directories.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use ::image::DynamicImage;
use camcal_calib::{
    calibrate_mono, calibrate_stereo, find_essential, find_fundamental, stereo_rectify, Camera, CameraModel,
    EpipolarEstimate, MonoCalibration, Rectification, StereoSide,
};
use camcal_core::{ImageSize, PatternConfig, Pose};
use camcal_quality::QualityMetrics;
use log::{info, warn};
use nalgebra::{Matrix3, Point2, Vector3};
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::annotate::annotate;
use crate::artifact::FramePreview;
use crate::config::EngineConfig;
use crate::dataset::{load_gray, CorrespondenceSet, FrameEntry};
use crate::detect::{Detection, PatternDetector};
use crate::error::CalibrationError;
use crate::preview::{jpeg_base64, undistort_image};

/// One camera's calibration. Replaced wholesale by a refinement pass.
#[derive(Clone, Debug, Serialize)]
pub struct CalibrationResult {
    pub camera: Camera,
    /// Board pose per used frame, in `frame_ids` order.
    pub poses: Vec<Pose>,
    pub rms: f64,
    /// Mean of `per_view_errors`.
    pub mean_error: f64,
    pub per_view_errors: Vec<f64>,
    pub frame_ids: Vec<String>,
    pub image_size: ImageSize,
    pub optimized: bool,
}

impl CalibrationResult {
    fn new(mono: MonoCalibration, frame_ids: Vec<String>, image_size: ImageSize, optimized: bool) -> Self {
        Self {
            camera: mono.camera,
            poses: mono.poses,
            rms: mono.rms,
            mean_error: mono.mean_error,
            per_view_errors: mono.per_view_errors,
            frame_ids,
            image_size,
            optimized,
        }
    }

    pub fn model(&self) -> CameraModel {
        self.camera.model
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        self.camera.matrix()
    }

    pub fn distortion(&self) -> &[f64] {
        &self.camera.distortion
    }

    pub fn rvecs(&self) -> Vec<Vector3<f64>> {
        self.poses.iter().map(|p| p.rvec).collect()
    }

    pub fn tvecs(&self) -> Vec<Vector3<f64>> {
        self.poses.iter().map(|p| p.tvec).collect()
    }
}

/// A mono result with the detections it was computed from.
#[derive(Clone, Debug)]
pub struct MonoRun {
    pub result: CalibrationResult,
    pub dataset: CorrespondenceSet,
}

#[derive(Clone, Debug, Serialize)]
pub struct StereoCalibrationResult {
    pub left: CalibrationResult,
    pub right: CalibrationResult,
    /// Maps left-camera points into the right camera.
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: EpipolarEstimate,
    pub fundamental: EpipolarEstimate,
    pub rectification: Rectification,
    pub baseline: f64,
    pub per_pair_errors: Vec<f64>,
    /// Mean over both cameras' per-view errors.
    pub mean_error: f64,
    pub frame_ids: Vec<String>,
    pub image_size: ImageSize,
}

#[derive(Clone, Debug)]
pub struct StereoRun {
    pub result: StereoCalibrationResult,
    pub left: CorrespondenceSet,
    pub right: CorrespondenceSet,
}

pub struct CalibrationEngine {
    config: EngineConfig,
}

impl CalibrationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn detector(&self, pattern: &PatternConfig) -> Result<PatternDetector, CalibrationError> {
        PatternDetector::new(pattern, &self.config)
    }

    /// Detect the pattern in one image file.
    pub fn detect_file(
        &self,
        path: &Path,
        pattern: &PatternConfig,
    ) -> Result<(Detection, ::image::GrayImage), CalibrationError> {
        let detector = self.detector(pattern)?;
        let img = ::image::open(path)
            .map_err(|e| CalibrationError::InvalidInput(format!("{}: {e}", path.display())))?
            .into_luma8();
        Ok((detector.detect(&img), img))
    }

    /// Calibrate one camera from every image in `dir`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, pattern), fields(dir = %dir.display()))
    )]
    pub fn calibrate(
        &self,
        dir: &Path,
        pattern: &PatternConfig,
        model: CameraModel,
        optimize: bool,
    ) -> Result<MonoRun, CalibrationError> {
        let detector = self.detector(pattern)?;
        let dataset = CorrespondenceSet::collect(dir, &detector)?;
        self.calibrate_set(dir, &detector, dataset, model, optimize)
    }

    fn calibrate_set(
        &self,
        dir: &Path,
        detector: &PatternDetector,
        dataset: CorrespondenceSet,
        model: CameraModel,
        optimize: bool,
    ) -> Result<MonoRun, CalibrationError> {
        let size = dataset.require_size(dir)?;
        let first = calibrate_mono(&dataset.views(), size, model, &self.config.solver)?;
        info!(
            "{}: {model} calibration over {} frames, rms {:.4} px",
            dir.display(),
            dataset.len(),
            first.rms
        );
        if !optimize {
            let result = CalibrationResult::new(first, dataset.frame_ids(), size, false);
            return Ok(MonoRun { result, dataset });
        }

        let refined = dataset.refined(detector, &self.config.optimize_subpix);
        let second = calibrate_mono(&refined.views(), size, model, &self.config.solver)?;
        if second.rms > first.rms {
            warn!(
                "{}: refinement pass raised rms from {:.4} to {:.4} px",
                dir.display(),
                first.rms,
                second.rms
            );
        } else {
            info!("{}: refinement pass rms {:.4} -> {:.4} px", dir.display(), first.rms, second.rms);
        }
        let result = CalibrationResult::new(second, refined.frame_ids(), size, true);
        Ok(MonoRun {
            result,
            dataset: refined,
        })
    }

    /// Calibrate a camera pair from two directories of synchronized frames.
    ///
    /// Frames pair by file stem. A frame found on one side only rejects the
    /// run.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, pattern), fields(left = %left_dir.display(), right = %right_dir.display()))
    )]
    pub fn stereo(
        &self,
        left_dir: &Path,
        right_dir: &Path,
        pattern: &PatternConfig,
        model: CameraModel,
        optimize: bool,
    ) -> Result<StereoRun, CalibrationError> {
        let detector = self.detector(pattern)?;
        let left_set = CorrespondenceSet::collect(left_dir, &detector)?;
        let right_set = CorrespondenceSet::collect(right_dir, &detector)?;
        let left_size = left_set.require_size(left_dir)?;
        let right_size = right_set.require_size(right_dir)?;
        if left_size != right_size {
            return Err(CalibrationError::InvalidInput(format!(
                "left images are {}x{}, right images {}x{}",
                left_size.width, left_size.height, right_size.width, right_size.height
            )));
        }
        let right_set = align_frames(&left_set, right_set)?;

        let left = self.calibrate_set(left_dir, &detector, left_set, model, optimize)?;
        let right = self.calibrate_set(right_dir, &detector, right_set, model, optimize)?;
        let (lviews, rviews) = (left.dataset.views(), right.dataset.views());
        let stereo = calibrate_stereo(
            StereoSide {
                camera: &left.result.camera,
                views: &lviews,
                poses: &left.result.poses,
            },
            StereoSide {
                camera: &right.result.camera,
                views: &rviews,
                poses: &right.result.poses,
            },
            &self.config.solver,
        )?;
        let rectification = stereo_rectify(
            &stereo.left,
            &stereo.right,
            left_size,
            &stereo.rotation,
            &stereo.translation,
        )?;

        let (pl, pr) = pooled_matches(&left.dataset.frames, &right.dataset.frames);
        let essential = find_essential(&stereo.left, &stereo.right, &pl, &pr, &self.config.ransac)?;
        let fundamental = find_fundamental(&pl, &pr, &self.config.ransac)?;
        info!(
            "stereo over {} pairs: baseline {:.4}, mean error {:.4} px, E inliers {}/{}, F inliers {}/{}",
            lviews.len(),
            stereo.baseline(),
            stereo.mean_error,
            essential.inliers.len(),
            pl.len(),
            fundamental.inliers.len(),
            pl.len()
        );

        let result = StereoCalibrationResult {
            baseline: stereo.baseline(),
            rotation: stereo.rotation,
            translation: stereo.translation,
            per_pair_errors: stereo.per_pair_errors.clone(),
            mean_error: stereo.mean_error,
            frame_ids: left.result.frame_ids.clone(),
            image_size: left_size,
            left: left.result,
            right: right.result,
            essential,
            fundamental,
            rectification,
        };
        Ok(StereoRun {
            result,
            left: left.dataset,
            right: right.dataset,
        })
    }

    /// Quality of the dataset in `dir`, from a plain standard-model run.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, pattern), fields(dir = %dir.display())))]
    pub fn analyze(&self, dir: &Path, pattern: &PatternConfig) -> Result<QualityMetrics, CalibrationError> {
        let run = self.calibrate(dir, pattern, CameraModel::Standard, false)?;
        let frames: Vec<&[Point2<f64>]> = run.dataset.frames.iter().map(|f| f.points.image_points()).collect();
        Ok(camcal_quality::analyze(
            &frames,
            &run.result.poses,
            run.result.image_size,
            &self.config.quality,
        ))
    }

    /// Annotated and undistorted previews of every listed image of a run.
    pub fn previews(&self, pattern: &PatternConfig, run: &MonoRun) -> Result<Vec<FramePreview>, CalibrationError> {
        let detector = self.detector(pattern)?;
        let quality = self.config.preview_jpeg_quality;
        let encode = |img: DynamicImage| match jpeg_base64(&img, quality) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("preview encoding failed: {e}");
                None
            }
        };
        let mut out = Vec::with_capacity(run.dataset.outcomes.len());
        for outcome in &run.dataset.outcomes {
            let Some(gray) = load_gray(&outcome.path) else {
                continue;
            };
            let detection = detector.detect(&gray);
            let annotated = annotate(&gray, &detection, pattern.corner_grid().0);
            let undistorted = undistort_image(&gray, &run.result.camera);
            out.push(FramePreview {
                image_path: outcome.path.display().to_string(),
                corners_found: outcome.found,
                preview_image: encode(DynamicImage::ImageRgb8(annotated)),
                undistorted_image: encode(DynamicImage::ImageLuma8(undistorted)),
            });
        }
        Ok(out)
    }
}

/// Reorder `right` to follow `left`'s frame order; every found frame must
/// have a partner.
fn align_frames(left: &CorrespondenceSet, right: CorrespondenceSet) -> Result<CorrespondenceSet, CalibrationError> {
    let mut by_id: HashMap<String, FrameEntry> = HashMap::with_capacity(right.frames.len());
    for f in right.frames {
        let id = f.frame_id.clone();
        if by_id.insert(id.clone(), f).is_some() {
            return Err(CalibrationError::InvalidInput(format!("duplicate right frame id {id}")));
        }
    }
    let left_ids: BTreeSet<&str> = left.frames.iter().map(|f| f.frame_id.as_str()).collect();
    if left_ids.len() != left.frames.len() {
        return Err(CalibrationError::InvalidInput("duplicate left frame ids".into()));
    }
    let mut unmatched: Vec<String> = left_ids
        .iter()
        .filter(|id| !by_id.contains_key(**id))
        .map(|id| format!("left:{id}"))
        .collect();
    let mut right_only: Vec<&String> = by_id.keys().filter(|id| !left_ids.contains(id.as_str())).collect();
    right_only.sort();
    unmatched.extend(right_only.into_iter().map(|id| format!("right:{id}")));
    if !unmatched.is_empty() {
        return Err(CalibrationError::InvalidInput(format!(
            "stereo frames found on one side only: {}",
            unmatched.join(", ")
        )));
    }

    let frames = left
        .frames
        .iter()
        .filter_map(|f| by_id.remove(&f.frame_id))
        .collect();
    Ok(CorrespondenceSet {
        frames,
        outcomes: right.outcomes,
        image_size: right.image_size,
    })
}

/// Image points seen in both cameras, matched by frame and corner id.
fn pooled_matches(left: &[FrameEntry], right: &[FrameEntry]) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
    let mut pl = Vec::new();
    let mut pr = Vec::new();
    for (l, r) in left.iter().zip(right) {
        for (id, _, p) in l.points.iter() {
            if let Some(q) = r.points.image_point_of(id) {
                pl.push(*p);
                pr.push(q);
            }
        }
    }
    (pl, pr)
}
