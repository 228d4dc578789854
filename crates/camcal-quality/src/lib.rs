//! Calibration dataset quality.
//!
//! Scores how well the detected points cover the image, how varied the
//! board poses are, and turns both into ordered advice plus a coarse point
//! density heatmap. Inputs are the per-frame image points and poses that a
//! calibration run produced.

mod advice;
mod coverage;
mod diversity;
mod heatmap;

pub use advice::{overall_score, recommendations, Category, Priority, QualityThresholds, Recommendation};
pub use coverage::{analyze_coverage, Coverage};
pub use diversity::{analyze_pose_diversity, PoseDiversity};
pub use heatmap::{coverage_heatmap, HEATMAP_GRID};

use camcal_core::{ImageSize, Pose};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub coverage: Coverage,
    pub pose_diversity: PoseDiversity,
    pub num_images: usize,
    pub overall_score: f64,
    pub recommendations: Vec<Recommendation>,
    /// `HEATMAP_GRID` rows of `HEATMAP_GRID` values in `[0, 1]`.
    pub heatmap: Vec<Vec<f64>>,
}

/// Analyze one calibrated dataset. `frames[k]` holds the image points of
/// the frame whose board pose is `poses[k]`.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "info", skip_all, fields(frames = frames.len()))
)]
pub fn analyze<P: AsRef<[Point2<f64>]>>(
    frames: &[P],
    poses: &[Pose],
    size: ImageSize,
    thresholds: &QualityThresholds,
) -> QualityMetrics {
    let coverage = analyze_coverage(frames, size);
    let pose_diversity = analyze_pose_diversity(poses);
    let num_images = frames.len();
    let overall = overall_score(&coverage, &pose_diversity, num_images, thresholds);
    debug!(
        "quality over {num_images} frames: coverage {:.3}, pose diversity {:.3}, overall {overall:.3}",
        coverage.coverage_score, pose_diversity.pose_diversity_score
    );
    QualityMetrics {
        recommendations: recommendations(&coverage, &pose_diversity, num_images, thresholds),
        heatmap: coverage_heatmap(frames, size),
        coverage,
        pose_diversity,
        num_images,
        overall_score: overall,
    }
}
