use camcal_core::Pose;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseDiversity {
    /// Spread of rotation angles, `std / π`, capped at 1.
    pub angle_diversity: f64,
    /// Spread of camera distances, `std / mean`, capped at 1.
    pub distance_diversity: f64,
    pub pose_diversity_score: f64,
}

/// Population standard deviation; zero for fewer than two samples.
fn std_dev(v: &[f64]) -> f64 {
    if v.len() < 2 {
        return 0.0;
    }
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    (v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}

pub fn analyze_pose_diversity(poses: &[Pose]) -> PoseDiversity {
    if poses.is_empty() {
        return PoseDiversity::default();
    }
    let angles: Vec<f64> = poses.iter().map(Pose::angle).collect();
    let angle_diversity = (std_dev(&angles) / std::f64::consts::PI).min(1.0);

    let distances: Vec<f64> = poses.iter().map(|p| p.tvec.norm()).collect();
    let mean = distances.iter().sum::<f64>() / distances.len() as f64;
    let distance_diversity = if mean > 0.0 {
        (std_dev(&distances) / mean).min(1.0)
    } else {
        0.0
    };

    PoseDiversity {
        angle_diversity,
        distance_diversity,
        pose_diversity_score: 0.5 * (angle_diversity + distance_diversity),
    }
}
