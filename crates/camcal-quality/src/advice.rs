use serde::{Deserialize, Serialize};

use crate::coverage::Coverage;
use crate::diversity::PoseDiversity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
    Info,
    Warning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Coverage,
    PoseDiversity,
    Quantity,
    Overall,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: Category,
    pub message: String,
    pub details: String,
}

impl Recommendation {
    fn new(priority: Priority, category: Category, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            priority,
            category,
            message: message.into(),
            details: details.into(),
        }
    }
}

/// Rule-table thresholds. A metric below its threshold emits advice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_center_coverage: f64,
    pub min_corner_coverage: f64,
    pub min_edge_coverage: f64,
    pub min_angle_diversity: f64,
    pub min_distance_diversity: f64,
    pub min_frames: usize,
    pub max_frames: usize,
    /// Frame count at which the quantity term of the overall score saturates.
    pub target_frames: usize,
    pub excellent_score: f64,
    pub good_score: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_center_coverage: 0.3,
            min_corner_coverage: 0.2,
            min_edge_coverage: 0.2,
            min_angle_diversity: 0.3,
            min_distance_diversity: 0.2,
            min_frames: 15,
            max_frames: 50,
            target_frames: 25,
            excellent_score: 0.8,
            good_score: 0.6,
        }
    }
}

/// `0.5·coverage + 0.3·pose diversity + 0.2·min(frames / target, 1)`.
pub fn overall_score(coverage: &Coverage, diversity: &PoseDiversity, frames: usize, thresholds: &QualityThresholds) -> f64 {
    let quantity = (frames as f64 / thresholds.target_frames.max(1) as f64).min(1.0);
    0.5 * coverage.coverage_score + 0.3 * diversity.pose_diversity_score + 0.2 * quantity
}

/// Advice in rule-table order, closed by one overall assessment.
pub fn recommendations(
    coverage: &Coverage,
    diversity: &PoseDiversity,
    frames: usize,
    thresholds: &QualityThresholds,
) -> Vec<Recommendation> {
    use Category as C;
    use Priority as P;

    let mut out = Vec::new();
    if coverage.center_coverage < thresholds.min_center_coverage {
        out.push(Recommendation::new(
            P::High,
            C::Coverage,
            "Capture more images with the calibration pattern in the center of the frame",
            "Center coverage is low. This can affect the accuracy of the principal point estimation.",
        ));
    }
    if coverage.corner_coverage < thresholds.min_corner_coverage {
        out.push(Recommendation::new(
            P::High,
            C::Coverage,
            "Capture images with the pattern near the corners of the frame",
            "Corner coverage is critical for accurate distortion modeling, especially for fisheye lenses.",
        ));
    }
    if coverage.edge_coverage < thresholds.min_edge_coverage {
        out.push(Recommendation::new(
            P::Medium,
            C::Coverage,
            "Capture images with the pattern near the edges of the frame",
            "Edge coverage helps improve distortion coefficient estimation.",
        ));
    }
    if diversity.angle_diversity < thresholds.min_angle_diversity {
        out.push(Recommendation::new(
            P::High,
            C::PoseDiversity,
            "Capture images from more varied angles",
            "Try tilting the camera or pattern at different angles (pitch, yaw, roll) to improve calibration accuracy.",
        ));
    }
    if diversity.distance_diversity < thresholds.min_distance_diversity {
        out.push(Recommendation::new(
            P::Medium,
            C::PoseDiversity,
            "Vary the distance between camera and calibration pattern",
            "Capture images at different distances (closer and farther) to improve depth estimation accuracy.",
        ));
    }
    if frames < thresholds.min_frames {
        out.push(Recommendation::new(
            P::High,
            C::Quantity,
            format!("Capture more images (current: {frames}, recommended: 20-30)"),
            "More images generally lead to better calibration results, especially with varied poses.",
        ));
    } else if frames > thresholds.max_frames {
        out.push(Recommendation::new(
            P::Low,
            C::Quantity,
            format!("You have many images ({frames}), consider removing low-quality ones"),
            "Too many images can slow down calibration. Focus on quality over quantity.",
        ));
    }

    let score = overall_score(coverage, diversity, frames, thresholds);
    let details = format!("Overall quality score: {score:.2}/1.00");
    out.push(if score >= thresholds.excellent_score {
        Recommendation::new(P::Info, C::Overall, "Excellent calibration dataset! You're ready to proceed", details)
    } else if score >= thresholds.good_score {
        Recommendation::new(
            P::Info,
            C::Overall,
            "Good calibration dataset. Consider the suggestions above for optimal results",
            details,
        )
    } else {
        Recommendation::new(
            P::Warning,
            C::Overall,
            "Calibration dataset needs improvement",
            format!("{details}. Follow the recommendations above."),
        )
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use Category as C;
    use Priority as P;

    fn good_coverage() -> Coverage {
        Coverage {
            center_coverage: 0.6,
            corner_coverage: 0.3,
            edge_coverage: 0.3,
            coverage_score: 0.4,
        }
    }

    #[test]
    fn empty_dataset_hits_every_rule_in_order() {
        let recs = recommendations(&Coverage::default(), &PoseDiversity::default(), 3, &QualityThresholds::default());
        let cats: Vec<Category> = recs.iter().map(|r| r.category).collect();
        assert_eq!(
            cats,
            [
                Category::Coverage,
                Category::Coverage,
                Category::Coverage,
                Category::PoseDiversity,
                Category::PoseDiversity,
                Category::Quantity,
                Category::Overall,
            ]
        );
        assert_eq!(recs[5].message, "Capture more images (current: 3, recommended: 20-30)");
        let last = recs.last().unwrap();
        assert_eq!(last.priority, Priority::Warning);
        assert!(last.details.starts_with("Overall quality score: 0.02/1.00"));
    }

    #[test]
    fn large_dataset_gets_low_priority_prune_advice() {
        let div = PoseDiversity {
            angle_diversity: 0.5,
            distance_diversity: 0.5,
            pose_diversity_score: 0.5,
        };
        let recs = recommendations(&good_coverage(), &div, 60, &QualityThresholds::default());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].priority, Priority::Low);
        // 0.5·0.4 + 0.3·0.5 + 0.2 = 0.55
        assert_eq!(recs[1].priority, Priority::Warning);
    }

    #[test]
    fn overall_tiers() {
        let t = QualityThresholds::default();
        let full = Coverage {
            coverage_score: 1.0,
            ..good_coverage()
        };
        let div = PoseDiversity {
            angle_diversity: 1.0,
            distance_diversity: 1.0,
            pose_diversity_score: 1.0,
        };
        let recs = recommendations(&full, &div, 20, &t);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].message.starts_with("Excellent"));
        assert_eq!(recs[0].details, "Overall quality score: 0.96/1.00");

        let half = PoseDiversity {
            pose_diversity_score: 0.4,
            ..div
        };
        let recs = recommendations(&good_coverage(), &half, 25, &t);
        // 0.2 + 0.12 + 0.2 = 0.52
        assert_eq!(recs.last().unwrap().priority, Priority::Warning);

        let mid = Coverage {
            coverage_score: 0.6,
            ..good_coverage()
        };
        let recs = recommendations(&mid, &half, 25, &t);
        // 0.3 + 0.12 + 0.2 = 0.62
        assert!(recs.last().unwrap().message.starts_with("Good"));
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Recommendation::new(P::High, C::PoseDiversity, "m", "d")).unwrap();
        assert_eq!(json, r#"{"priority":"high","category":"pose_diversity","message":"m","details":"d"}"#);
    }
}
