use camcal_core::{ImageSize, Pose};
use camcal_quality::{analyze, Category, Priority, QualityThresholds, HEATMAP_GRID};
use nalgebra::{Point2, Vector3};

fn grid_at(x0: f64, y0: f64) -> Vec<Point2<f64>> {
    let mut pts = Vec::new();
    for r in 0..6 {
        for c in 0..9 {
            pts.push(Point2::new(x0 + c as f64 * 20.0, y0 + r as f64 * 20.0));
        }
    }
    pts
}

#[test]
fn centered_dataset_asks_for_corners_and_edges() {
    let size = ImageSize::new(640, 480);
    let frames: Vec<_> = (0..20).map(|k| grid_at(240.0 + (k % 3) as f64, 190.0)).collect();
    let poses: Vec<_> = (0..20)
        .map(|k| Pose::new(Vector3::new(0.1 + 0.01 * k as f64, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.5)))
        .collect();
    let m = analyze(&frames, &poses, size, &QualityThresholds::default());

    assert_eq!(m.num_images, 20);
    assert_eq!(m.coverage.center_coverage, 1.0);
    assert_eq!(m.coverage.corner_coverage, 0.0);
    assert_eq!(m.heatmap.len(), HEATMAP_GRID);

    let cats: Vec<Category> = m.recommendations.iter().map(|r| r.category).collect();
    assert!(!cats.contains(&Category::Quantity));
    assert_eq!(m.recommendations[0].priority, Priority::High);
    assert!(m.recommendations[0].message.contains("corners"));
    assert_eq!(*cats.last().unwrap(), Category::Overall);

    let json = serde_json::to_value(&m).unwrap();
    assert_eq!(json["recommendations"][0]["priority"], "high");
    assert!(json["coverage"]["coverage_score"].is_number());
}

#[test]
fn empty_dataset_is_all_zero_with_advice() {
    let frames: Vec<Vec<Point2<f64>>> = Vec::new();
    let m = analyze(&frames, &[], ImageSize::new(640, 480), &QualityThresholds::default());
    assert_eq!(m.coverage.coverage_score, 0.0);
    assert_eq!(m.pose_diversity.pose_diversity_score, 0.0);
    assert!(m.heatmap.iter().flatten().all(|&v| v == 0.0));
    assert_eq!(m.recommendations.len(), 7);
}
