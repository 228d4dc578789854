use camcal_core::ImageSize;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Axis-aligned region in fractions of the image size, bounds inclusive.
#[derive(Clone, Copy, Debug)]
struct Region {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Region {
    const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    fn contains(&self, p: &Point2<f64>, w: f64, h: f64) -> bool {
        p.x >= self.x0 * w && p.x <= self.x1 * w && p.y >= self.y0 * h && p.y <= self.y1 * h
    }
}

const CENTER: Region = Region::new(0.25, 0.25, 0.75, 0.75);

const CORNERS: [Region; 4] = [
    Region::new(0.0, 0.0, 0.3, 0.3),
    Region::new(0.7, 0.0, 1.0, 0.3),
    Region::new(0.0, 0.7, 0.3, 1.0),
    Region::new(0.7, 0.7, 1.0, 1.0),
];

const EDGES: [Region; 4] = [
    Region::new(0.3, 0.0, 0.7, 0.2),
    Region::new(0.3, 0.8, 0.7, 1.0),
    Region::new(0.0, 0.3, 0.2, 0.7),
    Region::new(0.8, 0.3, 1.0, 0.7),
];

/// Fractions of all detected points falling in each region group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub center_coverage: f64,
    pub corner_coverage: f64,
    pub edge_coverage: f64,
    pub coverage_score: f64,
}

/// Classify every pooled point against the centre, corner and edge groups.
///
/// A point counts at most once per group, but may count in several groups.
pub fn analyze_coverage<P: AsRef<[Point2<f64>]>>(frames: &[P], size: ImageSize) -> Coverage {
    let (w, h) = (size.width as f64, size.height as f64);
    let (mut center, mut corner, mut edge, mut total) = (0usize, 0usize, 0usize, 0usize);
    for p in frames.iter().flat_map(|f| f.as_ref()) {
        total += 1;
        if CENTER.contains(p, w, h) {
            center += 1;
        }
        if CORNERS.iter().any(|r| r.contains(p, w, h)) {
            corner += 1;
        }
        if EDGES.iter().any(|r| r.contains(p, w, h)) {
            edge += 1;
        }
    }
    if total == 0 {
        return Coverage::default();
    }
    let n = total as f64;
    Coverage {
        center_coverage: center as f64 / n,
        corner_coverage: corner as f64 / n,
        edge_coverage: edge as f64 / n,
        coverage_score: (center + corner + edge) as f64 / (3.0 * n),
    }
}
