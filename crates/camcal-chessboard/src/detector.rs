use camcal_core::{Corner, GrayImageView, GridCoords};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::lattice::{assemble_lattice, Lattice};
use crate::params::ChessboardParams;

/// One labelled inner corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridCorner {
    pub grid: GridCoords,
    pub position: Point2<f32>,
}

/// A complete checkerboard, corners in row-major id order
/// (`id = j * cols + i`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChessboardDetection {
    pub cols: u32,
    pub rows: u32,
    pub corners: Vec<GridCorner>,
}

impl ChessboardDetection {
    pub fn positions(&self) -> Vec<Point2<f32>> {
        self.corners.iter().map(|c| c.position).collect()
    }
}

/// Checkerboard detector over precomputed ChESS corners.
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// Largest lattice found in `corners`, complete or not.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(num_corners = corners.len()))
    )]
    pub fn find_lattice(&self, img: &GrayImageView<'_>, corners: &[Corner]) -> Option<Lattice> {
        let stop_at = match (self.params.expected_cols, self.params.expected_rows) {
            (Some(c), Some(r)) => Some(c as usize * r as usize),
            _ => None,
        };
        assemble_lattice(img, corners, &self.params, stop_at)
    }

    /// Detect the complete board of the expected size.
    ///
    /// Returns `None` unless every inner corner was found.
    pub fn detect(&self, img: &GrayImageView<'_>, corners: &[Corner]) -> Option<ChessboardDetection> {
        let (cols, rows) = (self.params.expected_cols?, self.params.expected_rows?);
        let lattice = self.find_lattice(img, corners)?;
        let (w, h) = lattice.extent();
        let full = lattice.len() == (cols * rows) as usize;
        let fits = (w, h) == (cols, rows) || (w, h) == (rows, cols);
        if !(full && fits) {
            debug!(
                "checkerboard incomplete: {} of {} corners, extent {}x{}",
                lattice.len(),
                cols * rows,
                w,
                h
            );
            return None;
        }
        canonical_order(&lattice, cols, rows)
    }
}

/// Relabel a complete lattice so that `i` runs along `cols`, the `(i, j)`
/// frame has positive image handedness, and corner `(0, 0)` is the one
/// nearest the image top-left.
pub fn canonical_order(lattice: &Lattice, cols: u32, rows: u32) -> Option<ChessboardDetection> {
    let (w, h) = lattice.extent();
    let transpose = (w, h) != (cols, rows);
    let (c, r) = (cols as i32, rows as i32);

    let mut grid = vec![Point2::new(0.0f32, 0.0); (c * r) as usize];
    for (g, p) in &lattice.nodes {
        let (i, j) = if transpose { (g.j, g.i) } else { (g.i, g.j) };
        if i >= c || j >= r {
            return None;
        }
        grid[(j * c + i) as usize] = *p;
    }
    let at = |g: &[Point2<f32>], i: i32, j: i32| g[(j * c + i) as usize];

    let u = at(&grid, c - 1, 0) - at(&grid, 0, 0);
    let v = at(&grid, 0, r - 1) - at(&grid, 0, 0);
    if u.x * v.y - u.y * v.x < 0.0 {
        let flipped: Vec<_> = (0..r)
            .flat_map(|j| (0..c).map(move |i| (i, j)))
            .map(|(i, j)| at(&grid, c - 1 - i, j))
            .collect();
        grid = flipped;
    }

    // Handedness-preserving symmetries: source label for destination (i, j).
    type Map = fn(i32, i32, i32, i32) -> (i32, i32);
    fn keep(i: i32, j: i32, _c: i32, _r: i32) -> (i32, i32) {
        (i, j)
    }
    fn half_turn(i: i32, j: i32, c: i32, r: i32) -> (i32, i32) {
        (c - 1 - i, r - 1 - j)
    }
    fn quarter_cw(i: i32, j: i32, c: i32, _r: i32) -> (i32, i32) {
        (j, c - 1 - i)
    }
    fn quarter_ccw(i: i32, j: i32, c: i32, _r: i32) -> (i32, i32) {
        (c - 1 - j, i)
    }
    let mut maps: Vec<Map> = vec![keep, half_turn];
    if c == r {
        maps.extend([quarter_cw as Map, quarter_ccw as Map]);
    }
    let origin_score = |m: &Map| {
        let (i, j) = m(0, 0, c, r);
        let p = at(&grid, i, j);
        p.x + p.y
    };
    let map = maps
        .into_iter()
        .min_by(|a, b| origin_score(a).total_cmp(&origin_score(b)))?;

    let corners = (0..r)
        .flat_map(|j| (0..c).map(move |i| (i, j)))
        .map(|(i, j)| {
            let (si, sj) = map(i, j, c, r);
            GridCorner {
                grid: GridCoords::new(i, j),
                position: at(&grid, si, sj),
            }
        })
        .collect();
    Some(ChessboardDetection { cols, rows, corners })
}
