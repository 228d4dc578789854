//! Seed-and-grow lattice assembly over a cloud of X-junction candidates.

use std::collections::{HashMap, HashSet, VecDeque};

use camcal_core::{Corner, GrayImageView, GridCoords};
use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::{Point2, Vector2};

use crate::params::ChessboardParams;
use crate::saddle::is_saddle;

/// Corners labelled with integer lattice coordinates.
///
/// Coordinates are shifted so the minimum `i` and `j` are both zero.
#[derive(Clone, Debug, Default)]
pub struct Lattice {
    pub nodes: HashMap<GridCoords, Point2<f32>>,
}

impl Lattice {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `(width, height)` of the bounding box in lattice steps plus one.
    pub fn extent(&self) -> (u32, u32) {
        let max_i = self.nodes.keys().map(|g| g.i).max().unwrap_or(-1);
        let max_j = self.nodes.keys().map(|g| g.j).max().unwrap_or(-1);
        ((max_i + 1) as u32, (max_j + 1) as u32)
    }

    #[inline]
    pub fn get(&self, i: i32, j: i32) -> Option<Point2<f32>> {
        self.nodes.get(&GridCoords::new(i, j)).copied()
    }

    fn normalized(nodes: HashMap<GridCoords, Point2<f32>>) -> Self {
        let min_i = nodes.keys().map(|g| g.i).min().unwrap_or(0);
        let min_j = nodes.keys().map(|g| g.j).min().unwrap_or(0);
        Self {
            nodes: nodes
                .into_iter()
                .map(|(g, p)| (GridCoords::new(g.i - min_i, g.j - min_j), p))
                .collect(),
        }
    }
}

const STEPS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

struct Grower<'a> {
    img: &'a GrayImageView<'a>,
    corners: &'a [Corner],
    tree: &'a KdTree<f32, 2>,
    params: &'a ChessboardParams,
}

impl Grower<'_> {
    fn position(&self, idx: usize) -> Point2<f32> {
        self.corners[idx].position
    }

    /// Candidate near `p` (within `radius`) that is a saddle for `(u, v)`.
    fn saddle_near(&self, p: Point2<f32>, radius: f32, u: Vector2<f32>, v: Vector2<f32>) -> Option<usize> {
        self.tree
            .nearest_n::<SquaredEuclidean>(&[p.x, p.y], 3)
            .into_iter()
            .filter(|nn| nn.distance <= radius * radius)
            .map(|nn| nn.item as usize)
            .find(|&k| self.accept(self.position(k), u, v))
    }

    /// Seed basis: among roughly perpendicular neighbour pairs of comparable
    /// length, the one whose four axis neighbours `±u`, `±v` are best
    /// confirmed as saddles; ties go to the shorter pair.
    ///
    /// Fine texture near a corner (marker modules on ChArUco boards) makes
    /// the nearest neighbour an unreliable step.
    fn seed_basis(&self, seed: usize) -> Option<(usize, usize)> {
        let p = self.position(seed);
        let near = self
            .tree
            .nearest_n::<SquaredEuclidean>(&[p.x, p.y], self.params.k_neighbors + 1);
        let mut cands: Vec<(usize, Vector2<f32>)> = near
            .into_iter()
            .map(|nn| nn.item as usize)
            .filter(|&k| k != seed)
            .map(|k| (k, self.position(k) - p))
            .filter(|(_, d)| d.norm() >= self.params.min_spacing_pix)
            .collect();
        cands.sort_by(|a, b| a.1.norm().total_cmp(&b.1.norm()));

        let (cos_lo, cos_hi) = (-0.5f32, 0.5f32); // 60°..120°
        let mut best: Option<(usize, f32, (usize, usize))> = None;
        for (a, &(iu, u)) in cands.iter().enumerate() {
            for &(iv, v) in &cands[a + 1..] {
                let ratio = v.norm() / u.norm();
                let cos = u.dot(&v) / (u.norm() * v.norm());
                if !(cos > cos_lo && cos < cos_hi && (0.5..=2.0).contains(&ratio)) {
                    continue;
                }
                if !self.accept(p, u, v) {
                    continue;
                }
                let radius = self.params.search_radius_frac * u.norm().min(v.norm());
                let support = [p + u, p - u, p + v, p - v]
                    .into_iter()
                    .filter(|q| self.saddle_near(*q, radius, u, v).is_some())
                    .count();
                let length = u.norm() + v.norm();
                let better = match best {
                    None => support > 0,
                    Some((s, l, _)) => support > s || (support == s && length < l),
                };
                if better {
                    best = Some((support, length, (iu, iv)));
                }
            }
        }
        best.map(|(_, _, pair)| pair)
    }

    fn accept(&self, p: Point2<f32>, u: Vector2<f32>, v: Vector2<f32>) -> bool {
        is_saddle(
            self.img,
            p,
            u,
            v,
            self.params.saddle_offset_frac,
            self.params.saddle_min_contrast,
        )
    }

    /// Local lattice steps at `g`, falling back to `fallback`.
    fn local_basis(
        &self,
        nodes: &HashMap<GridCoords, (usize, Point2<f32>)>,
        g: GridCoords,
        fallback: (Vector2<f32>, Vector2<f32>),
    ) -> (Vector2<f32>, Vector2<f32>) {
        let at = |i: i32, j: i32| nodes.get(&GridCoords::new(g.i + i, g.j + j)).map(|n| n.1);
        let Some(p) = at(0, 0) else {
            return fallback;
        };
        let u = at(1, 0)
            .map(|q| q - p)
            .or_else(|| at(-1, 0).map(|q| p - q))
            .unwrap_or(fallback.0);
        let v = at(0, 1)
            .map(|q| q - p)
            .or_else(|| at(0, -1).map(|q| p - q))
            .unwrap_or(fallback.1);
        (u, v)
    }

    fn grow(&self, seed: usize, stop_at: Option<usize>) -> Option<Lattice> {
        let (iu, iv) = self.seed_basis(seed)?;
        let p0 = self.position(seed);
        let u0 = self.position(iu) - p0;
        let v0 = self.position(iv) - p0;
        if !self.accept(p0, u0, v0) {
            return None;
        }

        let mut nodes: HashMap<GridCoords, (usize, Point2<f32>)> = HashMap::new();
        let mut used: HashSet<usize> = HashSet::new();
        let mut queue = VecDeque::new();
        nodes.insert(GridCoords::new(0, 0), (seed, p0));
        used.insert(seed);
        queue.push_back(GridCoords::new(0, 0));

        while let Some(g) = queue.pop_front() {
            if stop_at.is_some_and(|n| nodes.len() >= n) {
                break;
            }
            let (u, v) = self.local_basis(&nodes, g, (u0, v0));
            let p = nodes[&g].1;
            for (di, dj) in STEPS {
                let t = GridCoords::new(g.i + di, g.j + dj);
                if nodes.contains_key(&t) {
                    continue;
                }
                let step = u * di as f32 + v * dj as f32;
                let predicted = match nodes.get(&GridCoords::new(g.i - di, g.j - dj)) {
                    Some(&(_, q)) => p + (p - q),
                    None => p + step,
                };
                let radius = self.params.search_radius_frac * u.norm().min(v.norm());
                if radius < 1.0 {
                    continue;
                }

                let near = self
                    .tree
                    .nearest_n::<SquaredEuclidean>(&[predicted.x, predicted.y], 3);
                let hit = near
                    .into_iter()
                    .filter(|nn| nn.distance <= radius * radius)
                    .map(|nn| nn.item as usize)
                    .find(|k| !used.contains(k) && self.accept(self.position(*k), u, v));
                if let Some(k) = hit {
                    nodes.insert(t, (k, self.position(k)));
                    used.insert(k);
                    queue.push_back(t);
                }
            }
        }

        Some(Lattice::normalized(
            nodes.into_iter().map(|(g, (_, p))| (g, p)).collect(),
        ))
    }
}

/// Grow lattices from the strongest seeds and return the largest one.
///
/// With `stop_at`, growth ends as soon as a lattice reaches that many nodes.
pub fn assemble_lattice(
    img: &GrayImageView<'_>,
    corners: &[Corner],
    params: &ChessboardParams,
    stop_at: Option<usize>,
) -> Option<Lattice> {
    let strong: Vec<Corner> = corners
        .iter()
        .copied()
        .filter(|c| c.strength >= params.min_strength)
        .collect();
    if strong.len() < 4 {
        return None;
    }

    let coords: Vec<[f32; 2]> = strong.iter().map(|c| [c.position.x, c.position.y]).collect();
    let tree: KdTree<f32, 2> = (&coords).into();
    let grower = Grower {
        img,
        corners: &strong,
        tree: &tree,
        params,
    };

    let mut order: Vec<usize> = (0..strong.len()).collect();
    order.sort_by(|&a, &b| strong[b].strength.total_cmp(&strong[a].strength));

    let mut best: Option<Lattice> = None;
    for &seed in order.iter().take(params.max_seeds) {
        let seed_pos = strong[seed].position;
        if best
            .as_ref()
            .is_some_and(|b| b.nodes.values().any(|p| *p == seed_pos))
        {
            continue;
        }
        let Some(lattice) = grower.grow(seed, stop_at) else {
            continue;
        };
        debug!("seed {seed}: lattice with {} nodes", lattice.len());
        if best.as_ref().is_none_or(|b| lattice.len() > b.len()) {
            best = Some(lattice);
        }
        if let (Some(n), Some(b)) = (stop_at, best.as_ref()) {
            if b.len() >= n {
                break;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::render_checkerboard_at as render_checkerboard;

    fn lattice_corners(cols: u32, rows: u32, sq: f32, origin: (f32, f32)) -> Vec<Corner> {
        let mut out = Vec::new();
        for j in 1..=rows {
            for i in 1..=cols {
                out.push(Corner::new(
                    origin.0 + i as f32 * sq,
                    origin.1 + j as f32 * sq,
                    1.0 + (i + j) as f32 * 0.01,
                ));
            }
        }
        out
    }

    #[test]
    fn grows_full_grid_and_ignores_outliers() {
        let img = render_checkerboard(260, 200, 6, 4, 25.0, Point2::new(30.0, 30.0));
        let mut corners = lattice_corners(6, 4, 25.0, (30.0, 30.0));
        // A spurious candidate in the middle of a square and one off-board.
        corners.push(Corner::new(67.0, 67.0, 5.0));
        corners.push(Corner::new(240.0, 180.0, 5.0));

        let lattice = assemble_lattice(&img.view(), &corners, &ChessboardParams::default(), None)
            .expect("lattice");
        assert_eq!(lattice.len(), 24);
        let (w, h) = lattice.extent();
        assert_eq!(w * h, 24);
        assert!(lattice.nodes.values().all(|p| p.x != 67.0));
    }

    #[test]
    fn too_few_corners_yield_nothing() {
        let img = render_checkerboard(100, 100, 2, 2, 20.0, Point2::new(20.0, 20.0));
        let corners = vec![Corner::new(40.0, 40.0, 1.0), Corner::new(60.0, 40.0, 1.0)];
        assert!(assemble_lattice(&img.view(), &corners, &ChessboardParams::default(), None).is_none());
    }
}
