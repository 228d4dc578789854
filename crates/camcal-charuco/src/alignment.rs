//! Marker-to-board alignment.
//!
//! Decoded markers vote for a lattice-to-board mapping: for each of the
//! eight lattice symmetries, every marker proposes the translation taking
//! its cell onto the board square of its id; the most popular translation
//! wins and the symmetry with most inliers is kept.

use std::collections::HashMap;

use camcal_aruco::MarkerDetection;
use camcal_core::{GridAlignment, GridCoords, GridTransform, GRID_TRANSFORMS_D4};
use serde::Serialize;

use crate::board::CharucoBoard;

/// Mapping from detected lattice corners to board intersections.
#[derive(Clone, Debug, Serialize)]
pub struct CharucoAlignment {
    /// Corner-level map: `board_corner = transform(lattice_corner) + translation`.
    pub corners: GridAlignment,
    /// Indices of markers consistent with the map.
    pub marker_inliers: Vec<usize>,
}

/// Offset between a cell's mapped top-left corner and the top-left corner
/// of its image square under `t`.
#[inline]
fn cell_corner_offset(t: GridTransform) -> [i32; 2] {
    [(1 - (t.a + t.b)) / 2, (1 - (t.c + t.d)) / 2]
}

fn vote_translation(
    board: &CharucoBoard,
    markers: &[MarkerDetection],
    t: GridTransform,
) -> Option<([i32; 2], Vec<usize>)> {
    let mut votes: HashMap<[i32; 2], Vec<usize>> = HashMap::new();
    for (idx, m) in markers.iter().enumerate() {
        let Some([ex, ey]) = board.marker_position(m.id) else {
            continue;
        };
        let r = t.apply(m.cell);
        votes.entry([ex - r.i, ey - r.j]).or_default().push(idx);
    }
    votes
        .into_iter()
        .max_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| b.0.cmp(&a.0)))
}

/// Best symmetry and translation for `markers`, cells given in lattice
/// labels (cell `(i, j)` has its top-left corner at lattice `(i, j)`).
pub fn solve_alignment(board: &CharucoBoard, markers: &[MarkerDetection]) -> Option<CharucoAlignment> {
    let mut best: Option<CharucoAlignment> = None;
    for t in GRID_TRANSFORMS_D4 {
        let Some((cell_t, inliers)) = vote_translation(board, markers, t) else {
            continue;
        };
        if best
            .as_ref()
            .is_some_and(|b| b.marker_inliers.len() >= inliers.len())
        {
            continue;
        }
        let off = cell_corner_offset(t);
        best = Some(CharucoAlignment {
            corners: GridAlignment {
                transform: t,
                translation: [cell_t[0] + off[0], cell_t[1] + off[1]],
            },
            marker_inliers: inliers,
        });
    }
    best
}

/// Markers only occupy squares of one colour, so cells of the other parity
/// can only produce false decodes. Solve on each parity class and on the
/// full set, keeping the alignment with most inliers; returns the inlier
/// markers relabelled with board squares.
pub fn select_alignment(
    board: &CharucoBoard,
    markers: &[MarkerDetection],
) -> Option<(CharucoAlignment, Vec<MarkerDetection>)> {
    let parity = |p: i32| -> Vec<MarkerDetection> {
        markers
            .iter()
            .filter(|m| (m.cell.i + m.cell.j).rem_euclid(2) == p)
            .cloned()
            .collect()
    };
    let candidates = [markers.to_vec(), parity(0), parity(1)];

    let (alignment, subset) = candidates
        .into_iter()
        .filter_map(|set| solve_alignment(board, &set).map(|a| (a, set)))
        .max_by_key(|(a, _)| a.marker_inliers.len())?;

    let inliers = alignment
        .marker_inliers
        .iter()
        .filter_map(|&k| subset.get(k))
        .map(|m| {
            let mut m = m.clone();
            if let Some([sx, sy]) = board.marker_position(m.id) {
                m.cell = GridCoords::new(sx, sy);
            }
            m
        })
        .collect();
    Some((alignment, inliers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::synthetic_dictionary;
    use camcal_core::{DictionaryName, PatternConfig};
    use nalgebra::Point2;

    fn board() -> CharucoBoard {
        let pattern = PatternConfig::charuco(6, 6, 0.04, 0.03, DictionaryName::Dict4x4_50);
        CharucoBoard::new(&pattern, &synthetic_dictionary(20)).unwrap()
    }

    fn marker(id: u32, cell: GridCoords) -> MarkerDetection {
        MarkerDetection {
            id,
            cell,
            rotation: 0,
            hamming: 0,
            border_score: 1.0,
            score: 1.0,
            corners_img: [Point2::origin(); 4],
        }
    }

    /// Lattice labels of inner corners start at board corner (1, 1); a
    /// lattice cell (i, j) is board square (i + 1, j + 1).
    #[test]
    fn identity_layout_maps_lattice_to_inner_corners() {
        let b = board();
        let markers: Vec<_> = (0..8u32)
            .filter_map(|id| {
                let [sx, sy] = b.marker_position(id)?;
                (sx >= 1 && sy >= 1).then(|| marker(id, GridCoords::new(sx - 1, sy - 1)))
            })
            .collect();
        let a = solve_alignment(&b, &markers).expect("alignment");
        assert_eq!(a.corners.transform, GridTransform::IDENTITY);
        assert_eq!(a.corners.translation, [1, 1]);
        assert_eq!(a.marker_inliers.len(), markers.len());
    }

    #[test]
    fn half_turn_recovers_corner_translation() {
        let b = board();
        // Lattice of 5x5 inner corners seen upside down: lattice corner (i, j)
        // is board corner (5 - i, 5 - j), so board square (sx, sy) is
        // lattice cell (4 - sx, 4 - sy).
        let markers: Vec<_> = (0..10u32)
            .filter_map(|id| {
                let [sx, sy] = b.marker_position(id)?;
                let cell = GridCoords::new(4 - sx, 4 - sy);
                (cell.i >= 0 && cell.j >= 0).then(|| marker(id, cell))
            })
            .collect();
        let a = solve_alignment(&b, &markers).expect("alignment");
        assert_eq!(a.corners.transform, GRID_TRANSFORMS_D4[2]);
        assert_eq!(a.corners.map(GridCoords::new(0, 0)), GridCoords::new(5, 5));
        assert_eq!(a.corners.map(GridCoords::new(4, 4)), GridCoords::new(1, 1));
    }

    #[test]
    fn wrong_parity_decodes_are_discarded() {
        let b = board();
        let mut markers: Vec<_> = (3..9u32)
            .map(|id| {
                let [sx, sy] = b.marker_position(id).unwrap();
                marker(id, GridCoords::new(sx - 1, sy - 1))
            })
            .collect();
        // False decode on a cell of the wrong colour.
        markers.push(marker(0, GridCoords::new(0, 0)));
        let (a, inliers) = select_alignment(&b, &markers).expect("alignment");
        assert_eq!(a.corners.translation, [1, 1]);
        assert_eq!(inliers.len(), 6);
        assert!(inliers.iter().all(|m| m.id != 0));
        let [sx, sy] = b.marker_position(inliers[0].id).unwrap();
        assert_eq!(inliers[0].cell, GridCoords::new(sx, sy));
    }
}
