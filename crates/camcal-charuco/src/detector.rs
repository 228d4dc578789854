//! Grid-first ChArUco detector.
//!
//! The checkerboard lattice is assembled first, its complete square cells
//! are decoded as markers, and the decoded ids fix the lattice-to-board
//! map that assigns corner ids.

use std::collections::HashMap;

use camcal_aruco::{decode_markers_in_cells, DecodeConfig, Dictionary, MarkerCell, MarkerDetection, Matcher};
use camcal_chessboard::{ChessboardDetector, ChessboardParams, Lattice};
use camcal_core::{Corner, GrayImageView, GridCoords};
use log::debug;
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::alignment::{select_alignment, CharucoAlignment};
use crate::board::CharucoBoard;

/// Fewer correspondences cannot constrain a board homography.
pub const MIN_CHARUCO_CORNERS: usize = 4;

/// Detector parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CharucoDetectorParams {
    /// Lattice assembly. Expected dimensions are filled from the board.
    pub chessboard: ChessboardParams,
    /// Marker decoding. `marker_size_rel` is taken from the board.
    pub decode: DecodeConfig,
    /// Upper bound on accepted bit errors; clamped to the dictionary's
    /// correction capacity.
    pub max_hamming: u8,
    /// Markers that must agree on the lattice-to-board map.
    pub min_marker_inliers: usize,
}

impl Default for CharucoDetectorParams {
    fn default() -> Self {
        Self {
            // Marker modules add X-junctions around every board corner.
            chessboard: ChessboardParams {
                k_neighbors: 24,
                max_seeds: 100,
                ..ChessboardParams::default()
            },
            decode: DecodeConfig::default(),
            max_hamming: 2,
            min_marker_inliers: 2,
        }
    }
}

/// Errors returned by the ChArUco detector.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CharucoDetectError {
    #[error("no checkerboard lattice found")]
    NoLattice,
    #[error("no markers decoded")]
    NoMarkers,
    #[error("marker-to-board alignment failed (inliers={inliers})")]
    AlignmentFailed { inliers: usize },
    #[error("only {found} board corners identified")]
    TooFewCorners { found: usize },
}

/// An identified inner corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharucoCorner {
    pub id: u32,
    pub position: Point2<f32>,
}

/// Output of a ChArUco detection run. Corners are sorted by id.
#[derive(Clone, Debug, Serialize)]
pub struct CharucoDetection {
    pub corners: Vec<CharucoCorner>,
    /// Inlier markers, `cell` relabelled to board squares.
    pub markers: Vec<MarkerDetection>,
    pub alignment: CharucoAlignment,
}

impl CharucoDetection {
    pub fn ids(&self) -> Vec<u32> {
        self.corners.iter().map(|c| c.id).collect()
    }

    pub fn positions(&self) -> Vec<Point2<f32>> {
        self.corners.iter().map(|c| c.position).collect()
    }

    /// Board-frame points index-aligned with `corners`.
    pub fn object_points(&self, board: &CharucoBoard) -> Vec<Point3<f64>> {
        self.corners
            .iter()
            .filter_map(|c| board.object_point(c.id))
            .collect()
    }
}

/// ChArUco detector over precomputed ChESS corners.
pub struct CharucoDetector {
    board: CharucoBoard,
    params: CharucoDetectorParams,
    matcher: Matcher,
}

impl CharucoDetector {
    pub fn new(board: CharucoBoard, dict: &Dictionary, mut params: CharucoDetectorParams) -> Self {
        let (cols, rows) = board.inner_corners();
        params.chessboard.expected_cols.get_or_insert(cols);
        params.chessboard.expected_rows.get_or_insert(rows);
        params.decode.marker_size_rel = board.marker_size_rel();
        params.max_hamming = params.max_hamming.min(dict.max_correction_bits);

        let matcher = Matcher::new(dict, params.max_hamming);
        Self {
            board,
            params,
            matcher,
        }
    }

    #[inline]
    pub fn board(&self) -> &CharucoBoard {
        &self.board
    }

    #[inline]
    pub fn params(&self) -> &CharucoDetectorParams {
        &self.params
    }

    /// Detect the board from an image and its ChESS corners.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(num_corners = corners.len()))
    )]
    pub fn detect(
        &self,
        image: &GrayImageView<'_>,
        corners: &[Corner],
    ) -> Result<CharucoDetection, CharucoDetectError> {
        let detector = ChessboardDetector::new(self.params.chessboard.clone());
        let lattice = detector
            .find_lattice(image, corners)
            .ok_or(CharucoDetectError::NoLattice)?;
        let lattice = with_image_handedness(lattice);

        let cells = build_marker_cells(&lattice);
        let markers = decode_markers_in_cells(image, &cells, &self.params.decode, &self.matcher);
        debug!(
            "charuco: lattice {} nodes, {} cells, {} markers",
            lattice.len(),
            cells.len(),
            markers.len()
        );
        if markers.is_empty() {
            return Err(CharucoDetectError::NoMarkers);
        }

        let (alignment, inlier_markers) = select_alignment(&self.board, &markers)
            .ok_or(CharucoDetectError::AlignmentFailed { inliers: 0 })?;
        let inliers = alignment.marker_inliers.len();
        if inliers < self.params.min_marker_inliers.min(markers.len()).max(1) {
            return Err(CharucoDetectError::AlignmentFailed { inliers });
        }

        let mut by_id: HashMap<u32, Point2<f32>> = HashMap::new();
        for (g, p) in &lattice.nodes {
            let b = alignment.corners.map(*g);
            if let Some(id) = self.board.corner_id(b.i, b.j) {
                by_id.insert(id, *p);
            }
        }
        let mut corners: Vec<CharucoCorner> = by_id
            .into_iter()
            .map(|(id, position)| CharucoCorner { id, position })
            .collect();
        corners.sort_by_key(|c| c.id);

        if corners.len() < MIN_CHARUCO_CORNERS {
            return Err(CharucoDetectError::TooFewCorners {
                found: corners.len(),
            });
        }

        Ok(CharucoDetection {
            corners,
            markers: inlier_markers,
            alignment,
        })
    }
}

/// Signed area spanned by the lattice axes at every node with both forward
/// neighbours; positive when `(i, j)` turns like image `(x, y)`.
fn handedness(lattice: &Lattice) -> f32 {
    lattice
        .nodes
        .iter()
        .filter_map(|(g, p)| {
            let pi = lattice.get(g.i + 1, g.j)?;
            let pj = lattice.get(g.i, g.j + 1)?;
            let (u, v) = (pi - p, pj - p);
            Some(u.x * v.y - u.y * v.x)
        })
        .sum()
}

/// Markers read mirrored through a reflected lattice; swap the axes so
/// every cell quad keeps the image orientation.
fn with_image_handedness(lattice: Lattice) -> Lattice {
    if handedness(&lattice) >= 0.0 {
        return lattice;
    }
    Lattice {
        nodes: lattice
            .nodes
            .into_iter()
            .map(|(g, p)| (GridCoords::new(g.j, g.i), p))
            .collect(),
    }
}

/// Every lattice square with all four corners present.
fn build_marker_cells(lattice: &Lattice) -> Vec<MarkerCell> {
    let mut cells: Vec<MarkerCell> = lattice
        .nodes
        .keys()
        .filter_map(|g| {
            let (i, j) = (g.i, g.j);
            Some(MarkerCell {
                cell: *g,
                corners_img: [
                    lattice.get(i, j)?,
                    lattice.get(i + 1, j)?,
                    lattice.get(i + 1, j + 1)?,
                    lattice.get(i, j + 1)?,
                ],
            })
        })
        .collect();
    cells.sort_by_key(|c| c.cell);
    cells
}
