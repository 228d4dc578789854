use serde::{Deserialize, Serialize};

/// Lattice assembly parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Expected inner corners along the `i` axis. `None` accepts any grid.
    pub expected_cols: Option<u32>,
    /// Expected inner corners along the `j` axis.
    pub expected_rows: Option<u32>,
    /// Corners weaker than this are ignored.
    pub min_strength: f32,
    /// Shortest admissible lattice step in pixels.
    pub min_spacing_pix: f32,
    /// Neighbours examined when building a seed basis.
    pub k_neighbors: usize,
    /// How many of the strongest corners are tried as seeds.
    pub max_seeds: usize,
    /// Match radius around a predicted corner, as a fraction of the local step.
    pub search_radius_frac: f32,
    /// Quadrant sampling offset along each diagonal, as a fraction of the step.
    pub saddle_offset_frac: f32,
    /// Minimal gray-level separation between the two diagonal pairs.
    pub saddle_min_contrast: f32,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            expected_cols: None,
            expected_rows: None,
            min_strength: 0.0,
            min_spacing_pix: 6.0,
            k_neighbors: 8,
            max_seeds: 25,
            search_radius_frac: 0.3,
            saddle_offset_frac: 0.1,
            saddle_min_contrast: 15.0,
        }
    }
}

impl ChessboardParams {
    pub fn for_grid(cols: u32, rows: u32) -> Self {
        Self {
            expected_cols: Some(cols),
            expected_rows: Some(rows),
            ..Self::default()
        }
    }
}

/// Termination criteria for iterative sub-pixel refinement.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct SubPixParams {
    /// Window is `(2w+1)²` pixels.
    pub half_window: usize,
    pub max_iterations: usize,
    /// Stop once a step moves the corner less than this (pixels).
    pub epsilon: f64,
}

impl SubPixParams {
    /// Detection-time refinement: 11×11 window, 30 iterations or 0.1 px.
    pub const fn standard() -> Self {
        Self {
            half_window: 5,
            max_iterations: 30,
            epsilon: 0.1,
        }
    }

    /// Refinement pass: 23×23 window, 30 iterations or 0.001 px.
    pub const fn optimize() -> Self {
        Self {
            half_window: 11,
            max_iterations: 30,
            epsilon: 0.001,
        }
    }
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self::standard()
    }
}
