//! Checkerboard detection on top of ChESS corner candidates.
//!
//! Pipeline:
//! 1. Drop weak candidates and index the rest in a KD-tree.
//! 2. From the strongest seeds, build a local basis from two roughly
//!    perpendicular neighbours.
//! 3. Grow the lattice breadth-first: predict each neighbour from the local
//!    steps, take the nearest candidate within a fraction of the step, and
//!    keep it only if it is an X-junction.
//! 4. Keep the largest lattice. A checkerboard must be complete; it is then
//!    relabelled into a canonical row-major order.
//! 5. Refine the corners with the iterative gradient-orthogonality solver.

mod detector;
mod lattice;
mod params;
pub mod render;
mod saddle;
mod subpix;

#[cfg(test)]
pub(crate) mod test_utils;

pub use detector::{canonical_order, ChessboardDetection, ChessboardDetector, GridCorner};
pub use lattice::{assemble_lattice, Lattice};
pub use params::{ChessboardParams, SubPixParams};
pub use saddle::{is_saddle, saddle_contrast};
pub use subpix::refine_corners_subpix;
