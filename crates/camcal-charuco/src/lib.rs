//! ChArUco board detection.
//!
//! Pipeline:
//! - checkerboard lattice assembly from ChESS corners (`camcal-chessboard`),
//! - per-cell marker decoding on complete lattice squares (`camcal-aruco`),
//! - lattice-to-board alignment voted by the decoded marker ids,
//! - corner id assignment for every aligned inner corner.

mod alignment;
mod board;
mod detector;
pub mod render;

#[cfg(test)]
pub(crate) mod test_utils;

pub use alignment::{select_alignment, solve_alignment, CharucoAlignment};
pub use board::{CharucoBoard, CharucoBoardError};
pub use detector::{
    CharucoCorner, CharucoDetectError, CharucoDetection, CharucoDetector, CharucoDetectorParams,
    MIN_CHARUCO_CORNERS,
};
