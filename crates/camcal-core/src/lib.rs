//! Core types shared by the calibration crates.
//!
//! Purely geometric: image views and sampling, homographies, integer grid
//! alignment, index-aligned point sets, poses and the pattern description.
//! It does not depend on any corner detector or image codec.

mod corner;
mod grid;
mod homography;
mod image;
mod logger;
mod pattern;
mod points;
mod pose;

pub use corner::Corner;
pub use grid::{GridAlignment, GridCoords, GridTransform, GRID_TRANSFORMS_D4};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{sample_bilinear, sobel, sobel_magnitude, GrayImage, GrayImageView, ImageSize};
pub use pattern::{DictionaryName, PatternConfig, PatternConfigError, PatternKind};
pub use points::{PointSet, PointSetError};
pub use pose::{rodrigues, Pose};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;
pub use logger::{init_from_env, init_with_level, parse_level, LOG_ENV};
