//! X-junction verification.
//!
//! A checkerboard inner corner has the same shade in diagonally opposite
//! quadrants and the opposite shade in the other pair. Border L-corners and
//! marker outline corners fail this test.

use camcal_core::{sample_bilinear, GrayImageView};
use nalgebra::{Point2, Vector2};

fn patch_mean(img: &GrayImageView<'_>, p: Point2<f32>) -> f32 {
    const OFFSETS: [(f32, f32); 5] = [(0.0, 0.0), (0.5, 0.0), (-0.5, 0.0), (0.0, 0.5), (0.0, -0.5)];
    OFFSETS
        .iter()
        .map(|(dx, dy)| sample_bilinear(img, p.x + dx, p.y + dy))
        .sum::<f32>()
        / OFFSETS.len() as f32
}

/// Signed contrast between the two diagonal quadrant pairs around `p`.
///
/// `u` and `v` are the local lattice steps; samples are taken at
/// `p ± offset * (u ± v)`. The magnitude is the gap between the pairs
/// (negative when the pairs overlap); the sign tells which pair is bright.
pub fn saddle_contrast(
    img: &GrayImageView<'_>,
    p: Point2<f32>,
    u: Vector2<f32>,
    v: Vector2<f32>,
    offset: f32,
) -> f32 {
    let d1 = (u + v) * offset;
    let d2 = (u - v) * offset;
    let q1 = patch_mean(img, p + d1);
    let q3 = patch_mean(img, p - d1);
    let q2 = patch_mean(img, p + d2);
    let q4 = patch_mean(img, p - d2);

    let bright_diag = q1.min(q3) - q2.max(q4);
    let dark_diag = q2.min(q4) - q1.max(q3);
    if bright_diag >= dark_diag {
        bright_diag
    } else {
        -dark_diag
    }
}

#[inline]
pub fn is_saddle(
    img: &GrayImageView<'_>,
    p: Point2<f32>,
    u: Vector2<f32>,
    v: Vector2<f32>,
    offset: f32,
    min_contrast: f32,
) -> bool {
    saddle_contrast(img, p, u, v, offset).abs() >= min_contrast
}
