use camcal_core::{GrayImage, Homography};
use nalgebra::{Matrix3, Point2};

use crate::render::render_checkerboard;

pub fn render_checkerboard_h(
    width: usize,
    height: usize,
    cols: u32,
    rows: u32,
    img_from_board: &Homography,
) -> GrayImage {
    render_checkerboard(width, height, cols, rows, img_from_board).expect("invertible homography")
}

/// Axis-aligned checkerboard whose outer corner is at `origin`.
pub fn render_checkerboard_at(
    width: usize,
    height: usize,
    cols: u32,
    rows: u32,
    square_px: f64,
    origin: Point2<f64>,
) -> GrayImage {
    let h = Homography::new(Matrix3::new(
        square_px, 0.0, origin.x, //
        0.0, square_px, origin.y, //
        0.0, 0.0, 1.0,
    ));
    render_checkerboard_h(width, height, cols, rows, &h)
}
