//! ChArUco board rendering.

use camcal_aruco::Dictionary;
use camcal_chessboard::render::{render_planar, DARK, LIGHT};
use camcal_core::{GrayImage, Homography};
use nalgebra::Matrix3;

use crate::board::CharucoBoard;

/// Gray level of the board at `(x, y)` in square units.
pub fn charuco_shade<'a>(
    board: &'a CharucoBoard,
    dict: &'a Dictionary,
) -> impl Fn(f64, f64) -> Option<u8> + 'a {
    let (cols, rows) = board.squares();
    let rel = board.marker_size_rel() as f64;
    let m0 = 0.5 * (1.0 - rel);
    let modules = dict.marker_size + 2;
    move |x, y| {
        if x < 0.0 || y < 0.0 || x >= cols as f64 || y >= rows as f64 {
            return None;
        }
        let (sx, sy) = (x.floor() as i32, y.floor() as i32);
        let Some(id) = board.marker_at(sx, sy) else {
            return Some(if (sx + sy) % 2 == 0 { DARK } else { LIGHT });
        };
        let (u, v) = ((x - sx as f64 - m0) / rel, (y - sy as f64 - m0) / rel);
        if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
            return Some(LIGHT);
        }
        let (mx, my) = ((u * modules as f64) as usize, (v * modules as f64) as usize);
        let black = dict
            .marker_modules(id)
            .is_some_and(|m| m[my * modules + mx]);
        Some(if black { DARK } else { LIGHT })
    }
}

/// Render through an arbitrary board-to-image homography.
pub fn render_charuco(
    board: &CharucoBoard,
    dict: &Dictionary,
    width: usize,
    height: usize,
    img_from_board: &Homography,
) -> Option<GrayImage> {
    render_planar(width, height, img_from_board, charuco_shade(board, dict))
}

/// Fronto-parallel render with `margin_px` of white around the board.
pub fn render_charuco_flat(
    board: &CharucoBoard,
    dict: &Dictionary,
    px_per_square: u32,
    margin_px: u32,
) -> Option<GrayImage> {
    let (cols, rows) = board.squares();
    let s = px_per_square as f64;
    let m = margin_px as f64;
    let h = Homography::new(Matrix3::new(s, 0.0, m, 0.0, s, m, 0.0, 0.0, 1.0));
    let width = (cols * px_per_square + 2 * margin_px) as usize;
    let height = (rows * px_per_square + 2 * margin_px) as usize;
    render_charuco(board, dict, width, height, &h)
}
