//! Synthetic board rendering for previews and test fixtures.

use camcal_core::{GrayImage, Homography};
use nalgebra::Point2;

pub const DARK: u8 = 25;
pub const LIGHT: u8 = 230;

/// Render a planar target seen through `img_from_board`.
///
/// `shade(x, y)` gives the target's gray level at board coordinates
/// (`None` outside the target, drawn as `LIGHT`). Each pixel averages a 4×4
/// supersampling grid over its footprint centred on `(x, y)`.
pub fn render_planar<F>(
    width: usize,
    height: usize,
    img_from_board: &Homography,
    shade: F,
) -> Option<GrayImage>
where
    F: Fn(f64, f64) -> Option<u8>,
{
    const SS: usize = 4;
    let board_from_img = img_from_board.inverse()?;
    let mut img = GrayImage::filled(width, height, LIGHT);
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0u32;
            for sy in 0..SS {
                for sx in 0..SS {
                    let px = x as f64 - 0.5 + (sx as f64 + 0.5) / SS as f64;
                    let py = y as f64 - 0.5 + (sy as f64 + 0.5) / SS as f64;
                    let b = board_from_img.apply_f64(Point2::new(px, py));
                    acc += shade(b.x, b.y).unwrap_or(LIGHT) as u32;
                }
            }
            img.data[y * width + x] = ((acc + (SS * SS / 2) as u32) / (SS * SS) as u32) as u8;
        }
    }
    Some(img)
}

/// Checkerboard with `cols`×`rows` inner corners; board units are squares
/// with the origin at the outer top-left corner, whose square is dark.
pub fn checkerboard_shade(cols: u32, rows: u32) -> impl Fn(f64, f64) -> Option<u8> {
    let (nx, ny) = (cols as f64 + 1.0, rows as f64 + 1.0);
    move |x, y| {
        if x < 0.0 || y < 0.0 || x >= nx || y >= ny {
            return None;
        }
        let dark = (x.floor() as i64 + y.floor() as i64) % 2 == 0;
        Some(if dark { DARK } else { LIGHT })
    }
}

pub fn render_checkerboard(
    width: usize,
    height: usize,
    cols: u32,
    rows: u32,
    img_from_board: &Homography,
) -> Option<GrayImage> {
    render_planar(width, height, img_from_board, checkerboard_shade(cols, rows))
}
