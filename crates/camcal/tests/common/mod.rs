#![allow(dead_code)]

use std::path::Path;

use camcal::chessboard::render::render_checkerboard;
use camcal::core::{rodrigues, Homography, Pose};
use nalgebra::{Matrix3, Vector3};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
pub const COLS: u32 = 9;
pub const ROWS: u32 = 6;
pub const SQUARE: f64 = 0.025;

pub fn camera_matrix() -> Matrix3<f64> {
    Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0)
}

/// Varied board poses with the inner-corner grid roughly centred.
pub fn poses(n: usize, spread: f64) -> Vec<Pose> {
    let (cx, cy) = (0.5 * (COLS - 1) as f64 * SQUARE, 0.5 * (ROWS - 1) as f64 * SQUARE);
    (0..n)
        .map(|k| {
            let a = k as f64 * 2.399;
            let rvec = Vector3::new(0.3 * a.sin(), 0.3 * (1.3 * a).cos(), 0.15 * (0.7 * a).sin());
            let r = rodrigues(&rvec);
            let centre = r * Vector3::new(cx, cy, 0.0);
            let shift = Vector3::new(spread * (1.7 * a).cos(), spread * 0.7 * (2.3 * a).sin(), 0.5 + 0.08 * (0.9 * a).sin());
            Pose::new(rvec, shift - centre)
        })
        .collect()
}

/// Homography from checkerboard render units (squares, origin at the outer
/// corner) to pixels for a board at `pose` in front of `k`.
pub fn board_homography(k: &Matrix3<f64>, pose: &Pose) -> Homography {
    let r = pose.rotation();
    let rt = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), pose.tvec]);
    let to_metric = Matrix3::new(SQUARE, 0.0, -SQUARE, 0.0, SQUARE, -SQUARE, 0.0, 0.0, 1.0);
    Homography::new(k * rt * to_metric)
}

pub fn render(k: &Matrix3<f64>, pose: &Pose) -> image::GrayImage {
    let h = board_homography(k, pose);
    let img = render_checkerboard(WIDTH as usize, HEIGHT as usize, COLS, ROWS, &h).expect("render");
    image::GrayImage::from_raw(WIDTH, HEIGHT, img.data).expect("buffer")
}

/// Write one PNG per pose as `frame_XX.png`.
pub fn write_frames(dir: &Path, k: &Matrix3<f64>, poses: &[Pose]) {
    for (i, pose) in poses.iter().enumerate() {
        render(k, pose).save(dir.join(format!("frame_{i:02}.png"))).expect("save");
    }
}

/// Pose of the same board seen from a camera displaced by `(rel_r, rel_t)`.
pub fn in_right_camera(pose: &Pose, rel_r: &Matrix3<f64>, rel_t: &Vector3<f64>) -> Pose {
    Pose::from_rotation_translation(&(rel_r * pose.rotation()), rel_r * pose.tvec + rel_t)
}
