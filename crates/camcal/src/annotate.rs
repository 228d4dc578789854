//! Detection overlays for preview images.

use ::image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use crate::detect::Detection;

const ROW_COLOURS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([220, 220, 0]),
    Rgb([0, 200, 0]),
    Rgb([0, 128, 255]),
    Rgb([200, 0, 255]),
];
const MARKER_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const CORNER_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
const CORNER_RADIUS: i32 = 4;

pub fn to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

/// RGB copy of `gray` with the detection drawn on top. A miss returns the
/// plain copy.
///
/// Checkerboard corners are joined in id order with one colour per board
/// row; ChArUco corners get crosses and the decoded markers their outlines.
pub fn annotate(gray: &GrayImage, detection: &Detection, columns: u32) -> RgbImage {
    let mut out = to_rgb(gray);
    if !detection.found {
        return out;
    }
    let points = detection.image_points();
    let ids = detection.points.ids();

    if detection.marker_outlines.is_empty() {
        let cols = columns.max(1);
        for (k, p) in points.iter().enumerate() {
            let colour = ROW_COLOURS[(ids[k] / cols) as usize % ROW_COLOURS.len()];
            if let Some(next) = points.get(k + 1) {
                draw_line_segment_mut(
                    &mut out,
                    (p.x as f32, p.y as f32),
                    (next.x as f32, next.y as f32),
                    colour,
                );
            }
            draw_hollow_circle_mut(&mut out, (p.x.round() as i32, p.y.round() as i32), CORNER_RADIUS, colour);
        }
    } else {
        for quad in &detection.marker_outlines {
            for e in 0..4 {
                let (a, b) = (quad[e], quad[(e + 1) % 4]);
                draw_line_segment_mut(&mut out, (a.x, a.y), (b.x, b.y), MARKER_COLOUR);
            }
        }
        for p in points {
            draw_cross_mut(&mut out, CORNER_COLOUR, p.x.round() as i32, p.y.round() as i32);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::PointSet;
    use nalgebra::{Point2, Point3};

    fn fake_detection() -> Detection {
        let points = PointSet::new(
            vec![0, 1],
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            vec![Point2::new(10.0, 10.0), Point2::new(30.0, 10.0)],
        )
        .unwrap();
        Detection {
            found: true,
            points,
            quality: 0.5,
            should_capture: false,
            marker_outlines: Vec::new(),
        }
    }

    #[test]
    fn draws_polyline_between_corners() {
        let gray = GrayImage::from_pixel(40, 20, ::image::Luma([0]));
        let out = annotate(&gray, &fake_detection(), 2);
        assert_eq!(out.dimensions(), (40, 20));
        assert_eq!(*out.get_pixel(20, 10), ROW_COLOURS[0]);
        assert_eq!(*out.get_pixel(20, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn miss_is_plain_copy() {
        let gray = GrayImage::from_pixel(8, 8, ::image::Luma([77]));
        let mut det = fake_detection();
        det.found = false;
        let out = annotate(&gray, &det, 2);
        assert!(out.pixels().all(|p| *p == Rgb([77, 77, 77])));
    }
}
