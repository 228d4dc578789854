//! Marker decoding from image-space square cells.
//!
//! Each cell quad is mapped to a canonical square through a homography.
//! Bit modules are sampled at their centres, binarized with an Otsu
//! threshold taken over the marker area, the black border is verified,
//! and the inner bits are matched against the dictionary.

use std::collections::HashMap;

use camcal_core::{homography_from_4pt, GrayImageView, GridCoords, Homography};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::threshold::otsu_threshold;
use crate::Matcher;

/// Decoder configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Border width in modules.
    pub border_bits: usize,
    /// Marker side relative to the square side (ChArUco markers are inset).
    pub marker_size_rel: f32,
    /// Fraction of a module ignored around each sample centre.
    pub inset_frac: f32,
    /// Fraction of border modules that must read black.
    pub min_border_score: f32,
    /// Smallest marker side in pixels worth decoding.
    pub min_marker_px: f32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            border_bits: 1,
            marker_size_rel: 1.0,
            inset_frac: 0.1,
            min_border_score: 0.85,
            min_marker_px: 12.0,
        }
    }
}

/// A square cell and its image corners (TL, TR, BR, BL in cell order).
#[derive(Clone, Debug)]
pub struct MarkerCell {
    pub cell: GridCoords,
    pub corners_img: [Point2<f32>; 4],
}

/// A decoded marker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarkerDetection {
    pub id: u32,
    /// Cell in the detector's own lattice labels.
    pub cell: GridCoords,
    /// Quarter turns between the dictionary code and what was read.
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
    /// Combined confidence in `[0, 1]`.
    pub score: f32,
    pub corners_img: [Point2<f32>; 4],
}

const UNIT: [Point2<f32>; 4] = [
    Point2::new(0.0, 0.0),
    Point2::new(1.0, 0.0),
    Point2::new(1.0, 1.0),
    Point2::new(0.0, 1.0),
];

/// Sampling layout inside the unit cell.
struct Layout {
    modules: usize,
    centres: Vec<Point2<f32>>,
    threshold_points: Vec<Point2<f32>>,
}

impl Layout {
    fn new(cfg: &DecodeConfig, bits: usize) -> Self {
        let modules = bits + 2 * cfg.border_bits;
        let side = cfg.marker_size_rel.clamp(0.05, 1.0);
        let start = 0.5 * (1.0 - side);
        let step = side / modules as f32;

        let centres = (0..modules)
            .flat_map(|y| (0..modules).map(move |x| (x, y)))
            .map(|(x, y)| {
                Point2::new(
                    start + (x as f32 + 0.5) * step,
                    start + (y as f32 + 0.5) * step,
                )
            })
            .collect();

        // Three samples per module along each axis.
        let fine = modules * 3;
        let fstep = side / fine as f32;
        let threshold_points = (0..fine)
            .flat_map(|y| (0..fine).map(move |x| (x, y)))
            .map(|(x, y)| {
                Point2::new(
                    start + (x as f32 + 0.5) * fstep,
                    start + (y as f32 + 0.5) * fstep,
                )
            })
            .collect();

        Self {
            modules,
            centres,
            threshold_points,
        }
    }
}

fn mean_3x3(img: &GrayImageView<'_>, p: Point2<f32>) -> Option<u8> {
    let (x, y) = (p.x.round() as i64, p.y.round() as i64);
    if x < 1 || y < 1 || x + 1 >= img.width as i64 || y + 1 >= img.height as i64 {
        return None;
    }
    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += img.get((x + dx) as usize, (y + dy) as usize) as u32;
        }
    }
    Some((sum / 9) as u8)
}

struct Observation {
    code: u64,
    border_score: f32,
}

fn read_cell(
    img: &GrayImageView<'_>,
    h: &Homography,
    layout: &Layout,
    bits: usize,
    border: usize,
    min_border_score: f32,
) -> Option<Observation> {
    let samples: Vec<u8> = layout
        .centres
        .iter()
        .map(|p| mean_3x3(img, h.apply(*p)))
        .collect::<Option<_>>()?;
    let thr_samples: Vec<u8> = layout
        .threshold_points
        .iter()
        .filter_map(|p| mean_3x3(img, h.apply(*p)))
        .collect();
    let thr = otsu_threshold(&thr_samples);

    let n = layout.modules;
    let mut code = 0u64;
    let (mut border_black, mut border_total) = (0u32, 0u32);
    for y in 0..n {
        for x in 0..n {
            let black = samples[y * n + x] < thr;
            let on_border = x < border || y < border || x >= n - border || y >= n - border;
            if on_border {
                border_total += 1;
                border_black += black as u32;
            } else if black {
                code |= 1 << ((y - border) * bits + (x - border));
            }
        }
    }

    let border_score = if border_total == 0 {
        1.0
    } else {
        border_black as f32 / border_total as f32
    };
    (border_score >= min_border_score).then_some(Observation { code, border_score })
}

/// Decode at most one marker per cell; for repeated ids the best-scoring
/// detection wins.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip_all, fields(cells = cells.len()))
)]
pub fn decode_markers_in_cells(
    img: &GrayImageView<'_>,
    cells: &[MarkerCell],
    cfg: &DecodeConfig,
    matcher: &Matcher,
) -> Vec<MarkerDetection> {
    let bits = matcher.marker_size();
    let layout = Layout::new(cfg, bits);

    let mut best: HashMap<u32, MarkerDetection> = HashMap::new();
    for cell in cells {
        let side = (cell.corners_img[1] - cell.corners_img[0])
            .norm()
            .min((cell.corners_img[3] - cell.corners_img[0]).norm());
        if side * cfg.marker_size_rel < cfg.min_marker_px {
            continue;
        }
        let Some(h) = homography_from_4pt(&UNIT, &cell.corners_img) else {
            continue;
        };
        let Some(obs) = read_cell(img, &h, &layout, bits, cfg.border_bits, cfg.min_border_score)
        else {
            continue;
        };
        let Some(m) = matcher.match_code(obs.code) else {
            continue;
        };

        let score = obs.border_score * (1.0 - m.hamming as f32 / matcher.bit_count() as f32);
        let det = MarkerDetection {
            id: m.id,
            cell: cell.cell,
            rotation: m.rotation,
            hamming: m.hamming,
            border_score: obs.border_score,
            score: score.clamp(0.0, 1.0),
            corners_img: cell.corners_img,
        };
        match best.get(&m.id) {
            Some(prev) if prev.score >= det.score => {}
            _ => {
                best.insert(m.id, det);
            }
        }
    }

    let mut out: Vec<MarkerDetection> = best.into_values().collect();
    out.sort_by_key(|d| d.id);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::rotate_code;
    use crate::Dictionary;
    use camcal_core::{DictionaryName, GrayImage};

    /// Marker with `margin` white modules around it, `px` pixels per module.
    fn marker_image(code: u64, bits: usize, margin: usize, px: usize) -> GrayImage {
        let modules = bits + 2 + 2 * margin;
        let side = modules * px;
        let mut img = GrayImage::filled(side, side, 235);
        for my in 0..bits + 2 {
            for mx in 0..bits + 2 {
                let border = mx == 0 || my == 0 || mx == bits + 1 || my == bits + 1;
                let black = border || (code >> ((my - 1) * bits + mx - 1)) & 1 == 1;
                if !black {
                    continue;
                }
                for y in 0..px {
                    for x in 0..px {
                        let (ix, iy) = ((mx + margin) * px + x, (my + margin) * px + y);
                        img.data[iy * side + ix] = 20;
                    }
                }
            }
        }
        img
    }

    fn square(side: f32) -> [Point2<f32>; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(side, 0.0),
            Point2::new(side, side),
            Point2::new(0.0, side),
        ]
    }

    #[test]
    fn decodes_inset_marker_and_reports_rotation() {
        let dict = Dictionary::from_codes(DictionaryName::Dict4x4_50, 1, vec![0x1b72, 0x4b1c]).unwrap();
        let matcher = Matcher::new(&dict, 1);
        // One module of margin on each side: marker covers 6/8 of the cell.
        let img = marker_image(rotate_code(0x4b1c, 4, 3), 4, 1, 8);
        let cfg = DecodeConfig {
            marker_size_rel: 0.75,
            ..DecodeConfig::default()
        };
        let cells = [MarkerCell {
            cell: GridCoords::new(2, 1),
            corners_img: square(64.0),
        }];

        let dets = decode_markers_in_cells(&img.view(), &cells, &cfg, &matcher);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].id, 1);
        assert_eq!(dets[0].rotation, 3);
        assert_eq!(dets[0].hamming, 0);
        assert_eq!(dets[0].cell, GridCoords::new(2, 1));
    }

    #[test]
    fn blank_cell_decodes_nothing() {
        let dict = Dictionary::from_codes(DictionaryName::Dict4x4_50, 0, vec![0x1b72]).unwrap();
        let img = GrayImage::filled(64, 64, 200);
        let cells = [MarkerCell {
            cell: GridCoords::new(0, 0),
            corners_img: square(64.0),
        }];
        let dets = decode_markers_in_cells(&img.view(), &cells, &DecodeConfig::default(), &Matcher::new(&dict, 0));
        assert!(dets.is_empty());
    }
}
