//! Pattern detection on decoded images: ChESS corners, then the
//! checkerboard or ChArUco detector, then sub-pixel refinement.

use camcal_aruco::Dictionary;
use camcal_charuco::{CharucoBoard, CharucoDetector, CharucoDetectorParams};
use camcal_chessboard::{refine_corners_subpix, ChessboardDetector, ChessboardParams, SubPixParams};
use camcal_core::{sobel_magnitude, Corner, GrayImageView, PatternConfig, PatternKind, PointSet};
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use log::debug;
use nalgebra::{Point2, Point3};
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::EngineConfig;
use crate::error::CalibrationError;

/// Corners closer than this to the border are left out of the sharpness term.
const SHARPNESS_MARGIN: usize = 5;
const SHARPNESS_HALF_PATCH: usize = 5;
/// Mean Sobel magnitude that maps to full sharpness.
const SHARPNESS_SCALE: f64 = 100.0;

/// Result of detecting the pattern in one image.
///
/// `points` is empty when `found` is false; ids, object points and image
/// points are index-aligned.
#[derive(Clone, Debug, Serialize)]
pub struct Detection {
    pub found: bool,
    pub points: PointSet,
    /// Live-capture quality in `[0, 1]`.
    pub quality: f64,
    pub should_capture: bool,
    /// Decoded marker outlines (ChArUco only), for annotation.
    #[serde(skip)]
    pub marker_outlines: Vec<[Point2<f32>; 4]>,
}

impl Detection {
    fn missed() -> Self {
        Self {
            found: false,
            points: PointSet::empty(),
            quality: 0.0,
            should_capture: false,
            marker_outlines: Vec::new(),
        }
    }

    pub fn image_points(&self) -> &[Point2<f64>] {
        self.points.image_points()
    }

    pub fn object_points(&self) -> &[Point3<f64>] {
        self.points.object_points()
    }
}

/// Borrow an `image::GrayImage` as a core view.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// ChESS corners adapted to core corners.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, cfg), fields(width = img.width(), height = img.height()))
)]
pub fn detect_corners(img: &::image::GrayImage, cfg: &ChessConfig) -> Vec<Corner> {
    find_chess_corners_image(img, cfg)
        .iter()
        .map(|c: &CornerDescriptor| Corner::new(c.x, c.y, c.response))
        .collect()
}

enum Target {
    Checkerboard(ChessboardDetector),
    Charuco(Box<CharucoDetector>),
}

/// Detector for one pattern configuration. Build once per run, reuse for
/// every frame.
pub struct PatternDetector {
    pattern: PatternConfig,
    chess: ChessConfig,
    subpix: SubPixParams,
    capture_threshold: f64,
    target: Target,
}

impl PatternDetector {
    /// Validate `pattern` and, for ChArUco, load its dictionary: a table in
    /// the configured directory, else the compiled-in one.
    pub fn new(pattern: &PatternConfig, config: &EngineConfig) -> Result<Self, CalibrationError> {
        pattern.validate()?;
        let dict = match pattern.dictionary {
            Some(name) if pattern.kind == PatternKind::Charuco => {
                Some(Dictionary::resolve(&config.dictionary_dir, name)?)
            }
            _ => None,
        };
        Self::with_dictionary(pattern, dict.as_ref(), config)
    }

    /// Like [`PatternDetector::new`] with an already loaded dictionary.
    pub fn with_dictionary(
        pattern: &PatternConfig,
        dict: Option<&Dictionary>,
        config: &EngineConfig,
    ) -> Result<Self, CalibrationError> {
        pattern.validate()?;
        let target = match pattern.kind {
            PatternKind::Checkerboard => Target::Checkerboard(ChessboardDetector::new(
                ChessboardParams::for_grid(pattern.columns, pattern.rows),
            )),
            PatternKind::Charuco => {
                let dict = dict.ok_or_else(|| {
                    CalibrationError::InvalidInput("charuco pattern needs a dictionary".into())
                })?;
                let board = CharucoBoard::new(pattern, dict)?;
                Target::Charuco(Box::new(CharucoDetector::new(
                    board,
                    dict,
                    CharucoDetectorParams::default(),
                )))
            }
        };
        Ok(Self {
            pattern: pattern.clone(),
            chess: config.chess.to_chess_config(),
            subpix: config.subpix,
            capture_threshold: config.capture_threshold,
            target,
        })
    }

    pub fn pattern(&self) -> &PatternConfig {
        &self.pattern
    }

    /// Detect the pattern. A miss is a normal outcome, not an error.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = img.width(), height = img.height()))
    )]
    pub fn detect(&self, img: &::image::GrayImage) -> Detection {
        let corners = detect_corners(img, &self.chess);
        let view = gray_view(img);
        let (ids, raw, outlines): (Vec<u32>, Vec<Point2<f32>>, Vec<[Point2<f32>; 4]>) = match &self.target {
            Target::Checkerboard(det) => match det.detect(&view, &corners) {
                Some(board) => {
                    let cols = board.cols;
                    let ids = board
                        .corners
                        .iter()
                        .map(|c| c.grid.j as u32 * cols + c.grid.i as u32)
                        .collect();
                    (ids, board.positions(), Vec::new())
                }
                None => {
                    debug!("checkerboard not found among {} corners", corners.len());
                    return Detection::missed();
                }
            },
            Target::Charuco(det) => match det.detect(&view, &corners) {
                Ok(found) => (
                    found.ids(),
                    found.positions(),
                    found.markers.iter().map(|m| m.corners_img).collect(),
                ),
                Err(e) => {
                    debug!("charuco not found: {e}");
                    return Detection::missed();
                }
            },
        };

        let mut image: Vec<Point2<f64>> = raw.iter().map(|p| Point2::new(p.x as f64, p.y as f64)).collect();
        refine_corners_subpix(&view, &mut image, &self.subpix);
        let object = ids.iter().map(|&id| self.pattern.corner_object_point(id)).collect();
        let points = match PointSet::new(ids, object, image) {
            Ok(p) => p,
            Err(e) => {
                debug!("inconsistent detection dropped: {e}");
                return Detection::missed();
            }
        };

        let quality = match self.pattern.kind {
            PatternKind::Checkerboard => checkerboard_quality(&view, points.image_points()),
            PatternKind::Charuco => charuco_quality(points.len(), self.pattern.max_corner_count()),
        };
        Detection {
            found: true,
            should_capture: quality >= self.capture_threshold,
            points,
            quality,
            marker_outlines: outlines,
        }
    }

    /// Re-refine detected points on their source image with other
    /// sub-pixel settings. Ids and object points are kept.
    pub fn refine(&self, img: &::image::GrayImage, points: &PointSet, params: &SubPixParams) -> PointSet {
        let mut image = points.image_points().to_vec();
        refine_corners_subpix(&gray_view(img), &mut image, params);
        points.with_image_points(image).unwrap_or_else(|_| points.clone())
    }
}

/// Half corner bounding-box coverage, half local gradient sharpness.
pub fn checkerboard_quality(img: &GrayImageView<'_>, points: &[Point2<f64>]) -> f64 {
    if points.is_empty() || img.width == 0 || img.height == 0 {
        return 0.0;
    }
    let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for p in points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    let area = (img.width * img.height) as f64;
    let coverage = ((x1 - x0) * (y1 - y0) / area).clamp(0.0, 1.0);

    let (w, h) = (img.width, img.height);
    let mut sum = 0.0;
    let mut n = 0usize;
    for p in points {
        if p.x < 0.0 || p.y < 0.0 {
            continue;
        }
        let (x, y) = (p.x as usize, p.y as usize);
        if x <= SHARPNESS_MARGIN || y <= SHARPNESS_MARGIN || x + SHARPNESS_MARGIN >= w || y + SHARPNESS_MARGIN >= h {
            continue;
        }
        let mut patch = 0.0;
        let r = SHARPNESS_HALF_PATCH;
        for yy in y - r..=y + r {
            for xx in x - r..=x + r {
                patch += sobel_magnitude(img, xx, yy) as f64;
            }
        }
        sum += patch / ((2 * r + 1) * (2 * r + 1)) as f64;
        n += 1;
    }
    let sharpness = if n == 0 {
        0.0
    } else {
        (sum / n as f64 / SHARPNESS_SCALE).min(1.0)
    };
    0.5 * coverage + 0.5 * sharpness
}

/// Fraction of the board's inner corners that were identified.
pub fn charuco_quality(found: usize, max: usize) -> f64 {
    if max == 0 {
        return 0.0;
    }
    (found as f64 / max as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charuco_quality_is_capped_fraction() {
        assert_eq!(charuco_quality(12, 24), 0.5);
        assert_eq!(charuco_quality(30, 24), 1.0);
        assert_eq!(charuco_quality(3, 0), 0.0);
    }

    #[test]
    fn flat_image_has_no_sharpness() {
        let img = ::image::GrayImage::from_pixel(100, 50, ::image::Luma([128]));
        let pts = [Point2::new(10.0, 10.0), Point2::new(60.0, 10.0), Point2::new(10.0, 35.0), Point2::new(60.0, 35.0)];
        let q = checkerboard_quality(&gray_view(&img), &pts);
        assert!((q - 0.5 * (50.0 * 25.0) / 5000.0).abs() < 1e-12);
    }

    #[test]
    fn charuco_without_dictionary_is_invalid() {
        let pattern = PatternConfig::charuco(5, 4, 0.04, 0.03, camcal_core::DictionaryName::Dict4x4_50);
        let res = PatternDetector::with_dictionary(&pattern, None, &EngineConfig::default());
        assert!(matches!(res, Err(CalibrationError::InvalidInput(_))));
    }

    #[test]
    fn blank_image_is_a_miss() {
        let pattern = PatternConfig::checkerboard(9, 6, 0.025);
        let det = PatternDetector::new(&pattern, &EngineConfig::default()).unwrap();
        let img = ::image::GrayImage::from_pixel(320, 240, ::image::Luma([200]));
        let d = det.detect(&img);
        assert!(!d.found);
        assert!(d.image_points().is_empty());
        assert_eq!(d.image_points().len(), d.object_points().len());
    }
}
