//! Per-directory detection results.

use std::fs;
use std::path::{Path, PathBuf};

use camcal_core::{ImageSize, PointSet};
use log::{debug, info};
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::detect::PatternDetector;
use crate::error::CalibrationError;

/// One frame with a found pattern.
#[derive(Clone, Debug, Serialize)]
pub struct FrameEntry {
    /// File stem, used to pair stereo frames.
    pub frame_id: String,
    pub path: PathBuf,
    pub points: PointSet,
}

/// Outcome for one listed file, in listing order.
#[derive(Clone, Debug, Serialize)]
pub struct FrameOutcome {
    pub path: PathBuf,
    pub found: bool,
}

/// Found detections of one directory, in lexicographic path order.
#[derive(Clone, Debug, Serialize)]
pub struct CorrespondenceSet {
    pub frames: Vec<FrameEntry>,
    /// Every decodable file, found or not.
    pub outcomes: Vec<FrameOutcome>,
    /// Size shared by every decoded image; `None` when nothing decoded.
    pub image_size: Option<ImageSize>,
}

/// Regular files of `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CalibrationError> {
    if !dir.is_dir() {
        return Err(CalibrationError::InvalidInput(format!(
            "images directory {} does not exist",
            dir.display()
        )));
    }
    let entries = fs::read_dir(dir)
        .map_err(|e| CalibrationError::InvalidInput(format!("{}: {e}", dir.display())))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

pub fn frame_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn load_gray(path: &Path) -> Option<::image::GrayImage> {
    match ::image::open(path) {
        Ok(img) => Some(img.into_luma8()),
        Err(e) => {
            debug!("skipping {}: {e}", path.display());
            None
        }
    }
}

impl CorrespondenceSet {
    /// Detect the pattern in every image of `dir`.
    ///
    /// Undecodable files and misses are skipped; an empty result is not an
    /// error here. Images of differing sizes are rejected.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(dir = %dir.display())))]
    pub fn collect(dir: &Path, detector: &PatternDetector) -> Result<Self, CalibrationError> {
        let mut set = CorrespondenceSet {
            frames: Vec::new(),
            outcomes: Vec::new(),
            image_size: None,
        };
        for path in list_images(dir)? {
            let Some(img) = load_gray(&path) else {
                continue;
            };
            let size = ImageSize::new(img.width(), img.height());
            match set.image_size {
                None => set.image_size = Some(size),
                Some(s) if s != size => {
                    return Err(CalibrationError::InvalidInput(format!(
                        "{} is {}x{}, expected {}x{}",
                        path.display(),
                        size.width,
                        size.height,
                        s.width,
                        s.height
                    )));
                }
                Some(_) => {}
            }
            let detection = detector.detect(&img);
            if detection.found {
                set.frames.push(FrameEntry {
                    frame_id: frame_id(&path),
                    path: path.clone(),
                    points: detection.points,
                });
            } else {
                debug!("no pattern in {}", path.display());
            }
            set.outcomes.push(FrameOutcome {
                path,
                found: detection.found,
            });
        }
        info!(
            "{}: pattern found in {}/{} images",
            dir.display(),
            set.frames.len(),
            set.outcomes.len()
        );
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn views(&self) -> Vec<PointSet> {
        self.frames.iter().map(|f| f.points.clone()).collect()
    }

    pub fn frame_ids(&self) -> Vec<String> {
        self.frames.iter().map(|f| f.frame_id.clone()).collect()
    }

    /// Image size of a non-empty set.
    pub fn require_size(&self, dir: &Path) -> Result<ImageSize, CalibrationError> {
        match (self.is_empty(), self.image_size) {
            (false, Some(size)) => Ok(size),
            _ => Err(CalibrationError::DetectionFailure {
                dir: dir.to_path_buf(),
                images: self.outcomes.len(),
            }),
        }
    }

    /// Re-refine every frame on its source image with `params`.
    pub fn refined(
        &self,
        detector: &PatternDetector,
        params: &camcal_chessboard::SubPixParams,
    ) -> Self {
        let frames = self
            .frames
            .iter()
            .map(|f| {
                let points = match load_gray(&f.path) {
                    Some(img) => detector.refine(&img, &f.points, params),
                    None => f.points.clone(),
                };
                FrameEntry {
                    points,
                    ..f.clone()
                }
            })
            .collect();
        Self {
            frames,
            outcomes: self.outcomes.clone(),
            image_size: self.image_size,
        }
    }
}
