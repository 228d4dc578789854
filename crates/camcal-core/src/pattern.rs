//! Calibration pattern description.

use std::fmt;
use std::str::FromStr;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatternConfigError {
    #[error("columns and rows must be >= 2 (got {columns}x{rows})")]
    GridTooSmall { columns: u32, rows: u32 },
    #[error("square_size must be > 0 (got {0})")]
    InvalidSquareSize(f64),
    #[error("charuco pattern requires marker_size")]
    MissingMarkerSize,
    #[error("marker_size must be > 0 and smaller than square_size (got {marker} vs {square})")]
    InvalidMarkerSize { marker: f64, square: f64 },
    #[error("charuco pattern requires a dictionary name")]
    MissingDictionary,
    #[error("unknown marker dictionary {0:?}")]
    UnknownDictionary(String),
    #[error("unknown pattern type {0:?} (expected checkerboard or charuco)")]
    UnknownPattern(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Checkerboard,
    Charuco,
}

impl FromStr for PatternKind {
    type Err = PatternConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "checkerboard" | "chessboard" => Ok(Self::Checkerboard),
            "charuco" => Ok(Self::Charuco),
            _ => Err(PatternConfigError::UnknownPattern(s.to_string())),
        }
    }
}

macro_rules! dictionary_names {
    ($($variant:ident => $name:literal, $bits:literal, $capacity:literal;)*) => {
        /// Named marker dictionaries accepted for ChArUco boards.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum DictionaryName {
            $(#[serde(rename = $name)] $variant,)*
        }

        impl DictionaryName {
            pub const ALL: &'static [DictionaryName] = &[$(DictionaryName::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self { $(DictionaryName::$variant => $name,)* }
            }

            /// Side length of the marker's inner bit grid.
            pub fn marker_bits(self) -> usize {
                match self { $(DictionaryName::$variant => $bits,)* }
            }

            /// Number of codes in the dictionary.
            pub fn capacity(self) -> usize {
                match self { $(DictionaryName::$variant => $capacity,)* }
            }
        }

        impl FromStr for DictionaryName {
            type Err = PatternConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(DictionaryName::$variant),)*
                    _ => Err(PatternConfigError::UnknownDictionary(s.to_string())),
                }
            }
        }
    };
}

dictionary_names! {
    Dict4x4_50 => "DICT_4X4_50", 4, 50;
    Dict4x4_100 => "DICT_4X4_100", 4, 100;
    Dict4x4_250 => "DICT_4X4_250", 4, 250;
    Dict4x4_1000 => "DICT_4X4_1000", 4, 1000;
    Dict5x5_50 => "DICT_5X5_50", 5, 50;
    Dict5x5_100 => "DICT_5X5_100", 5, 100;
    Dict5x5_250 => "DICT_5X5_250", 5, 250;
    Dict5x5_1000 => "DICT_5X5_1000", 5, 1000;
    Dict6x6_50 => "DICT_6X6_50", 6, 50;
    Dict6x6_100 => "DICT_6X6_100", 6, 100;
    Dict6x6_250 => "DICT_6X6_250", 6, 250;
    Dict6x6_1000 => "DICT_6X6_1000", 6, 1000;
    Dict7x7_50 => "DICT_7X7_50", 7, 50;
    Dict7x7_100 => "DICT_7X7_100", 7, 100;
    Dict7x7_250 => "DICT_7X7_250", 7, 250;
    Dict7x7_1000 => "DICT_7X7_1000", 7, 1000;
    ArucoOriginal => "DICT_ARUCO_ORIGINAL", 5, 1024;
    AprilTag16h5 => "DICT_APRILTAG_16h5", 4, 30;
    AprilTag25h9 => "DICT_APRILTAG_25h9", 5, 35;
    AprilTag36h10 => "DICT_APRILTAG_36h10", 6, 2320;
    AprilTag36h11 => "DICT_APRILTAG_36h11", 6, 587;
}

impl fmt::Display for DictionaryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planar target description. Immutable once validated.
///
/// For checkerboards `columns`×`rows` count inner corners. For ChArUco
/// boards they count squares; the inner corners form a
/// `(columns-1)×(rows-1)` lattice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub kind: PatternKind,
    pub columns: u32,
    pub rows: u32,
    /// Square side in metres.
    pub square_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<DictionaryName>,
}

impl PatternConfig {
    pub fn checkerboard(columns: u32, rows: u32, square_size: f64) -> Self {
        Self {
            kind: PatternKind::Checkerboard,
            columns,
            rows,
            square_size,
            marker_size: None,
            dictionary: None,
        }
    }

    pub fn charuco(
        columns: u32,
        rows: u32,
        square_size: f64,
        marker_size: f64,
        dictionary: DictionaryName,
    ) -> Self {
        Self {
            kind: PatternKind::Charuco,
            columns,
            rows,
            square_size,
            marker_size: Some(marker_size),
            dictionary: Some(dictionary),
        }
    }

    pub fn validate(&self) -> Result<(), PatternConfigError> {
        if self.columns < 2 || self.rows < 2 {
            return Err(PatternConfigError::GridTooSmall {
                columns: self.columns,
                rows: self.rows,
            });
        }
        if !(self.square_size.is_finite() && self.square_size > 0.0) {
            return Err(PatternConfigError::InvalidSquareSize(self.square_size));
        }
        if self.kind == PatternKind::Charuco {
            let marker = self.marker_size.ok_or(PatternConfigError::MissingMarkerSize)?;
            if !(marker.is_finite() && marker > 0.0 && marker < self.square_size) {
                return Err(PatternConfigError::InvalidMarkerSize {
                    marker,
                    square: self.square_size,
                });
            }
            if self.dictionary.is_none() {
                return Err(PatternConfigError::MissingDictionary);
            }
        }
        Ok(())
    }

    /// Inner-corner lattice `(cols, rows)` the detector must find.
    pub fn corner_grid(&self) -> (u32, u32) {
        match self.kind {
            PatternKind::Checkerboard => (self.columns, self.rows),
            PatternKind::Charuco => (self.columns - 1, self.rows - 1),
        }
    }

    pub fn max_corner_count(&self) -> usize {
        let (c, r) = self.corner_grid();
        c as usize * r as usize
    }

    /// Board coordinates of the corner with row-major id `id`.
    ///
    /// Checkerboard corner `(i, j)` sits at `(i, j, 0) * square_size`;
    /// ChArUco inner corners are offset by one square from the board edge.
    pub fn corner_object_point(&self, id: u32) -> Point3<f64> {
        let (cols, _) = self.corner_grid();
        let (i, j) = (id % cols, id / cols);
        let offset = match self.kind {
            PatternKind::Checkerboard => 0.0,
            PatternKind::Charuco => 1.0,
        };
        Point3::new(
            (i as f64 + offset) * self.square_size,
            (j as f64 + offset) * self.square_size,
            0.0,
        )
    }

    /// All corner object points in id order.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.max_corner_count() as u32)
            .map(|id| self.corner_object_point(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_dictionary_names_parse_back() {
        assert_eq!(DictionaryName::ALL.len(), 21);
        for &name in DictionaryName::ALL {
            assert_eq!(name.as_str().parse::<DictionaryName>(), Ok(name));
        }
        assert_eq!(
            "DICT_9X9_50".parse::<DictionaryName>(),
            Err(PatternConfigError::UnknownDictionary("DICT_9X9_50".into()))
        );
    }

    #[test]
    fn dictionary_serializes_as_opencv_name() {
        let json = serde_json::to_string(&DictionaryName::AprilTag36h11).unwrap();
        assert_eq!(json, "\"DICT_APRILTAG_36h11\"");
    }

    #[test]
    fn charuco_requires_marker_and_dictionary() {
        let mut cfg = PatternConfig::charuco(5, 7, 0.04, 0.03, DictionaryName::Dict4x4_50);
        assert!(cfg.validate().is_ok());
        cfg.marker_size = None;
        assert_eq!(cfg.validate(), Err(PatternConfigError::MissingMarkerSize));
        cfg.marker_size = Some(0.05);
        assert!(matches!(
            cfg.validate(),
            Err(PatternConfigError::InvalidMarkerSize { .. })
        ));
        cfg.marker_size = Some(0.03);
        cfg.dictionary = None;
        assert_eq!(cfg.validate(), Err(PatternConfigError::MissingDictionary));
    }

    #[test]
    fn rejects_small_grids_and_bad_squares() {
        assert!(PatternConfig::checkerboard(1, 6, 0.02).validate().is_err());
        assert!(PatternConfig::checkerboard(9, 6, 0.0).validate().is_err());
        assert!(PatternConfig::checkerboard(9, 6, f64::NAN).validate().is_err());
    }

    #[test]
    fn object_points_follow_row_major_ids() {
        let cb = PatternConfig::checkerboard(9, 6, 0.025);
        let pts = cb.object_points();
        assert_eq!(pts.len(), 54);
        assert_eq!(pts[10], Point3::new(0.025, 0.025, 0.0));

        let ch = PatternConfig::charuco(5, 4, 0.04, 0.03, DictionaryName::Dict4x4_50);
        assert_eq!(ch.max_corner_count(), 12);
        assert_eq!(ch.corner_object_point(0), Point3::new(0.04, 0.04, 0.0));
        assert_eq!(ch.corner_object_point(5), Point3::new(0.08, 0.08, 0.0));
    }
}
