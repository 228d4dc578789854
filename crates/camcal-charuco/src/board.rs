//! ChArUco board layout.

use camcal_aruco::Dictionary;
use camcal_core::{DictionaryName, PatternConfig, PatternConfigError, PatternKind};
use nalgebra::Point3;

/// Board validation errors.
#[derive(thiserror::Error, Debug)]
pub enum CharucoBoardError {
    #[error("not a charuco pattern")]
    NotCharuco,
    #[error(transparent)]
    Pattern(#[from] PatternConfigError),
    #[error("board uses {board}, dictionary is {dictionary}")]
    DictionaryMismatch {
        board: DictionaryName,
        dictionary: DictionaryName,
    },
    #[error("board needs {needed} markers, dictionary has {available}")]
    NotEnoughCodes { needed: usize, available: usize },
}

/// Validated ChArUco board.
///
/// `cols`×`rows` count squares. The top-left square is black; markers sit
/// on the white squares (`(sx + sy)` odd) with ids assigned row-major.
#[derive(Clone, Debug)]
pub struct CharucoBoard {
    pattern: PatternConfig,
    marker_size_rel: f32,
    marker_positions: Vec<[i32; 2]>,
}

impl CharucoBoard {
    pub fn new(pattern: &PatternConfig, dict: &Dictionary) -> Result<Self, CharucoBoardError> {
        if pattern.kind != PatternKind::Charuco {
            return Err(CharucoBoardError::NotCharuco);
        }
        pattern.validate()?;
        let board_dict = pattern.dictionary.ok_or(PatternConfigError::MissingDictionary)?;
        if board_dict != dict.name {
            return Err(CharucoBoardError::DictionaryMismatch {
                board: board_dict,
                dictionary: dict.name,
            });
        }
        let marker_size = pattern.marker_size.ok_or(PatternConfigError::MissingMarkerSize)?;

        let marker_positions: Vec<[i32; 2]> = (0..pattern.rows as i32)
            .flat_map(|sy| (0..pattern.columns as i32).map(move |sx| [sx, sy]))
            .filter(|[sx, sy]| (sx + sy) % 2 == 1)
            .collect();
        if marker_positions.len() > dict.len() {
            return Err(CharucoBoardError::NotEnoughCodes {
                needed: marker_positions.len(),
                available: dict.len(),
            });
        }

        Ok(Self {
            pattern: pattern.clone(),
            marker_size_rel: (marker_size / pattern.square_size) as f32,
            marker_positions,
        })
    }

    #[inline]
    pub fn pattern(&self) -> &PatternConfig {
        &self.pattern
    }

    #[inline]
    pub fn squares(&self) -> (u32, u32) {
        (self.pattern.columns, self.pattern.rows)
    }

    #[inline]
    pub fn inner_corners(&self) -> (u32, u32) {
        self.pattern.corner_grid()
    }

    #[inline]
    pub fn marker_size_rel(&self) -> f32 {
        self.marker_size_rel
    }

    #[inline]
    pub fn marker_count(&self) -> usize {
        self.marker_positions.len()
    }

    /// Square `(sx, sy)` holding marker `id`.
    #[inline]
    pub fn marker_position(&self, id: u32) -> Option<[i32; 2]> {
        self.marker_positions.get(id as usize).copied()
    }

    /// Marker id on square `(sx, sy)`, if that square carries one.
    pub fn marker_at(&self, sx: i32, sy: i32) -> Option<u32> {
        let (cols, rows) = (self.pattern.columns as i32, self.pattern.rows as i32);
        if sx < 0 || sy < 0 || sx >= cols || sy >= rows || (sx + sy) % 2 == 0 {
            return None;
        }
        // White squares before row `sy` plus those left of `sx` in the row.
        let before_rows: i32 = (0..sy).map(|y| (0..cols).filter(|x| (x + y) % 2 == 1).count() as i32).sum();
        let in_row = (0..sx).filter(|x| (x + sy) % 2 == 1).count() as i32;
        Some((before_rows + in_row) as u32)
    }

    /// Row-major corner id of board intersection `(bi, bj)`; only inner
    /// intersections have ids.
    pub fn corner_id(&self, bi: i32, bj: i32) -> Option<u32> {
        let (cols, rows) = (self.pattern.columns as i32, self.pattern.rows as i32);
        if bi <= 0 || bj <= 0 || bi >= cols || bj >= rows {
            return None;
        }
        Some(((bj - 1) * (cols - 1) + (bi - 1)) as u32)
    }

    /// Board-frame coordinates (metres) of corner `id`.
    pub fn object_point(&self, id: u32) -> Option<Point3<f64>> {
        (id < self.pattern.max_corner_count() as u32).then(|| self.pattern.corner_object_point(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::synthetic_dictionary;

    fn board(cols: u32, rows: u32) -> CharucoBoard {
        let pattern = PatternConfig::charuco(cols, rows, 0.04, 0.03, DictionaryName::Dict4x4_50);
        CharucoBoard::new(&pattern, &synthetic_dictionary(50)).expect("board")
    }

    #[test]
    fn markers_fill_white_squares_row_major() {
        let b = board(6, 5);
        assert_eq!(b.marker_count(), 15);
        assert_eq!(b.marker_position(0), Some([1, 0]));
        assert_eq!(b.marker_position(3), Some([0, 1]));
        assert_eq!(b.marker_position(4), Some([2, 1]));
        for id in 0..15 {
            let [sx, sy] = b.marker_position(id).unwrap();
            assert_eq!(b.marker_at(sx, sy), Some(id));
        }
        assert_eq!(b.marker_at(0, 0), None);
    }

    #[test]
    fn corner_ids_cover_inner_intersections_only() {
        let b = board(6, 5);
        assert_eq!(b.inner_corners(), (5, 4));
        assert_eq!(b.corner_id(1, 1), Some(0));
        assert_eq!(b.corner_id(5, 4), Some(19));
        assert_eq!(b.corner_id(0, 2), None);
        assert_eq!(b.corner_id(6, 2), None);
        let p = b.object_point(6).unwrap();
        assert!((p.x - 0.08).abs() < 1e-12 && (p.y - 0.08).abs() < 1e-12);
        assert!(b.object_point(20).is_none());
    }

    #[test]
    fn rejects_mismatched_or_small_dictionary() {
        let pattern = PatternConfig::charuco(6, 5, 0.04, 0.03, DictionaryName::Dict5x5_50);
        assert!(matches!(
            CharucoBoard::new(&pattern, &synthetic_dictionary(50)),
            Err(CharucoBoardError::DictionaryMismatch { .. })
        ));
        let pattern = PatternConfig::charuco(6, 5, 0.04, 0.03, DictionaryName::Dict4x4_50);
        assert!(matches!(
            CharucoBoard::new(&pattern, &synthetic_dictionary(10)),
            Err(CharucoBoardError::NotEnoughCodes { needed: 15, available: 10 })
        ));
    }
}
