//! Index-aligned object/image correspondences for one frame.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PointSetError {
    #[error("length mismatch: {ids} ids, {object} object points, {image} image points")]
    LengthMismatch {
        ids: usize,
        object: usize,
        image: usize,
    },
    #[error("duplicate corner id {0}")]
    DuplicateId(u32),
}

/// Correspondences between board points (metres, `z = 0` for planar
/// targets) and image points (pixels).
///
/// Entry `k` of every array refers to the same physical corner; the arrays
/// always have equal length. Solvers consume this type directly instead of
/// re-shaping raw arrays.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    ids: Vec<u32>,
    object: Vec<Point3<f64>>,
    image: Vec<Point2<f64>>,
}

impl PointSet {
    pub fn new(
        ids: Vec<u32>,
        object: Vec<Point3<f64>>,
        image: Vec<Point2<f64>>,
    ) -> Result<Self, PointSetError> {
        if ids.len() != object.len() || ids.len() != image.len() {
            return Err(PointSetError::LengthMismatch {
                ids: ids.len(),
                object: object.len(),
                image: image.len(),
            });
        }
        let mut seen = ids.clone();
        seen.sort_unstable();
        if let Some(w) = seen.windows(2).find(|w| w[0] == w[1]) {
            return Err(PointSetError::DuplicateId(w[0]));
        }
        Ok(Self { ids, object, image })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn object_points(&self) -> &[Point3<f64>] {
        &self.object
    }

    pub fn image_points(&self) -> &[Point2<f64>] {
        &self.image
    }

    /// Same correspondences with image points replaced (e.g. after
    /// sub-pixel refinement).
    pub fn with_image_points(&self, image: Vec<Point2<f64>>) -> Result<Self, PointSetError> {
        Self::new(self.ids.clone(), self.object.clone(), image)
    }

    /// Board points projected onto the `z = 0` plane.
    pub fn planar_object_xy(&self) -> Vec<Point2<f64>> {
        self.object.iter().map(|p| Point2::new(p.x, p.y)).collect()
    }

    /// Image point for a corner id, if present.
    pub fn image_point_of(&self, id: u32) -> Option<Point2<f64>> {
        self.ids
            .iter()
            .position(|&x| x == id)
            .map(|k| self.image[k])
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Point3<f64>, &Point2<f64>)> {
        self.ids
            .iter()
            .zip(&self.object)
            .zip(&self.image)
            .map(|((&id, o), i)| (id, o, i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unequal_lengths() {
        let err = PointSet::new(
            vec![0, 1],
            vec![Point3::origin(); 2],
            vec![Point2::origin()],
        )
        .unwrap_err();
        assert_eq!(
            err,
            PointSetError::LengthMismatch {
                ids: 2,
                object: 2,
                image: 1
            }
        );
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = PointSet::new(
            vec![3, 3],
            vec![Point3::origin(); 2],
            vec![Point2::origin(); 2],
        )
        .unwrap_err();
        assert_eq!(err, PointSetError::DuplicateId(3));
    }

    #[test]
    fn lookup_by_id_follows_alignment() {
        let ps = PointSet::new(
            vec![7, 2],
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
            vec![Point2::new(10.0, 20.0), Point2::new(30.0, 40.0)],
        )
        .unwrap();
        assert_eq!(ps.image_point_of(2), Some(Point2::new(30.0, 40.0)));
        assert_eq!(ps.image_point_of(5), None);
        assert!(PointSet::empty().is_empty());
    }
}
