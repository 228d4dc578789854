use serde::{Deserialize, Serialize};

/// Integer lattice coordinates `(i, j)`; `i` runs along columns, `j` along rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoords {
    pub i: i32,
    pub j: i32,
}

impl GridCoords {
    #[inline]
    pub const fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }
}

/// Unimodular 2×2 integer map `(i', j') = (a*i + b*j, c*i + d*j)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridTransform {
    pub a: i32,
    pub b: i32,
    pub c: i32,
    pub d: i32,
}

impl GridTransform {
    pub const IDENTITY: GridTransform = GridTransform::new(1, 0, 0, 1);

    pub const fn new(a: i32, b: i32, c: i32, d: i32) -> Self {
        Self { a, b, c, d }
    }

    #[inline]
    pub fn apply(&self, g: GridCoords) -> GridCoords {
        GridCoords::new(self.a * g.i + self.b * g.j, self.c * g.i + self.d * g.j)
    }

    /// True when the transform exchanges the two lattice axes.
    #[inline]
    pub fn swaps_axes(&self) -> bool {
        self.a == 0
    }
}

/// `dst = transform(src) + translation`, mapping detected lattice labels
/// onto board coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridAlignment {
    pub transform: GridTransform,
    pub translation: [i32; 2],
}

impl GridAlignment {
    pub const IDENTITY: GridAlignment = GridAlignment {
        transform: GridTransform::IDENTITY,
        translation: [0, 0],
    };

    #[inline]
    pub fn map(&self, g: GridCoords) -> GridCoords {
        let r = self.transform.apply(g);
        GridCoords::new(r.i + self.translation[0], r.j + self.translation[1])
    }
}

/// Rotations and reflections of the square lattice.
pub const GRID_TRANSFORMS_D4: [GridTransform; 8] = [
    GridTransform::new(1, 0, 0, 1),
    GridTransform::new(0, 1, -1, 0),
    GridTransform::new(-1, 0, 0, -1),
    GridTransform::new(0, -1, 1, 0),
    GridTransform::new(-1, 0, 0, 1),
    GridTransform::new(1, 0, 0, -1),
    GridTransform::new(0, 1, 1, 0),
    GridTransform::new(0, -1, -1, 0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn d4_elements_are_distinct_and_unimodular() {
        for (k, t) in GRID_TRANSFORMS_D4.iter().enumerate() {
            assert_eq!((t.a * t.d - t.b * t.c).abs(), 1);
            for u in &GRID_TRANSFORMS_D4[k + 1..] {
                assert_ne!(t, u);
            }
        }
    }

    #[test]
    fn alignment_applies_transform_then_translation() {
        let a = GridAlignment {
            transform: GRID_TRANSFORMS_D4[2],
            translation: [6, 4],
        };
        assert_eq!(a.map(GridCoords::new(1, 1)), GridCoords::new(5, 3));
        assert!(GRID_TRANSFORMS_D4[6].swaps_axes());
    }
}
