//! Code matching against a dictionary, tolerant to rotation and bit errors.

use crate::Dictionary;

/// Best dictionary entry for an observed code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    pub id: u32,
    /// Quarter turns such that `observed == rotate(code[id], rotation)`.
    pub rotation: u8,
    pub hamming: u8,
}

/// Brute-force matcher over all ids and four rotations.
#[derive(Clone, Debug)]
pub struct Matcher {
    marker_size: usize,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
}

impl Matcher {
    pub fn new(dict: &Dictionary, max_hamming: u8) -> Self {
        let n = dict.marker_size;
        let rotated = dict
            .codes
            .iter()
            .map(|&c| [0, 1, 2, 3].map(|r| rotate_code(c, n, r)))
            .collect();
        Self {
            marker_size: n,
            max_hamming,
            rotated,
        }
    }

    #[inline]
    pub fn marker_size(&self) -> usize {
        self.marker_size
    }

    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    /// Closest code within the Hamming budget; ties keep the lowest id.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;
        for (id, rots) in self.rotated.iter().enumerate() {
            for (rotation, &cand) in rots.iter().enumerate() {
                let hamming = (observed ^ cand).count_ones() as u8;
                if hamming > self.max_hamming || best.is_some_and(|b| b.hamming <= hamming) {
                    continue;
                }
                best = Some(Match {
                    id: id as u32,
                    rotation: rotation as u8,
                    hamming,
                });
                if hamming == 0 {
                    return best;
                }
            }
        }
        best
    }
}

/// Rotate an `n×n` row-major code by `rot` quarter turns clockwise.
pub fn rotate_code(code: u64, n: usize, rot: u8) -> u64 {
    let mut out = code;
    for _ in 0..(rot & 3) {
        let src = out;
        out = 0;
        for y in 0..n {
            for x in 0..n {
                // Clockwise: destination (x, y) takes source (y, n-1-x).
                let bit = (src >> ((n - 1 - x) * n + y)) & 1;
                out |= bit << (y * n + x);
            }
        }
    }
    out
}
