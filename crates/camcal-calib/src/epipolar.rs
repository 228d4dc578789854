//! Essential and fundamental matrices from point matches.
//!
//! Both use the normalized 8-point solver inside a seeded RANSAC loop, so
//! repeated runs on the same matches give the same matrix. The final model
//! is refit on all inliers.

use nalgebra::{DMatrix, Matrix3, Point2, Vector3};
use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::CalibError;

const SAMPLE: usize = 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacOptions {
    /// Inlier distance to the epipolar line, in pixels.
    pub threshold: f64,
    pub confidence: f64,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            confidence: 0.99,
            max_iterations: 2000,
            seed: 0x5eed_ca11,
        }
    }
}

/// Estimated matrix with `x2ᵀ M x1 = 0`, unit Frobenius norm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpipolarEstimate {
    pub matrix: Matrix3<f64>,
    pub inliers: Vec<usize>,
    pub iterations: usize,
}

/// Translate to the centroid and scale to mean distance `√2`.
fn normalizing_transform(pts: &[Point2<f64>]) -> Matrix3<f64> {
    let n = pts.len().max(1) as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
    let (mx, my) = (sx / n, sy / n);
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - mx).powi(2) + (p.y - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0)
}

fn apply(t: &Matrix3<f64>, p: &Point2<f64>) -> Vector3<f64> {
    t * Vector3::new(p.x, p.y, 1.0)
}

/// Rank-2 or essential projection of `m` through its SVD.
fn project_singular_values(m: &Matrix3<f64>, essential: bool) -> Option<Matrix3<f64>> {
    let svd = m.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut s = svd.singular_values;
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&i, &j| s[j].total_cmp(&s[i]));
    s[idx[2]] = 0.0;
    if essential {
        s[idx[0]] = 1.0;
        s[idx[1]] = 1.0;
    }
    Some(u * Matrix3::from_diagonal(&s) * v_t)
}

/// Normalized 8-point fit.
///
/// The fundamental matrix gets its rank-2 projection in normalized
/// coordinates. The essential matrix is denormalized first, then projected
/// onto singular values (1, 1, 0).
fn eight_point(x1: &[Point2<f64>], x2: &[Point2<f64>], essential: bool) -> Option<Matrix3<f64>> {
    if x1.len() < SAMPLE || x1.len() != x2.len() {
        return None;
    }
    let (t1, t2) = (normalizing_transform(x1), normalizing_transform(x2));
    let rows = x1.len().max(9);
    let mut a = DMatrix::zeros(rows, 9);
    for (i, (p, q)) in x1.iter().zip(x2).enumerate() {
        let (u, v) = (apply(&t1, p), apply(&t2, q));
        let row = [
            v.x * u.x,
            v.x * u.y,
            v.x,
            v.y * u.x,
            v.y * u.y,
            v.y,
            u.x,
            u.y,
            1.0,
        ];
        for (c, val) in row.into_iter().enumerate() {
            a[(i, c)] = val;
        }
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd.singular_values.argmin();
    let f = v_t.row(min_idx);
    let fm = Matrix3::new(f[0], f[1], f[2], f[3], f[4], f[5], f[6], f[7], f[8]);

    let out = if essential {
        project_singular_values(&(t2.transpose() * fm * t1), true)?
    } else {
        t2.transpose() * project_singular_values(&fm, false)? * t1
    };
    let n = out.norm();
    if !(n.is_finite() && n > 1e-15) {
        return None;
    }
    Some(out / n)
}

/// Squared Sampson distance of a match to the model.
fn sampson(m: &Matrix3<f64>, p: &Point2<f64>, q: &Point2<f64>) -> f64 {
    let x1 = Vector3::new(p.x, p.y, 1.0);
    let x2 = Vector3::new(q.x, q.y, 1.0);
    let fx1 = m * x1;
    let ftx2 = m.transpose() * x2;
    let num = x2.dot(&fx1);
    let den = fx1.x.powi(2) + fx1.y.powi(2) + ftx2.x.powi(2) + ftx2.y.powi(2);
    if den < 1e-300 {
        f64::INFINITY
    } else {
        num * num / den
    }
}

fn inliers_of(m: &Matrix3<f64>, x1: &[Point2<f64>], x2: &[Point2<f64>], thresh_sq: f64) -> Vec<usize> {
    x1.iter()
        .zip(x2)
        .enumerate()
        .filter(|(_, (p, q))| sampson(m, p, q) <= thresh_sq)
        .map(|(i, _)| i)
        .collect()
}

fn required_iterations(inlier_ratio: f64, confidence: f64, cap: usize) -> usize {
    let w = inlier_ratio.powi(SAMPLE as i32);
    if w <= f64::EPSILON {
        return cap;
    }
    if w >= 1.0 - f64::EPSILON {
        return 1;
    }
    let n = (1.0 - confidence).ln() / (1.0 - w).ln();
    if n.is_finite() {
        (n.ceil() as usize).clamp(1, cap)
    } else {
        cap
    }
}

fn ransac(
    x1: &[Point2<f64>],
    x2: &[Point2<f64>],
    threshold: f64,
    essential: bool,
    opts: &RansacOptions,
) -> Result<EpipolarEstimate, CalibError> {
    if x1.len() != x2.len() {
        return Err(CalibError::StereoMismatch(format!(
            "{} left points vs {} right points",
            x1.len(),
            x2.len()
        )));
    }
    if x1.len() < SAMPLE {
        return Err(CalibError::TooFewCorrespondences {
            what: if essential { "essential" } else { "fundamental" },
            found: x1.len(),
        });
    }
    let thresh_sq = threshold * threshold;
    let all: Vec<usize> = (0..x1.len()).collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut best: Vec<usize> = Vec::new();
    let mut needed = opts.max_iterations.max(1);
    let mut iterations = 0;
    let mut s1 = Vec::with_capacity(SAMPLE);
    let mut s2 = Vec::with_capacity(SAMPLE);

    while iterations < needed {
        iterations += 1;
        s1.clear();
        s2.clear();
        for &k in all.choose_multiple(&mut rng, SAMPLE) {
            s1.push(x1[k]);
            s2.push(x2[k]);
        }
        let Some(m) = eight_point(&s1, &s2, essential) else {
            continue;
        };
        let inl = inliers_of(&m, x1, x2, thresh_sq);
        if inl.len() > best.len() {
            best = inl;
            let ratio = best.len() as f64 / x1.len() as f64;
            needed = required_iterations(ratio, opts.confidence, opts.max_iterations.max(1));
        }
    }

    if best.len() < SAMPLE {
        return Err(CalibError::TooFewCorrespondences {
            what: "epipolar inliers",
            found: best.len(),
        });
    }
    let (matrix, inliers) = refit(x1, x2, &best, thresh_sq, essential)?;
    log::debug!(
        "{} matrix: {}/{} inliers after {iterations} iterations",
        if essential { "essential" } else { "fundamental" },
        inliers.len(),
        x1.len()
    );
    Ok(EpipolarEstimate {
        matrix,
        inliers,
        iterations,
    })
}

/// Refit on the consensus set and recount inliers against all matches.
fn refit(
    x1: &[Point2<f64>],
    x2: &[Point2<f64>],
    consensus: &[usize],
    thresh_sq: f64,
    essential: bool,
) -> Result<(Matrix3<f64>, Vec<usize>), CalibError> {
    let b1: Vec<_> = consensus.iter().map(|&k| x1[k]).collect();
    let b2: Vec<_> = consensus.iter().map(|&k| x2[k]).collect();
    let matrix = eight_point(&b1, &b2, essential).ok_or(CalibError::NonFinite)?;
    let inliers = inliers_of(&matrix, x1, x2, thresh_sq);
    if inliers.len() < SAMPLE {
        return Err(CalibError::TooFewCorrespondences {
            what: "epipolar inliers after refit",
            found: inliers.len(),
        });
    }
    Ok((matrix, inliers))
}

/// Fundamental matrix from raw pixel matches.
pub fn find_fundamental(
    left: &[Point2<f64>],
    right: &[Point2<f64>],
    opts: &RansacOptions,
) -> Result<EpipolarEstimate, CalibError> {
    ransac(left, right, opts.threshold, false, opts)
}

/// Essential matrix from pixel matches, undistorted through each camera.
/// The pixel threshold is scaled by the mean left focal length.
pub fn find_essential(
    left_camera: &Camera,
    right_camera: &Camera,
    left: &[Point2<f64>],
    right: &[Point2<f64>],
    opts: &RansacOptions,
) -> Result<EpipolarEstimate, CalibError> {
    let n1: Vec<Point2<f64>> = left
        .iter()
        .map(|p| Point2::from(left_camera.pixel_to_normalized(p)))
        .collect();
    let n2: Vec<Point2<f64>> = right
        .iter()
        .map(|p| Point2::from(right_camera.pixel_to_normalized(p)))
        .collect();
    let focal = 0.5 * (left_camera.intrinsics.fx + left_camera.intrinsics.fy);
    ransac(&n1, &n2, opts.threshold / focal.max(1e-12), true, opts)
}
