use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};

/// Planar projective map `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let q = self.apply_f64(Point2::new(p.x as f64, p.y as f64));
        Point2::new(q.x as f32, q.y as f32)
    }

    #[inline]
    pub fn apply_f64(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Similarity that moves the centroid to the origin and scales the mean
/// distance to `sqrt(2)`.
fn hartley_transform<I>(pts: I) -> Matrix3<f64>
where
    I: Iterator<Item = (f64, f64)> + Clone,
{
    let (mut cx, mut cy, mut n) = (0.0, 0.0, 0.0);
    for (x, y) in pts.clone() {
        cx += x;
        cy += y;
        n += 1.0;
    }
    if n == 0.0 {
        return Matrix3::identity();
    }
    cx /= n;
    cy /= n;

    let mean_dist = pts
        .map(|(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

#[inline]
fn transform(t: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let v = t * Vector3::new(x, y, 1.0);
    (v[0], v[1])
}

fn finish(hn: Matrix3<f64>, t_src: Matrix3<f64>, t_dst: Matrix3<f64>) -> Option<Homography> {
    let h = t_dst.try_inverse()? * hn * t_src;
    let s = h[(2, 2)];
    if s.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Homography::new(h / s))
}

/// Estimate `H` with `dst ~ H * src` by normalized DLT.
///
/// Needs at least four correspondences. With exactly four the design matrix
/// is zero-padded to 9 rows so the SVD still yields a full `V`.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    let n = src.len();
    if n != dst.len() || n < 4 {
        return None;
    }

    let t_src = hartley_transform(src.iter().map(|p| (p.x, p.y)));
    let t_dst = hartley_transform(dst.iter().map(|p| (p.x, p.y)));

    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (k, (s, d)) in src.iter().zip(dst).enumerate() {
        let (x, y) = transform(&t_src, s.x, s.y);
        let (u, v) = transform(&t_dst, d.x, d.y);

        let r0 = 2 * k;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let vt = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = vt.row(min_idx);
    let hn = Matrix3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    finish(hn, t_src, t_dst)
}

/// Exact homography from four correspondences (cell corners to image quad).
///
/// Corner order must be consistent between `src` and `dst`.
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    let t_src = hartley_transform(src.iter().map(|p| (p.x as f64, p.y as f64)));
    let t_dst = hartley_transform(dst.iter().map(|p| (p.x as f64, p.y as f64)));

    // h33 fixed to 1; eight unknowns, eight equations.
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for k in 0..4 {
        let (x, y) = transform(&t_src, src[k].x as f64, src[k].y as f64);
        let (u, v) = transform(&t_dst, dst[k].x as f64, dst[k].y as f64);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);
    finish(hn, t_src, t_dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2<f64>, b: Point2<f64>, tol: f64) {
        assert!(
            (a.x - b.x).abs() < tol && (a.y - b.y).abs() < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            0.8, 0.05, 120.0, //
            -0.02, 1.1, 80.0, //
            0.0009, -0.0004, 1.0,
        ))
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = ground_truth();
        let inv = h.inverse().expect("invertible");
        for p in [Point2::new(0.0, 0.0), Point2::new(50.0, -20.0), Point2::new(320.0, 200.0)] {
            assert_close(inv.apply_f64(h.apply_f64(p)), p, 1e-9);
        }
    }

    #[test]
    fn four_point_solution_matches_dlt() {
        let gt = ground_truth();
        let rect = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(180.0, 0.0),
            Point2::new(180.0, 130.0),
            Point2::new(0.0, 130.0),
        ];
        let dst = rect.map(|p| gt.apply(p));
        let exact = homography_from_4pt(&rect, &dst).expect("exact");

        let src64: Vec<_> = rect.iter().map(|p| Point2::new(p.x as f64, p.y as f64)).collect();
        let dst64: Vec<_> = src64.iter().map(|&p| gt.apply_f64(p)).collect();
        let dlt = estimate_homography(&src64, &dst64).expect("dlt with padding");

        let query = Point2::new(60.0, 40.0);
        assert_close(dlt.apply_f64(query), gt.apply_f64(query), 1e-6);
        let e = exact.apply(Point2::new(60.0, 40.0));
        assert_close(Point2::new(e.x as f64, e.y as f64), gt.apply_f64(query), 1e-2);
    }

    #[test]
    fn dlt_handles_overdetermined_board() {
        let gt = ground_truth();
        let src: Vec<Point2<f64>> = (0..5)
            .flat_map(|j| (0..7).map(move |i| Point2::new(i as f64 * 0.03, j as f64 * 0.03)))
            .collect();
        let dst: Vec<Point2<f64>> = src.iter().map(|&p| gt.apply_f64(p)).collect();
        let est = estimate_homography(&src, &dst).expect("estimate");
        for p in &src {
            assert_close(est.apply_f64(*p), gt.apply_f64(*p), 1e-6);
        }
    }

    #[test]
    fn degenerate_inputs_fail() {
        let src = [Point2::new(0.0, 0.0); 4];
        let dst = [Point2::new(1.0, 1.0); 3];
        assert!(estimate_homography(&src, &dst).is_none());
    }
}
