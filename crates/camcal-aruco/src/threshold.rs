//! Global Otsu threshold over a small sample set.

/// Threshold maximizing between-class variance of `samples`.
///
/// Values `< t` are dark. Degenerate inputs fall back to the midpoint of
/// the observed range.
pub(crate) fn otsu_threshold(samples: &[u8]) -> u8 {
    let (Some(&lo), Some(&hi)) = (samples.iter().min(), samples.iter().max()) else {
        return 128;
    };
    if hi - lo < 2 {
        return hi;
    }

    let mut hist = [0u64; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    let total = samples.len() as f64;
    let sum_all: f64 = hist.iter().enumerate().map(|(v, &n)| v as f64 * n as f64).sum();

    let (mut w0, mut sum0) = (0.0f64, 0.0f64);
    let (mut best_t, mut best_var) = (((lo as u16 + hi as u16) / 2) as u8, -1.0f64);
    for t in lo as usize..hi as usize {
        w0 += hist[t] as f64;
        sum0 += t as f64 * hist[t] as f64;
        let w1 = total - w0;
        if w0 == 0.0 || w1 == 0.0 {
            continue;
        }
        let diff = sum0 / w0 - (sum_all - sum0) / w1;
        let var = w0 * w1 * diff * diff;
        if var > best_var {
            best_var = var;
            // Dark class is `<= t`, so the split point is `t + 1`.
            best_t = (t + 1) as u8;
        }
    }
    best_t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_bimodal_samples() {
        let mut s = vec![20u8; 40];
        s.extend(std::iter::repeat_n(210u8, 60));
        let t = otsu_threshold(&s);
        assert!(t > 20 && t <= 210);
        assert!(s.iter().filter(|&&v| v < t).count() == 40);
    }

    #[test]
    fn flat_input_does_not_split() {
        assert_eq!(otsu_threshold(&[90, 90, 90]), 90);
        assert_eq!(otsu_threshold(&[]), 128);
    }
}
