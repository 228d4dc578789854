use camcal_core::ImageSize;
use nalgebra::Point2;

/// Side of the transported heatmap grid.
pub const HEATMAP_GRID: usize = 20;

/// Kernel support, in standard deviations from the point.
const KERNEL_EXTENT: f64 = 6.0;

/// Gaussian point density over the image, max-normalized and block-averaged
/// to a `HEATMAP_GRID²` grid.
///
/// Points are truncated to integer pixels; points outside the image are
/// skipped. Blocks are `max(dim / 20, 1)` pixels; blocks falling past the
/// image edge of very small frames read as zero.
pub fn coverage_heatmap<P: AsRef<[Point2<f64>]>>(frames: &[P], size: ImageSize) -> Vec<Vec<f64>> {
    let (w, h) = (size.width as usize, size.height as usize);
    let mut grid = vec![vec![0.0; HEATMAP_GRID]; HEATMAP_GRID];
    if w == 0 || h == 0 {
        return grid;
    }

    let sigma = 0.05 * w.min(h) as f64;
    let radius = (KERNEL_EXTENT * sigma).ceil() as i64;
    let inv = if sigma > 0.0 { 1.0 / (2.0 * sigma * sigma) } else { f64::INFINITY };
    // exp(-(dx²+dy²)/2σ²) = g(dx)·g(dy)
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|d| if d == 0 { 1.0 } else { (-((d * d) as f64) * inv).exp() })
        .collect();

    let mut density = vec![0.0f64; w * h];
    for p in frames.iter().flat_map(|f| f.as_ref()) {
        if !(p.x.is_finite() && p.y.is_finite()) {
            continue;
        }
        let (x, y) = (p.x.trunc() as i64, p.y.trunc() as i64);
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            continue;
        }
        let (y0, y1) = ((y - radius).max(0), (y + radius).min(h as i64 - 1));
        let (x0, x1) = ((x - radius).max(0), (x + radius).min(w as i64 - 1));
        for yy in y0..=y1 {
            let gy = kernel[(yy - y + radius) as usize];
            let row = &mut density[yy as usize * w..(yy as usize + 1) * w];
            for xx in x0..=x1 {
                row[xx as usize] += gy * kernel[(xx - x + radius) as usize];
            }
        }
    }

    let max = density.iter().copied().fold(0.0, f64::max);
    if max <= 0.0 {
        return grid;
    }

    let (hs, ws) = ((h / HEATMAP_GRID).max(1), (w / HEATMAP_GRID).max(1));
    for (i, row) in grid.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let (ys, ye) = ((i * hs).min(h), ((i + 1) * hs).min(h));
            let (xs, xe) = ((j * ws).min(w), ((j + 1) * ws).min(w));
            let count = (ye - ys) * (xe - xs);
            if count == 0 {
                continue;
            }
            let sum: f64 = (ys..ye)
                .map(|yy| density[yy * w + xs..yy * w + xe].iter().sum::<f64>())
                .sum();
            *cell = sum / count as f64 / max;
        }
    }
    grid
}
