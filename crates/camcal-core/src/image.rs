use serde::{Deserialize, Serialize};

/// Borrowed 8-bit grayscale image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

/// Owned 8-bit grayscale image.
#[derive(Clone, Debug)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Blank image filled with `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Pixel dimensions of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width as u32, self.height as u32)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// 3×3 Sobel derivatives `(gx, gy)` at an integer pixel.
///
/// Out-of-image neighbours replicate the nearest border pixel.
pub fn sobel(src: &GrayImageView<'_>, x: usize, y: usize) -> (f32, f32) {
    let px = |dx: i32, dy: i32| -> f32 {
        let xx = (x as i32 + dx).clamp(0, src.width as i32 - 1);
        let yy = (y as i32 + dy).clamp(0, src.height as i32 - 1);
        get_gray(src, xx, yy) as f32
    };

    let gx = (px(1, -1) + 2.0 * px(1, 0) + px(1, 1)) - (px(-1, -1) + 2.0 * px(-1, 0) + px(-1, 1));
    let gy = (px(-1, 1) + 2.0 * px(0, 1) + px(1, 1)) - (px(-1, -1) + 2.0 * px(0, -1) + px(1, -1));
    (gx, gy)
}

#[inline]
pub fn sobel_magnitude(src: &GrayImageView<'_>, x: usize, y: usize) -> f32 {
    let (gx, gy) = sobel(src, x, y);
    (gx * gx + gy * gy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let img = GrayImage {
            width: 2,
            height: 1,
            data: vec![0, 100],
        };
        let v = sample_bilinear(&img.view(), 0.25, 0.0);
        assert!((v - 25.0).abs() < 1e-4);
    }

    #[test]
    fn sobel_is_zero_on_flat_image_and_large_on_step() {
        let flat = GrayImage::filled(8, 8, 77);
        assert_eq!(sobel_magnitude(&flat.view(), 4, 4), 0.0);

        let mut step = GrayImage::filled(8, 8, 0);
        for y in 0..8 {
            for x in 4..8 {
                step.data[y * 8 + x] = 200;
            }
        }
        let (gx, gy) = sobel(&step.view(), 4, 4);
        assert_eq!(gy, 0.0);
        assert_eq!(gx, 800.0);
    }
}
