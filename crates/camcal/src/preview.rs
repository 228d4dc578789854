//! Preview images for transport: undistortion remap and base64 JPEG.

use std::io::Cursor;

use ::image::codecs::jpeg::JpegEncoder;
use ::image::{DynamicImage, GrayImage, ImageResult, Luma};
use base64::{engine::general_purpose, Engine as _};
use camcal_calib::Camera;
use camcal_core::sample_bilinear;
use nalgebra::Vector2;

use crate::detect::gray_view;

/// Base64 of `img` encoded as JPEG at `quality` (1..=100).
pub fn jpeg_base64(img: &DynamicImage, quality: u8) -> ImageResult<String> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    img.write_with_encoder(encoder)?;
    Ok(general_purpose::STANDARD.encode(buf.into_inner()))
}

/// Remove lens distortion, keeping the camera matrix. Pixels whose source
/// falls outside the image are black.
pub fn undistort_image(img: &GrayImage, camera: &Camera) -> GrayImage {
    let src = gray_view(img);
    let k = &camera.intrinsics;
    GrayImage::from_fn(img.width(), img.height(), |u, v| {
        let ideal = Vector2::new((u as f64 - k.cx) / k.fx, (v as f64 - k.cy) / k.fy);
        let px = camera.normalized_to_pixel(camera.distort(ideal));
        let value = sample_bilinear(&src, px.x as f32, px.y as f32);
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}
