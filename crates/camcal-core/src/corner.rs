use nalgebra::Point2;

/// A raw X-junction candidate from the corner detector.
#[derive(Clone, Copy, Debug)]
pub struct Corner {
    /// Position in image pixels.
    pub position: Point2<f32>,
    /// Detector response; larger means more confident.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            strength,
        }
    }
}
