use camcal_core::PointSetError;

/// Calibration failures. Everything here is a numerical or input-shape
/// problem of a run that was actually attempted.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CalibError {
    #[error("unknown camera model `{0}` (expected standard or fisheye)")]
    UnknownModel(String),
    #[error("{model} distortion has {expected} coefficients, got {found}")]
    DistortionLength {
        model: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("need at least {needed} views, got {found}")]
    TooFewViews { needed: usize, found: usize },
    #[error("view {view} has {found} points, need at least 4")]
    TooFewPoints { view: usize, found: usize },
    #[error("{residuals} residual equations cannot determine {params} parameters")]
    NotEnoughEquations { residuals: usize, params: usize },
    #[error("initialization failed: {0}")]
    Initialization(String),
    #[error("view {view} is ill-conditioned (singular value ratio {ratio:.3e})")]
    IllConditioned { view: usize, ratio: f64 },
    #[error("solver produced non-finite values")]
    NonFinite,
    #[error("left and right sets disagree: {0}")]
    StereoMismatch(String),
    #[error("not enough correspondences for {what}: {found}")]
    TooFewCorrespondences { what: &'static str, found: usize },
    #[error(transparent)]
    PointSet(#[from] PointSetError),
}
