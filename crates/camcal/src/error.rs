use camcal_aruco::DictionaryError;
use camcal_calib::CalibError;
use camcal_charuco::CharucoBoardError;
use camcal_core::PatternConfigError;

use crate::session::SessionError;

/// Outcome taxonomy of every facade entry point.
///
/// Distinguishes a bad request, nothing to calibrate, and a calibration
/// that was attempted and failed numerically.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no valid calibration pattern found in {images} image(s) of {}", dir.display())]
    DetectionFailure {
        dir: std::path::PathBuf,
        images: usize,
    },
    #[error("calibration failed: {0}")]
    SolverFailure(#[from] CalibError),
    #[error("write failed and was rolled back: {0}")]
    PartialWriteFailure(String),
}

impl From<PatternConfigError> for CalibrationError {
    fn from(e: PatternConfigError) -> Self {
        CalibrationError::InvalidInput(e.to_string())
    }
}

impl From<DictionaryError> for CalibrationError {
    fn from(e: DictionaryError) -> Self {
        CalibrationError::InvalidInput(e.to_string())
    }
}

impl From<CharucoBoardError> for CalibrationError {
    fn from(e: CharucoBoardError) -> Self {
        CalibrationError::InvalidInput(e.to_string())
    }
}

impl From<SessionError> for CalibrationError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) | SessionError::NoImages(_) => {
                CalibrationError::NotFound(e.to_string())
            }
            SessionError::EmptyUpload => CalibrationError::InvalidInput(e.to_string()),
            SessionError::PartialWrite { .. } | SessionError::Io { .. } | SessionError::Json { .. } => {
                CalibrationError::PartialWriteFailure(e.to_string())
            }
        }
    }
}
