//! Camera calibration from images of a planar target.
//!
//! This crate ties the workspace together:
//! - [`PatternDetector`]: ChESS corners (`chess-corners`) fed into the
//!   checkerboard or ChArUco detector, sub-pixel refinement, live-capture
//!   quality score.
//! - [`CalibrationEngine`]: mono and stereo calibration over image
//!   directories, optional refinement pass, dataset quality.
//! - [`SessionStore`]: filesystem sessions holding uploaded images and the
//!   stored results.
//! - [`artifact`]: the persisted JSON interchange records.
//!
//! ## Quickstart
//!
//! ```no_run
//! use camcal::{CalibrationEngine, EngineConfig};
//! use camcal::calib::CameraModel;
//! use camcal::core::PatternConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = CalibrationEngine::new(EngineConfig::load(None)?);
//! let pattern = PatternConfig::checkerboard(9, 6, 0.025);
//! let run = engine.calibrate(Path::new("images"), &pattern, CameraModel::Standard, true)?;
//! println!("rms {:.3} px over {} frames", run.result.rms, run.result.poses.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `camcal::core`: pattern description, point sets, poses, images.
//! - `camcal::chessboard`, `camcal::aruco`, `camcal::charuco`: detectors.
//! - `camcal::calib`: camera models and solvers.
//! - `camcal::quality`: dataset quality analysis.

pub use camcal_aruco as aruco;
pub use camcal_calib as calib;
pub use camcal_charuco as charuco;
pub use camcal_chessboard as chessboard;
pub use camcal_core as core;
pub use camcal_quality as quality;

pub mod annotate;
pub mod artifact;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod engine;
mod error;
pub mod preview;
pub mod request;
pub mod service;
pub mod session;

pub use config::EngineConfig;
pub use dataset::{CorrespondenceSet, FrameEntry};
pub use detect::{Detection, PatternDetector};
pub use engine::{CalibrationEngine, CalibrationResult, MonoRun, StereoCalibrationResult, StereoRun};
pub use error::CalibrationError;
pub use request::CalibrationRequest;
pub use session::{SessionError, SessionRecord, SessionStore};
