//! Planar camera calibration.
//!
//! - [`calibrate_mono`]: intrinsics, distortion and per-view poses of one
//!   camera (standard Brown–Conrady or Kannala–Brandt fisheye), from a
//!   closed-form start refined by Levenberg–Marquardt (`levenberg-marquardt`).
//! - [`calibrate_stereo`]: relative pose of two calibrated cameras.
//! - [`stereo_rectify`], [`find_essential`], [`find_fundamental`]: derived
//!   pair geometry.
//!
//! Views are [`camcal_core::PointSet`]s of a `z = 0` board.

mod camera;
mod epipolar;
mod error;
mod init;
mod lm;
mod mono;
mod rectify;
mod reprojection;
mod stereo;

pub use camera::{Camera, CameraModel, Intrinsics};
pub use epipolar::{find_essential, find_fundamental, EpipolarEstimate, RansacOptions};
pub use error::CalibError;
pub use init::{init_intrinsics, pose_from_homography, view_homography};
pub use lm::{levenberg_marquardt, numeric_jacobian, LmOptions, LmReport, NllsProblem};
pub use mono::{calibrate_mono, CalibOptions, MonoCalibration};
pub use rectify::{stereo_rectify, Rectification};
pub use reprojection::{project_view, rms_error, view_error, view_squared_error};
pub use stereo::{calibrate_stereo, StereoCalibration, StereoSide};
