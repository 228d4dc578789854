//! Session-level operations: resolve a session's images, run the engine,
//! store the result beside the session record.

use camcal_quality::QualityMetrics;
use log::info;

use crate::artifact::{
    CalibrationArtifact, CalibrationResponse, StereoArtifact, StereoResponse, CALIBRATION_FILE, QUALITY_FILE,
    STEREO_CALIBRATION_FILE,
};
use crate::engine::CalibrationEngine;
use crate::error::CalibrationError;
use crate::request::CalibrationRequest;
use crate::session::SessionStore;

/// Mono calibration of session `id`; writes `calibration_data.json`.
pub fn calibrate_session(
    engine: &CalibrationEngine,
    store: &SessionStore,
    id: &str,
    request: &CalibrationRequest,
    with_previews: bool,
) -> Result<CalibrationResponse, CalibrationError> {
    let (pattern, model) = request.validate()?;
    let dir = store.images_dir(id)?;
    let run = engine.calibrate(&dir, &pattern, model, request.optimize)?;
    store.put_artifact(id, CALIBRATION_FILE, &CalibrationArtifact::from(&run.result))?;
    info!("session {id}: calibration stored");

    let mut response = CalibrationResponse::from(&run.result);
    if with_previews {
        response.previews = engine.previews(&pattern, &run)?;
    }
    Ok(response)
}

/// Stereo calibration of two sessions holding synchronized left and right
/// frames. The result is stored with the left session.
pub fn stereo_sessions(
    engine: &CalibrationEngine,
    store: &SessionStore,
    left_id: &str,
    right_id: &str,
    request: &CalibrationRequest,
) -> Result<StereoResponse, CalibrationError> {
    let (pattern, model) = request.validate()?;
    let left_dir = store.images_dir(left_id)?;
    let right_dir = store.images_dir(right_id)?;
    let run = engine.stereo(&left_dir, &right_dir, &pattern, model, request.optimize)?;
    store.put_artifact(left_id, STEREO_CALIBRATION_FILE, &StereoArtifact::from(&run.result))?;
    info!("sessions {left_id}/{right_id}: stereo calibration stored");
    Ok(StereoResponse::from(&run.result))
}

/// Dataset quality of session `id`; replaces `quality_metrics.json`.
pub fn analyze_session(
    engine: &CalibrationEngine,
    store: &SessionStore,
    id: &str,
    request: &CalibrationRequest,
) -> Result<QualityMetrics, CalibrationError> {
    let pattern = request.pattern()?;
    let dir = store.images_dir(id)?;
    let metrics = engine.analyze(&dir, &pattern)?;
    store.put_artifact(id, QUALITY_FILE, &metrics)?;
    Ok(metrics)
}
