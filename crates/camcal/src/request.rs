//! Calibration requests as they arrive from an outer layer.

use std::str::FromStr;

use camcal_calib::CameraModel;
use camcal_core::{DictionaryName, PatternConfig, PatternKind};
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// Flat request record. Validated into a [`PatternConfig`] before any
/// image is touched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRequest {
    pub pattern_type: String,
    pub columns: u32,
    pub rows: u32,
    pub square_size: f64,
    #[serde(default = "default_model")]
    pub camera_model: String,
    #[serde(default)]
    pub marker_size: Option<f64>,
    #[serde(default)]
    pub aruco_dict_name: Option<String>,
    #[serde(default)]
    pub optimize: bool,
}

fn default_model() -> String {
    CameraModel::Standard.as_str().to_string()
}

impl CalibrationRequest {
    pub fn pattern(&self) -> Result<PatternConfig, CalibrationError> {
        let kind = PatternKind::from_str(&self.pattern_type)?;
        let pattern = match kind {
            PatternKind::Checkerboard => PatternConfig::checkerboard(self.columns, self.rows, self.square_size),
            PatternKind::Charuco => {
                let dictionary = self
                    .aruco_dict_name
                    .as_deref()
                    .map(DictionaryName::from_str)
                    .transpose()?;
                PatternConfig {
                    kind,
                    columns: self.columns,
                    rows: self.rows,
                    square_size: self.square_size,
                    marker_size: self.marker_size,
                    dictionary,
                }
            }
        };
        pattern.validate()?;
        Ok(pattern)
    }

    pub fn model(&self) -> Result<CameraModel, CalibrationError> {
        CameraModel::from_str(&self.camera_model).map_err(|e| CalibrationError::InvalidInput(e.to_string()))
    }

    /// Pattern and model, or the first validation error.
    pub fn validate(&self) -> Result<(PatternConfig, CameraModel), CalibrationError> {
        Ok((self.pattern()?, self.model()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> CalibrationRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn checkerboard_defaults() {
        let req = parse(r#"{"pattern_type":"checkerboard","columns":9,"rows":6,"square_size":0.025}"#);
        let (pattern, model) = req.validate().unwrap();
        assert_eq!(pattern, PatternConfig::checkerboard(9, 6, 0.025));
        assert_eq!(model, CameraModel::Standard);
        assert!(!req.optimize);
    }

    #[test]
    fn charuco_needs_marker_and_dictionary() {
        let ok = parse(
            r#"{"pattern_type":"charuco","columns":5,"rows":7,"square_size":0.04,
                "marker_size":0.03,"aruco_dict_name":"DICT_5X5_100","camera_model":"fisheye"}"#,
        );
        let (pattern, model) = ok.validate().unwrap();
        assert_eq!(pattern.dictionary, Some(DictionaryName::Dict5x5_100));
        assert_eq!(model, CameraModel::Fisheye);

        let mut bad = ok.clone();
        bad.aruco_dict_name = Some("DICT_9X9_1".into());
        assert!(matches!(bad.validate(), Err(CalibrationError::InvalidInput(_))));

        let mut bad = ok.clone();
        bad.marker_size = None;
        assert!(matches!(bad.validate(), Err(CalibrationError::InvalidInput(_))));

        let mut bad = ok;
        bad.camera_model = "orthographic".into();
        assert!(matches!(bad.validate(), Err(CalibrationError::InvalidInput(_))));
    }

    #[test]
    fn unknown_pattern_is_rejected() {
        let req = parse(r#"{"pattern_type":"circles","columns":4,"rows":11,"square_size":0.02}"#);
        assert!(matches!(req.validate(), Err(CalibrationError::InvalidInput(_))));
    }
}
