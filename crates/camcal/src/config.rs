//! Engine configuration, loaded from JSON with environment overrides.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use camcal_calib::{CalibOptions, RansacOptions};
use camcal_chessboard::SubPixParams;
use camcal_quality::QualityThresholds;
use chess_corners::ChessConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

pub const DICTIONARY_DIR_ENV: &str = "CAMCAL_DICTIONARY_DIR";
pub const SESSION_ROOT_ENV: &str = "CAMCAL_SESSION_ROOT";

/// ChESS corner detector settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessSettings {
    /// Response threshold relative to the strongest corner.
    pub threshold_rel: f32,
    pub nms_radius: u32,
}

impl Default for ChessSettings {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
        }
    }
}

impl ChessSettings {
    pub fn to_chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.params.threshold_rel = self.threshold_rel;
        cfg.params.nms_radius = self.nms_radius;
        cfg
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `<NAME>_CODES.json` marker tables.
    pub dictionary_dir: PathBuf,
    pub session_root: PathBuf,
    pub chess: ChessSettings,
    /// Detection-time sub-pixel refinement.
    pub subpix: SubPixParams,
    /// Sub-pixel refinement of the optimize pass.
    pub optimize_subpix: SubPixParams,
    pub solver: CalibOptions,
    pub ransac: RansacOptions,
    pub quality: QualityThresholds,
    /// Live-capture score above which a frame is worth keeping.
    pub capture_threshold: f64,
    pub preview_jpeg_quality: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dictionary_dir: PathBuf::from("dictionaries"),
            session_root: PathBuf::from("sessions"),
            chess: ChessSettings::default(),
            subpix: SubPixParams::standard(),
            optimize_subpix: SubPixParams::optimize(),
            solver: CalibOptions::default(),
            ransac: RansacOptions::default(),
            quality: QualityThresholds::default(),
            capture_threshold: 0.7,
            preview_jpeg_quality: 85,
        }
    }
}

impl EngineConfig {
    /// Defaults or the JSON file at `path`, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, CalibrationError> {
        let mut cfg = match path {
            Some(p) => load_json(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var_os(k).map(PathBuf::from));
        Ok(cfg)
    }

    /// Apply `CAMCAL_DICTIONARY_DIR` and `CAMCAL_SESSION_ROOT` through `var`.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        if let Some(dir) = var(DICTIONARY_DIR_ENV) {
            self.dictionary_dir = dir;
        }
        if let Some(root) = var(SESSION_ROOT_ENV) {
            self.session_root = root;
        }
    }
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, CalibrationError> {
    let file = File::open(path)
        .map_err(|e| CalibrationError::NotFound(format!("{}: {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| CalibrationError::InvalidInput(format!("{}: {e}", path.display())))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CalibrationError> {
    let fail = |e: &dyn std::fmt::Display| {
        CalibrationError::PartialWriteFailure(format!("{}: {e}", path.display()))
    };
    let file = File::create(path).map_err(|e| fail(&e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| fail(&e))?;
    writer.flush().map_err(|e| fail(&e))
}
