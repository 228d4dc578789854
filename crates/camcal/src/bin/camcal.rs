//! camcal CLI: pattern detection, mono/stereo calibration, dataset quality
//! and session management.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use camcal::artifact::{CalibrationArtifact, CalibrationResponse, StereoArtifact, StereoResponse};
use camcal::aruco::Dictionary;
use camcal::config::write_json;
use camcal::core::DictionaryName;
use camcal::{annotate, service, CalibrationEngine, CalibrationRequest, EngineConfig, SessionStore};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "camcal")]
#[command(about = "Calibrate cameras from checkerboard and ChArUco images")]
#[command(version)]
struct Cli {
    /// Engine configuration (JSON). Missing fields keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON result here instead of stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); `CAMCAL_LOG` otherwise.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON log lines (with the `tracing` feature).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Debug)]
struct PatternArgs {
    /// `checkerboard` or `charuco`.
    #[arg(long, default_value = "checkerboard")]
    pattern: String,
    /// Inner corners (checkerboard) or squares (ChArUco) per row.
    #[arg(long, default_value_t = 24)]
    columns: u32,
    #[arg(long, default_value_t = 17)]
    rows: u32,
    /// Square side in metres.
    #[arg(long, default_value_t = 0.03)]
    square_size: f64,
    /// Marker side in metres (ChArUco).
    #[arg(long)]
    marker_size: Option<f64>,
    /// Marker dictionary, e.g. DICT_5X5_100 (ChArUco).
    #[arg(long)]
    dictionary: Option<String>,
}

impl PatternArgs {
    fn request(&self, model: &str, optimize: bool) -> CalibrationRequest {
        CalibrationRequest {
            pattern_type: self.pattern.clone(),
            columns: self.columns,
            rows: self.rows,
            square_size: self.square_size,
            camera_model: model.to_string(),
            marker_size: self.marker_size,
            aruco_dict_name: self.dictionary.clone(),
            optimize,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the pattern in one image.
    Detect {
        #[arg(long)]
        image: PathBuf,
        #[command(flatten)]
        pattern: PatternArgs,
        /// Write an annotated PNG here.
        #[arg(long)]
        annotated: Option<PathBuf>,
    },
    /// Calibrate one camera from a directory or a session.
    Calibrate {
        #[arg(long, conflicts_with = "session", required_unless_present = "session")]
        images: Option<PathBuf>,
        #[arg(long)]
        session: Option<String>,
        #[command(flatten)]
        pattern: PatternArgs,
        /// `standard` or `fisheye`.
        #[arg(long, default_value = "standard")]
        model: String,
        /// Skip the refinement pass.
        #[arg(long)]
        no_optimize: bool,
        /// Include base64 annotated and undistorted previews.
        #[arg(long)]
        previews: bool,
        /// Also write calibration_data.json here.
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// Calibrate a camera pair from synchronized left/right frames.
    Stereo {
        #[arg(long, conflicts_with = "left_session", required_unless_present = "left_session")]
        left: Option<PathBuf>,
        #[arg(long, requires = "left", required_unless_present = "right_session")]
        right: Option<PathBuf>,
        #[arg(long, requires = "right_session")]
        left_session: Option<String>,
        #[arg(long, requires = "left_session")]
        right_session: Option<String>,
        #[command(flatten)]
        pattern: PatternArgs,
        #[arg(long, default_value = "standard")]
        model: String,
        #[arg(long)]
        no_optimize: bool,
        /// Also write stereo_calibration_data.json here.
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// Score a dataset's coverage and pose diversity.
    Analyze {
        #[arg(long, conflicts_with = "session", required_unless_present = "session")]
        images: Option<PathBuf>,
        #[arg(long)]
        session: Option<String>,
        #[command(flatten)]
        pattern: PatternArgs,
    },
    /// Manage stored sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// List marker dictionaries, which are compiled in and which have tables installed.
    Dictionaries,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Copy images into a new session.
    Create {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    List,
    Delete {
        id: String,
    },
    /// Remove sessions older than `--hours` and directories without a record.
    Cleanup {
        #[arg(long, default_value_t = 24)]
        hours: u64,
    },
}

#[derive(Serialize)]
struct DetectOutput<'a> {
    image: &'a Path,
    found: bool,
    quality: f64,
    should_capture: bool,
    num_corners: usize,
    corner_ids: &'a [u32],
    image_points: Vec<[f64; 2]>,
}

#[derive(Serialize)]
struct DictionaryEntry {
    name: DictionaryName,
    /// A table file in the dictionary directory.
    installed: bool,
    /// Compiled into the binary.
    builtin: bool,
}

#[derive(Serialize)]
struct CleanupOutput {
    expired: usize,
    orphans: usize,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    init_logging(cli.log_level.as_deref(), cli.log_json)?;
    let config = EngineConfig::load(cli.config.as_deref())?;
    let out = cli.out.as_deref();

    match cli.command {
        Commands::Detect {
            image,
            pattern,
            annotated,
        } => run_detect(&config, &image, &pattern, annotated.as_deref(), out),
        Commands::Calibrate {
            images,
            session,
            pattern,
            model,
            no_optimize,
            previews,
            artifact,
        } => {
            let request = pattern.request(&model, !no_optimize);
            let engine = CalibrationEngine::new(config);
            let response = match (images, session) {
                (Some(dir), _) => {
                    let (pattern, model) = request.validate()?;
                    let run = engine.calibrate(&dir, &pattern, model, request.optimize)?;
                    if let Some(path) = artifact.as_deref() {
                        write_json(path, &CalibrationArtifact::from(&run.result))?;
                    }
                    let mut response = CalibrationResponse::from(&run.result);
                    if previews {
                        response.previews = engine.previews(&pattern, &run)?;
                    }
                    response
                }
                (None, Some(id)) => {
                    let store = SessionStore::open(&engine.config().session_root)?;
                    service::calibrate_session(&engine, &store, &id, &request, previews)?
                }
                (None, None) => return Err("--images or --session is required".into()),
            };
            emit(&response, out)
        }
        Commands::Stereo {
            left,
            right,
            left_session,
            right_session,
            pattern,
            model,
            no_optimize,
            artifact,
        } => {
            let request = pattern.request(&model, !no_optimize);
            let engine = CalibrationEngine::new(config);
            let response = match (left, right, left_session, right_session) {
                (Some(l), Some(r), _, _) => {
                    let (pattern, model) = request.validate()?;
                    let run = engine.stereo(&l, &r, &pattern, model, request.optimize)?;
                    if let Some(path) = artifact.as_deref() {
                        write_json(path, &StereoArtifact::from(&run.result))?;
                    }
                    StereoResponse::from(&run.result)
                }
                (_, _, Some(l), Some(r)) => {
                    let store = SessionStore::open(&engine.config().session_root)?;
                    service::stereo_sessions(&engine, &store, &l, &r, &request)?
                }
                _ => return Err("--left/--right or --left-session/--right-session are required".into()),
            };
            emit(&response, out)
        }
        Commands::Analyze {
            images,
            session,
            pattern,
        } => {
            let request = pattern.request("standard", false);
            let engine = CalibrationEngine::new(config);
            let metrics = match (images, session) {
                (Some(dir), _) => engine.analyze(&dir, &request.pattern()?)?,
                (None, Some(id)) => {
                    let store = SessionStore::open(&engine.config().session_root)?;
                    service::analyze_session(&engine, &store, &id, &request)?
                }
                (None, None) => return Err("--images or --session is required".into()),
            };
            emit(&metrics, out)
        }
        Commands::Session { action } => run_session(&config, action, out),
        Commands::Dictionaries => {
            let installed = Dictionary::available(&config.dictionary_dir);
            let builtin = Dictionary::builtin_names();
            let entries: Vec<DictionaryEntry> = DictionaryName::ALL
                .iter()
                .map(|&name| DictionaryEntry {
                    name,
                    installed: installed.contains(&name),
                    builtin: builtin.contains(&name),
                })
                .collect();
            emit(&entries, out)
        }
    }
}

fn run_detect(
    config: &EngineConfig,
    image: &Path,
    pattern: &PatternArgs,
    annotated: Option<&Path>,
    out: Option<&Path>,
) -> CliResult<()> {
    let pattern = pattern.request("standard", false).pattern()?;
    let engine = CalibrationEngine::new(config.clone());
    let (detection, gray) = engine.detect_file(image, &pattern)?;
    info!(
        "{}: found={} corners={} quality={:.3}",
        image.display(),
        detection.found,
        detection.points.len(),
        detection.quality
    );
    if let Some(path) = annotated {
        annotate::annotate(&gray, &detection, pattern.corner_grid().0).save(path)?;
    }
    let output = DetectOutput {
        image,
        found: detection.found,
        quality: detection.quality,
        should_capture: detection.should_capture,
        num_corners: detection.points.len(),
        corner_ids: detection.points.ids(),
        image_points: detection.image_points().iter().map(|p| [p.x, p.y]).collect(),
    };
    emit(&output, out)
}

fn run_session(config: &EngineConfig, action: SessionAction, out: Option<&Path>) -> CliResult<()> {
    let store = SessionStore::open(&config.session_root)?;
    match action {
        SessionAction::Create { files } => emit(&store.create(&files)?, out),
        SessionAction::List => emit(&store.list()?, out),
        SessionAction::Delete { id } => {
            store.delete(&id)?;
            emit(&serde_json::json!({ "deleted": id }), out)
        }
        SessionAction::Cleanup { hours } => {
            let expired = store.cleanup_older_than(Duration::from_secs(hours * 3600))?;
            let orphans = store.cleanup_orphans()?;
            emit(&CleanupOutput { expired, orphans }, out)
        }
    }
}

fn emit<T: Serialize + ?Sized>(value: &T, out: Option<&Path>) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: Option<&str>, _json: bool) -> CliResult<()> {
    use camcal::core::{init_from_env, init_with_level, parse_level};
    use log::LevelFilter;

    match level {
        Some(s) => {
            let level = parse_level(s).ok_or_else(|| format!("unknown log level {s:?}"))?;
            init_with_level(level)?;
        }
        None => init_from_env(LevelFilter::Warn)?,
    }
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(level: Option<&str>, json: bool) -> CliResult<()> {
    let _ = tracing_log::LogTracer::init();
    camcal::core::init_tracing(level, json);
    Ok(())
}
